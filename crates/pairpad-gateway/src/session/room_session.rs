use chrono::Utc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pairpad_core::error::{PairpadError, Result};
use pairpad_core::model::{is_unset, Language, RoomPatch, RoomSettings, SessionInfo, PLACEHOLDER_CONTENT};
use pairpad_core::protocol::command::ClientCommand;
use pairpad_core::protocol::events::{
    self, CodeOutputEvent, ContentEvent, ContentRequest, CursorEvent, LanguageEvent, QuestionEvent,
    SettingsEvent, TopicKind,
};
use pairpad_core::protocol::frames::{self, ContentOrigin};

use crate::app_state::AppState;
use crate::broadcast::{Broadcast, Subscription};
use crate::exec::unavailable_message;
use crate::presence::{PresenceChange, PresenceHandle};
use crate::problems::QuestionNavigator;
use crate::sync::{LocalOutcome, RemoteOutcome, SyncEngine};

use super::{CursorBoard, SessionCtx};

/// Something other than the client happened.
#[derive(Debug)]
pub enum SessionEvent {
    Broadcast(Broadcast),
    Presence(PresenceChange),
    FlushDue,
    /// Every event source is gone.
    Closed,
}

struct Subscriptions {
    content: Subscription,
    sync: Subscription,
    cursor: Subscription,
    question: Subscription,
    room: Subscription,
}

pub struct RoomSession {
    app: AppState,
    ctx: SessionCtx,
    engine: SyncEngine,
    nav: QuestionNavigator,
    cursors: CursorBoard,
    /// Other members, oldest first.
    participants: Vec<SessionInfo>,
    presence: PresenceHandle,
    subs: Subscriptions,
    out: mpsc::Sender<String>,
}

impl RoomSession {
    /// Join room `code` as `display_name`.
    ///
    /// Fails with `NotFound` when the room does not exist. On success the
    /// client has been sent its joined/content/participants/question frames
    /// and peers have been asked for their buffers.
    pub async fn open(app: AppState, code: &str, display_name: &str, out: mpsc::Sender<String>) -> Result<Self> {
        let room = app
            .store()
            .get(code)
            .await?
            .ok_or_else(|| PairpadError::NotFound(format!("room {code}")))?;

        let info = SessionInfo {
            session_id: Uuid::new_v4().to_string(),
            display_name: display_name.to_string(),
            joined_at: Utc::now(),
        };
        let ctx = SessionCtx::new(info.clone(), code, room.language);

        let hub = app.hub();
        let subs = Subscriptions {
            content: hub.channel(events::topic(code, TopicKind::Content)).on(events::CONTENT).subscribe(),
            sync: hub.channel(events::topic(code, TopicKind::Sync)).on(events::REQUEST_CONTENT).subscribe(),
            cursor: hub.channel(events::topic(code, TopicKind::Cursor)).on(events::CURSOR).subscribe(),
            question: hub.channel(events::topic(code, TopicKind::Question)).on(events::QUESTION).subscribe(),
            room: hub
                .channel(events::topic(code, TopicKind::Room))
                .on(events::CODE_OUTPUT)
                .on(events::SETTINGS_CHANGED)
                .on(events::LANGUAGE)
                .subscribe(),
        };

        let mut engine = SyncEngine::new(app.sync_deps(), code);
        engine.seed(&room).await;
        let nav = QuestionNavigator::new(app.question_deps(), &room);

        let presence = app.tracker().join(code, info)?;
        let participants = presence.initial_peers().to_vec();
        app.metrics().sessions_active.inc(&[]);
        info!(room = code, session = %ctx.session_id(), peers = participants.len(), "session joined");

        let mut session = Self {
            app,
            ctx,
            engine,
            nav,
            cursors: CursorBoard::default(),
            participants,
            presence,
            subs,
            out,
        };

        session.push(frames::sys_joined(
            &session.ctx.info,
            code,
            session.ctx.language,
            session.nav.index(),
            session.nav.settings(),
        ));
        session.push(frames::doc_content(session.engine.buffer(), None, ContentOrigin::Seed));
        session.push(frames::room_participants(&session.participants));
        session.push_question();

        session.engine.request_latest_content(&session.ctx);
        Ok(session)
    }

    pub fn session_id(&self) -> &str {
        self.ctx.session_id()
    }

    pub fn room(&self) -> &str {
        &self.ctx.room
    }

    pub fn buffer(&self) -> &str {
        self.engine.buffer()
    }

    pub fn question_index(&self) -> u32 {
        self.nav.index()
    }

    pub fn participants(&self) -> &[SessionInfo] {
        &self.participants
    }

    /// Wait for the next broadcast, presence change or debounce expiry.
    pub async fn next_event(&mut self) -> SessionEvent {
        let deadline = self.engine.flush_deadline();
        tokio::select! {
            Some(m) = self.subs.content.recv() => SessionEvent::Broadcast(m),
            Some(m) = self.subs.sync.recv() => SessionEvent::Broadcast(m),
            Some(m) = self.subs.cursor.recv() => SessionEvent::Broadcast(m),
            Some(m) = self.subs.question.recv() => SessionEvent::Broadcast(m),
            Some(m) = self.subs.room.recv() => SessionEvent::Broadcast(m),
            Some(change) = self.presence.next_change() => SessionEvent::Presence(change),
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => SessionEvent::FlushDue,
            else => SessionEvent::Closed,
        }
    }

    /// Returns false once the session has nothing left to wait on.
    pub async fn handle_event(&mut self, ev: SessionEvent) -> bool {
        match ev {
            SessionEvent::Broadcast(msg) => self.on_broadcast(msg),
            SessionEvent::Presence(PresenceChange::Join(joined)) => self.on_peers_joined(joined),
            SessionEvent::Presence(PresenceChange::Leave(left)) => self.on_peers_left(left),
            SessionEvent::FlushDue => {
                self.engine.flush_if_due().await;
            }
            SessionEvent::Closed => return false,
        }
        true
    }

    pub async fn handle_command(&mut self, cmd: ClientCommand) {
        match cmd {
            ClientCommand::Edit { content } => {
                let outcome = self.engine.apply_local_edit(&mut self.ctx, content);
                if outcome == LocalOutcome::Suppressed {
                    debug!(room = %self.ctx.room, "edit suppressed under sync lock");
                }
            }
            ClientCommand::Cursor(caret) => {
                self.ctx.caret = Some(caret);
                let ev = CursorEvent {
                    session_id: self.ctx.session_id().to_string(),
                    display_name: self.ctx.info.display_name.clone(),
                    line: caret.line,
                    column: caret.column,
                };
                self.publish(TopicKind::Cursor, events::CURSOR, &ev);
            }
            ClientCommand::Save { content } => {
                self.engine.save_now(&mut self.ctx, content).await;
            }
            ClientCommand::SetLanguage(language) => self.set_language(language).await,
            ClientCommand::NextQuestion => {
                self.nav.next(&self.ctx).await;
                self.push_question();
                self.reset_to_starter();
            }
            ClientCommand::PreviousQuestion => {
                self.nav.previous(&self.ctx).await;
                self.push_question();
                self.reset_to_starter();
            }
            ClientCommand::ChangeSettings(settings) => self.change_settings(settings).await,
            ClientCommand::Run => self.run_code(),
            ClientCommand::Ping => self.push(frames::sys_pong()),
        }
    }

    /// Teardown: final save, untrack presence, release subscriptions.
    pub fn close(mut self) {
        self.engine.teardown();
        let remaining = self.presence.leave();
        self.app.metrics().sessions_active.dec(&[]);
        info!(room = %self.ctx.room, session = %self.ctx.session_id(), remaining, "session left");
    }

    fn on_broadcast(&mut self, msg: Broadcast) {
        let res = match &*msg.event {
            events::CONTENT => msg.decode::<ContentEvent>().map(|ev| self.on_remote_content(ev)),
            events::REQUEST_CONTENT => msg.decode::<ContentRequest>().map(|req| {
                self.engine.on_content_request(&self.ctx, &req);
            }),
            events::CURSOR => msg.decode::<CursorEvent>().map(|ev| {
                if self.cursors.update(self.ctx.session_id(), ev) {
                    self.push(frames::doc_cursors(self.cursors.iter()));
                }
            }),
            events::QUESTION => msg.decode::<QuestionEvent>().map(|ev| {
                if self.nav.on_question_changed(&self.ctx, &ev).is_some() {
                    self.push_question();
                    self.reset_to_starter();
                }
            }),
            events::SETTINGS_CHANGED => msg.decode::<SettingsEvent>().map(|ev| {
                if self.nav.on_settings_changed(&self.ctx, &ev) {
                    self.push(frames::room_settings(self.nav.settings(), &ev.updated_by));
                    self.push_question();
                    self.reset_to_starter();
                }
            }),
            events::LANGUAGE => msg.decode::<LanguageEvent>().map(|ev| {
                if ev.session_id != self.ctx.session_id() && ev.language != self.ctx.language {
                    self.ctx.language = ev.language;
                    self.push(frames::doc_language(ev.language));
                }
            }),
            events::CODE_OUTPUT => msg
                .decode::<CodeOutputEvent>()
                .map(|ev| self.push(frames::exec_output(&ev.render(), ev.is_error))),
            other => {
                debug!(event = other, "unhandled broadcast");
                Ok(())
            }
        };
        if let Err(e) = res {
            warn!(room = %self.ctx.room, topic = %msg.topic, error = %e, "dropping malformed broadcast");
            self.app.metrics().decode_errors.inc(&[("source", "broadcast")]);
        }
    }

    fn on_remote_content(&mut self, ev: ContentEvent) {
        if let RemoteOutcome::Applied { join_sync, caret } = self.engine.on_remote_edit(&mut self.ctx, ev) {
            let origin = if join_sync { ContentOrigin::JoinSync } else { ContentOrigin::Remote };
            self.push(frames::doc_content(self.engine.buffer(), caret, origin));
        }
    }

    fn on_peers_joined(&mut self, joined: Vec<SessionInfo>) {
        let was_alone = self.participants.is_empty();
        let mut fresh = Vec::new();
        for s in joined {
            if !self.participants.iter().any(|p| p.session_id == s.session_id) {
                fresh.push(s.clone());
                self.participants.push(s);
            }
        }
        if fresh.is_empty() {
            return;
        }
        self.participants.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        self.push(frames::room_participants(&self.participants));
        self.engine.on_peers_joined(&self.ctx, &fresh, was_alone);
    }

    fn on_peers_left(&mut self, left: Vec<SessionInfo>) {
        let before = self.participants.len();
        self.participants
            .retain(|p| !left.iter().any(|l| l.session_id == p.session_id));
        if self.participants.len() != before {
            self.push(frames::room_participants(&self.participants));
        }
        if self.cursors.remove_left(&left) {
            self.push(frames::doc_cursors(self.cursors.iter()));
        }
    }

    async fn set_language(&mut self, language: Language) {
        if language == self.ctx.language {
            return;
        }
        self.ctx.language = language;
        if let Err(e) = self.app.store().update(&self.ctx.room, RoomPatch::language(language)).await {
            warn!(room = %self.ctx.room, error = %e, "language persist failed");
            self.app.metrics().persist_failures.inc(&[("reason", "store")]);
        }
        let ev = LanguageEvent {
            language,
            session_id: self.ctx.session_id().to_string(),
        };
        self.publish(TopicKind::Room, events::LANGUAGE, &ev);
        self.push(frames::doc_language(language));
    }

    async fn change_settings(&mut self, settings: RoomSettings) {
        self.nav.change_settings(&self.ctx, settings).await;
        self.push(frames::room_settings(self.nav.settings(), &self.ctx.info.display_name));
        self.push_question();
        self.reset_to_starter();
    }

    /// The exercise changed: the shared buffer restarts from the starter code.
    fn reset_to_starter(&mut self) {
        let starter = self
            .nav
            .current(self.ctx.language)
            .starter
            .unwrap_or(PLACEHOLDER_CONTENT)
            .to_string();
        if let LocalOutcome::Scheduled { .. } = self.engine.apply_local_edit(&mut self.ctx, starter) {
            self.push(frames::doc_content(self.engine.buffer(), None, ContentOrigin::Question));
        }
    }

    /// Run the buffer off the session loop; the result comes back as a broadcast.
    fn run_code(&mut self) {
        let code = self.engine.buffer().to_string();
        if is_unset(&code) {
            self.push(frames::sys_error("BAD_REQUEST", "nothing to run"));
            return;
        }
        let Some(exec) = self.ctx.executor(self.app.executors()) else {
            self.push(frames::exec_output(&unavailable_message(self.ctx.language), true));
            return;
        };

        let channel = self.app.hub().channel(events::topic(&self.ctx.room, TopicKind::Room));
        let display_name = self.ctx.info.display_name.clone();
        let out = self.out.clone();
        tokio::spawn(async move {
            match exec.run(&code).await {
                Ok(res) => {
                    let ev = CodeOutputEvent {
                        output: res.output,
                        display_name,
                        timestamp: Utc::now(),
                        is_error: res.is_error,
                    };
                    if let Err(e) = channel.publish(events::CODE_OUTPUT, &ev) {
                        warn!(error = %e, "code output publish failed");
                    }
                }
                Err(e) => {
                    let _ = out.try_send(frames::exec_output(&e.to_string(), true));
                }
            }
        });
    }

    fn push_question(&self) {
        let view = self.nav.current(self.ctx.language);
        let frame = frames::nav_question(view.index, view.problem);
        self.push(frame);
    }

    fn publish<T: serde::Serialize>(&self, kind: TopicKind, event: &str, payload: &T) {
        let res = self
            .app
            .hub()
            .channel(events::topic(&self.ctx.room, kind))
            .publish(event, payload);
        if let Err(e) = res {
            warn!(room = %self.ctx.room, event, error = %e, "publish failed");
            self.app.metrics().publish_failures.inc(&[("event", event)]);
        }
    }

    /// Queue a frame for the client. A full queue drops the frame.
    fn push(&self, frame: String) {
        match self.out.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(room = %self.ctx.room, session = %self.ctx.session_id(), "outbound queue full; frame dropped");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
