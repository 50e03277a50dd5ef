use std::sync::Arc;

use tracing::{debug, warn};

use pairpad_core::model::{Language, Room, RoomPatch, RoomSettings};
use pairpad_core::protocol::events::{self, QuestionEvent, SettingsEvent, TopicKind};

use crate::broadcast::Hub;
use crate::obs::GatewayMetrics;
use crate::session::SessionCtx;
use crate::store::RoomStore;

use super::{Problem, ProblemCatalog};

#[derive(Clone)]
pub struct QuestionDeps {
    pub hub: Hub,
    pub store: Arc<dyn RoomStore>,
    pub catalog: Arc<ProblemCatalog>,
    pub metrics: Arc<GatewayMetrics>,
}

/// What the session should display for the current exercise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuestionView<'a> {
    pub index: u32,
    /// `None` when the configured set has no such exercise.
    pub problem: Option<&'a Problem>,
    pub starter: Option<&'a str>,
}

/// Shared exercise index for one session's room, mirrored in the store and
/// on the question topic.
pub struct QuestionNavigator {
    deps: QuestionDeps,
    room: String,
    settings: RoomSettings,
    index: u32,
}

impl QuestionNavigator {
    pub fn new(deps: QuestionDeps, room: &Room) -> Self {
        Self {
            deps,
            room: room.code.clone(),
            settings: room.settings(),
            index: room.question_index,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    pub fn set_len(&self) -> usize {
        self.deps.catalog.set_len(&self.settings)
    }

    pub fn current(&self, language: Language) -> QuestionView<'_> {
        let problem = self.deps.catalog.problem(&self.settings, self.index);
        QuestionView {
            index: self.index,
            problem,
            starter: problem.and_then(|p| p.starter_code(language)),
        }
    }

    pub async fn next(&mut self, ctx: &SessionCtx) -> u32 {
        self.step(ctx, true).await
    }

    pub async fn previous(&mut self, ctx: &SessionCtx) -> u32 {
        self.step(ctx, false).await
    }

    async fn step(&mut self, ctx: &SessionCtx, forward: bool) -> u32 {
        let len = self.set_len() as u32;
        if len == 0 {
            debug!(room = %self.room, "no problem set loaded; navigation ignored");
            return self.index;
        }
        let cur = self.index % len;
        self.index = if forward { (cur + 1) % len } else { (cur + len - 1) % len };

        match self.deps.store.update(&self.room, RoomPatch::question_index(self.index)).await {
            Ok(0) => warn!(room = %self.room, "room record missing; question index not persisted"),
            Ok(_) => {}
            Err(e) => {
                warn!(room = %self.room, error = %e, "question index persist failed");
                self.deps.metrics.persist_failures.inc(&[("reason", "store")]);
            }
        }

        let ev = QuestionEvent {
            question_index: self.index,
            session_id: ctx.session_id().to_string(),
        };
        self.publish(TopicKind::Question, events::QUESTION, &ev);
        self.index
    }

    /// Adopt a peer's navigation. Returns the new index when it changed.
    pub fn on_question_changed(&mut self, ctx: &SessionCtx, ev: &QuestionEvent) -> Option<u32> {
        if ev.session_id == ctx.session_id() || ev.question_index == self.index {
            return None;
        }
        self.index = ev.question_index;
        Some(self.index)
    }

    /// Switch to another problem collection. The index always restarts at 0.
    pub async fn change_settings(&mut self, ctx: &SessionCtx, settings: RoomSettings) {
        if self.deps.catalog.problems(&settings).is_none() {
            debug!(room = %self.room, subject = %settings.subject_name, "selected set not in catalog");
        }
        self.settings = settings;
        self.index = 0;

        if let Err(e) = self.deps.store.update(&self.room, RoomPatch::settings(&self.settings)).await {
            warn!(room = %self.room, error = %e, "settings persist failed");
            self.deps.metrics.persist_failures.inc(&[("reason", "store")]);
        }

        let ev = SettingsEvent {
            subject_name: self.settings.subject_name.clone(),
            difficulty: self.settings.difficulty.clone(),
            set_number: self.settings.set_number,
            updated_by: ctx.info.display_name.clone(),
            session_id: ctx.session_id().to_string(),
        };
        self.publish(TopicKind::Room, events::SETTINGS_CHANGED, &ev);
    }

    /// Adopt a peer's settings change. Returns false for our own broadcast.
    pub fn on_settings_changed(&mut self, ctx: &SessionCtx, ev: &SettingsEvent) -> bool {
        if ev.session_id == ctx.session_id() {
            return false;
        }
        self.settings = RoomSettings {
            subject_name: ev.subject_name.clone(),
            difficulty: ev.difficulty.clone(),
            set_number: ev.set_number,
        };
        self.index = 0;
        true
    }

    fn publish<T: serde::Serialize>(&self, kind: TopicKind, event: &str, payload: &T) {
        let res = self.deps.hub.channel(events::topic(&self.room, kind)).publish(event, payload);
        if let Err(e) = res {
            warn!(room = %self.room, event, error = %e, "publish failed");
            self.deps.metrics.publish_failures.inc(&[("event", event)]);
        }
    }
}
