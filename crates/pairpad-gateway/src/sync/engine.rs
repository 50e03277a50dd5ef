//! Last-writer-wins buffer reconciliation for one session.
//!
//! Every buffer carries an `EditStamp`; a remote broadcast replaces the whole
//! buffer only when its stamp is newer. Local edits are applied immediately
//! and flushed after a quiet period: publish first, then persist.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use pairpad_core::model::{is_unset, Caret, Room, RoomPatch, SessionInfo, PLACEHOLDER_CONTENT};
use pairpad_core::protocol::events::{self, ContentEvent, ContentRequest, TopicKind};

use crate::broadcast::Hub;
use crate::obs::GatewayMetrics;
use crate::session::SessionCtx;
use crate::store::{FallbackCache, RoomStore};

use super::Clock;

/// Shared collaborators of every session's engine.
#[derive(Clone)]
pub struct SyncDeps {
    pub hub: Hub,
    pub store: Arc<dyn RoomStore>,
    pub cache: Arc<dyn FallbackCache>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<GatewayMetrics>,
    pub debounce: Duration,
    pub sync_lock: Duration,
}

/// Total order over edits: time first, session id breaks ties.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct EditStamp {
    pub timestamp_ms: i64,
    pub session_id: String,
}

/// The latest unflushed local edit.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEdit {
    pub content: String,
    pub stamp: EditStamp,
    pub due: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOutcome {
    /// The client reflected a buffer we just pushed to it.
    Suppressed,
    Unchanged,
    /// Debounce (re)started.
    Scheduled { due: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    Echo,
    Unchanged,
    Stale,
    /// Buffer replaced; `caret` is the client's caret clamped into it.
    Applied { join_sync: bool, caret: Option<Caret> },
}

impl RemoteOutcome {
    fn label(&self) -> &'static str {
        match self {
            RemoteOutcome::Echo => "echo",
            RemoteOutcome::Unchanged => "unchanged",
            RemoteOutcome::Stale => "stale",
            RemoteOutcome::Applied { .. } => "applied",
        }
    }
}

pub struct SyncEngine {
    deps: SyncDeps,
    room: String,
    buffer: String,
    stamp: EditStamp,
    /// Next version this session will write.
    version: u64,
    pending: Option<PendingEdit>,
    awaiting_join_sync: bool,
}

impl SyncEngine {
    pub fn new(deps: SyncDeps, room: impl Into<String>) -> Self {
        Self {
            deps,
            room: room.into(),
            buffer: PLACEHOLDER_CONTENT.to_string(),
            stamp: EditStamp::default(),
            version: 1,
            pending: None,
            awaiting_join_sync: true,
        }
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn pending(&self) -> Option<&PendingEdit> {
        self.pending.as_ref()
    }

    /// Load the buffer from the stored room.
    ///
    /// The fallback cache wins only over placeholder content, and a restored
    /// buffer is saved right away.
    pub async fn seed(&mut self, room: &Room) -> &str {
        self.version = room.version + 1;
        self.stamp = EditStamp {
            timestamp_ms: room.last_updated.timestamp_millis(),
            session_id: String::new(),
        };
        self.buffer = room.content.clone();
        self.awaiting_join_sync = true;

        if is_unset(&room.content) {
            if let Some(cached) = self.deps.cache.get(&self.room).filter(|c| !is_unset(c)) {
                debug!(room = %self.room, "restoring buffer from fallback cache");
                self.buffer = cached.clone();
                self.persist(cached).await;
            }
        }
        &self.buffer
    }

    pub fn apply_local_edit(&mut self, ctx: &mut SessionCtx, content: String) -> LocalOutcome {
        if ctx.is_sync_echo(&content) {
            return LocalOutcome::Suppressed;
        }
        if content == self.buffer {
            return LocalOutcome::Unchanged;
        }

        self.stamp = self.next_stamp(ctx);
        self.buffer = content.clone();
        self.awaiting_join_sync = false;

        let due = Instant::now() + self.deps.debounce;
        self.pending = Some(PendingEdit {
            content,
            stamp: self.stamp.clone(),
            due,
        });
        LocalOutcome::Scheduled { due }
    }

    pub fn flush_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.due)
    }

    /// Flush if the debounce window has elapsed.
    pub async fn flush_if_due(&mut self) -> bool {
        match self.flush_deadline() {
            Some(due) if due <= Instant::now() => self.flush().await,
            _ => false,
        }
    }

    /// Publish the pending edit, then persist it. Both steps are best-effort.
    pub async fn flush(&mut self) -> bool {
        self.flush_as("debounce").await
    }

    async fn flush_as(&mut self, trigger: &str) -> bool {
        let Some(edit) = self.pending.take() else {
            return false;
        };
        self.publish_content(&edit.content, &edit.stamp, Some(self.version), false);
        self.persist(edit.content).await;
        self.deps.metrics.flushes.inc(&[("trigger", trigger)]);
        true
    }

    pub fn on_remote_edit(&mut self, ctx: &mut SessionCtx, ev: ContentEvent) -> RemoteOutcome {
        let outcome = self.reconcile(ctx, ev);
        self.deps.metrics.remote_edits.inc(&[("outcome", outcome.label())]);
        outcome
    }

    fn reconcile(&mut self, ctx: &mut SessionCtx, ev: ContentEvent) -> RemoteOutcome {
        let join_sync = ev.is_join_sync && self.awaiting_join_sync;
        if ev.session_id == ctx.session_id() && !join_sync {
            return RemoteOutcome::Echo;
        }

        if let Some(v) = ev.version {
            if v >= self.version {
                self.version = v + 1;
            }
        }

        let stamp = EditStamp {
            timestamp_ms: ev.timestamp,
            session_id: ev.session_id,
        };
        if ev.content == self.buffer {
            if stamp > self.stamp {
                self.stamp = stamp;
            }
            if ev.is_join_sync {
                self.awaiting_join_sync = false;
            }
            return RemoteOutcome::Unchanged;
        }
        if !join_sync && stamp <= self.stamp {
            debug!(room = %self.room, from = %stamp.session_id, "stale remote edit dropped");
            return RemoteOutcome::Stale;
        }

        if self.pending.take().is_some() {
            debug!(room = %self.room, "pending edit superseded by remote edit");
        }
        self.buffer = ev.content;
        self.stamp = stamp;
        self.awaiting_join_sync = false;
        self.deps.cache.put(&self.room, &self.buffer);
        ctx.lock_sync(&self.buffer, self.deps.sync_lock);

        let caret = ctx.caret.map(|c| c.clamp_to(&self.buffer));
        ctx.caret = caret;
        RemoteOutcome::Applied {
            join_sync: ev.is_join_sync,
            caret,
        }
    }

    /// Ask peers for their buffers. Called once after joining.
    pub fn request_latest_content(&self, ctx: &SessionCtx) {
        let req = ContentRequest {
            session_id: ctx.session_id().to_string(),
            timestamp: self.deps.clock.now_ms(),
        };
        let res = self
            .deps
            .hub
            .channel(events::topic(&self.room, TopicKind::Sync))
            .publish(events::REQUEST_CONTENT, &req);
        if let Err(e) = res {
            warn!(room = %self.room, error = %e, "content request publish failed");
            self.deps.metrics.publish_failures.inc(&[("event", events::REQUEST_CONTENT)]);
        }
    }

    /// Answer a peer's content request with our buffer.
    pub fn on_content_request(&self, ctx: &SessionCtx, req: &ContentRequest) -> bool {
        if req.session_id == ctx.session_id() {
            return false;
        }
        self.respond_join_sync("request")
    }

    /// Re-publish for newcomers when this session was alone before they arrived.
    ///
    /// Several sessions may believe they are the oldest member; duplicate
    /// responses carry the same converged buffer.
    pub fn on_peers_joined(&self, ctx: &SessionCtx, newcomers: &[SessionInfo], was_alone: bool) -> bool {
        if !was_alone || newcomers.iter().any(|s| s.joined_at < ctx.info.joined_at) {
            return false;
        }
        self.respond_join_sync("presence")
    }

    fn respond_join_sync(&self, trigger: &str) -> bool {
        if is_unset(&self.buffer) {
            return false;
        }
        let delivered = self.publish_content(&self.buffer, &self.stamp, Some(self.version), true);
        self.deps.metrics.join_sync_responses.inc(&[("trigger", trigger)]);
        debug!(room = %self.room, trigger, delivered, "join-sync response published");
        true
    }

    /// Persist now, bypassing the debounce.
    pub async fn save_now(&mut self, ctx: &mut SessionCtx, content: Option<String>) -> bool {
        if let Some(content) = content {
            self.apply_local_edit(ctx, content);
        }
        if self.pending.is_some() {
            return self.flush_as("save").await;
        }
        if is_unset(&self.buffer) {
            return false;
        }
        self.deps.metrics.flushes.inc(&[("trigger", "save")]);
        self.persist(self.buffer.clone()).await
    }

    /// Last-chance save when the connection is gone.
    ///
    /// The cache write happens before returning; the store write is spawned
    /// and may not complete.
    pub fn teardown(&mut self) {
        if let Some(edit) = self.pending.take() {
            self.publish_content(&edit.content, &edit.stamp, Some(self.version), false);
        }
        if is_unset(&self.buffer) {
            return;
        }
        self.deps.cache.put(&self.room, &self.buffer);

        let store = Arc::clone(&self.deps.store);
        let room = self.room.clone();
        let patch = RoomPatch::content(self.buffer.clone(), Some(self.version));
        self.version += 1;
        tokio::spawn(async move {
            if let Err(e) = store.update(&room, patch).await {
                warn!(room = %room, error = %e, "teardown save failed");
            }
        });
    }

    fn next_stamp(&self, ctx: &SessionCtx) -> EditStamp {
        // never stamp below an edit this session has already seen
        EditStamp {
            timestamp_ms: self.deps.clock.now_ms().max(self.stamp.timestamp_ms + 1),
            session_id: ctx.session_id().to_string(),
        }
    }

    /// Publish `content` under the stamp of the edit that produced it.
    fn publish_content(&self, content: &str, stamp: &EditStamp, version: Option<u64>, is_join_sync: bool) -> usize {
        let ev = ContentEvent {
            content: content.to_string(),
            session_id: stamp.session_id.clone(),
            timestamp: stamp.timestamp_ms,
            version,
            is_join_sync,
        };
        match self
            .deps
            .hub
            .channel(events::topic(&self.room, TopicKind::Content))
            .publish(events::CONTENT, &ev)
        {
            Ok(n) => n,
            Err(e) => {
                warn!(room = %self.room, error = %e, "content publish failed");
                self.deps.metrics.publish_failures.inc(&[("event", events::CONTENT)]);
                0
            }
        }
    }

    /// Write `content` at the next version. The version advances even when the write fails.
    async fn persist(&mut self, content: String) -> bool {
        let version = self.version;
        self.version += 1;
        self.deps.cache.put(&self.room, &content);

        match self.deps.store.update(&self.room, RoomPatch::content(content, Some(version))).await {
            Ok(0) => {
                warn!(room = %self.room, "room record missing; content not persisted");
                self.deps.metrics.persist_failures.inc(&[("reason", "missing")]);
                false
            }
            Ok(_) => true,
            Err(e) => {
                warn!(room = %self.room, error = %e, "content persist failed");
                self.deps.metrics.persist_failures.inc(&[("reason", "store")]);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheSection;
    use crate::store::{MemoryRoomStore, MokaCache};
    use crate::sync::ManualClock;
    use chrono::Utc;
    use pairpad_core::model::{Language, RoomSettings};

    struct Fixture {
        deps: SyncDeps,
        store: Arc<MemoryRoomStore>,
        clock: Arc<ManualClock>,
    }

    async fn fixture(content: &str) -> Fixture {
        let store = Arc::new(MemoryRoomStore::new());
        store
            .insert(Room::new(
                "AB12",
                content,
                RoomSettings {
                    subject_name: "Strings & Arrays".into(),
                    difficulty: "Standard".into(),
                    set_number: 1,
                },
                "u1",
            ))
            .await
            .unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now().timestamp_millis()));
        let deps = SyncDeps {
            hub: Hub::new(64),
            store: store.clone(),
            cache: Arc::new(MokaCache::new(&CacheSection::default())),
            clock: clock.clone(),
            metrics: Arc::new(GatewayMetrics::default()),
            debounce: Duration::from_millis(300),
            sync_lock: Duration::from_millis(500),
        };
        Fixture { deps, store, clock }
    }

    fn ctx(id: &str) -> SessionCtx {
        SessionCtx::new(
            SessionInfo {
                session_id: id.into(),
                display_name: id.to_uppercase(),
                joined_at: Utc::now(),
            },
            "AB12",
            Language::Python,
        )
    }

    fn remote(content: &str, from: &str, ts: i64) -> ContentEvent {
        ContentEvent {
            content: content.into(),
            session_id: from.into(),
            timestamp: ts,
            version: None,
            is_join_sync: false,
        }
    }

    async fn seeded(f: &Fixture) -> SyncEngine {
        let room = f.store.get("AB12").await.unwrap().unwrap();
        let mut engine = SyncEngine::new(f.deps.clone(), "AB12");
        engine.seed(&room).await;
        engine
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_restarts_and_flushes_last_edit() {
        let f = fixture("start").await;
        let mut e = seeded(&f).await;
        let mut c = ctx("s1");

        let first = e.apply_local_edit(&mut c, "a".into());
        tokio::time::advance(Duration::from_millis(200)).await;
        let second = e.apply_local_edit(&mut c, "ab".into());
        assert!(matches!((first, second), (LocalOutcome::Scheduled { due: d1 }, LocalOutcome::Scheduled { due: d2 }) if d2 > d1));

        assert!(!e.flush_if_due().await);
        tokio::time::advance(Duration::from_millis(300)).await;
        assert!(e.flush_if_due().await);

        let room = f.store.get("AB12").await.unwrap().unwrap();
        assert_eq!(room.content, "ab");
        assert_eq!(room.version, 2);
        assert_eq!(e.version(), 3);
    }

    #[tokio::test]
    async fn own_broadcast_is_an_echo() {
        let f = fixture("start").await;
        let mut e = seeded(&f).await;
        let mut c = ctx("s1");
        let out = e.on_remote_edit(&mut c, remote("mine", "s1", 9_999));
        assert_eq!(out, RemoteOutcome::Echo);
        assert_eq!(e.buffer(), "start");
    }

    #[tokio::test]
    async fn older_stamp_is_stale() {
        let f = fixture("start").await;
        let mut e = seeded(&f).await;
        let mut c = ctx("s1");
        let now = f.clock.now_ms();

        assert!(matches!(e.on_remote_edit(&mut c, remote("new", "s2", now + 10)), RemoteOutcome::Applied { .. }));
        assert_eq!(e.on_remote_edit(&mut c, remote("old", "s3", now + 5)), RemoteOutcome::Stale);
        assert_eq!(e.buffer(), "new");
    }

    #[tokio::test(start_paused = true)]
    async fn remote_apply_discards_pending_and_locks_sync() {
        let f = fixture("start").await;
        let mut e = seeded(&f).await;
        let mut c = ctx("s1");
        c.caret = Some(Caret { line: 3, column: 9 });

        e.apply_local_edit(&mut c, "local".into());
        let far = f.clock.now_ms() + 1_000;
        let out = e.on_remote_edit(&mut c, remote("x\nyz", "s2", far));
        assert_eq!(
            out,
            RemoteOutcome::Applied {
                join_sync: false,
                caret: Some(Caret { line: 2, column: 3 })
            }
        );
        assert!(e.pending().is_none());

        // editor reflecting the applied buffer is not a new edit
        assert_eq!(e.apply_local_edit(&mut c, "x\nyz".into()), LocalOutcome::Suppressed);
    }

    #[tokio::test(start_paused = true)]
    async fn late_echo_of_an_earlier_apply_is_suppressed() {
        let f = fixture("start").await;
        let mut e = seeded(&f).await;
        let mut c = ctx("s1");
        let now = f.clock.now_ms();

        e.on_remote_edit(&mut c, remote("A", "s2", now + 10));
        tokio::time::advance(Duration::from_millis(5)).await;
        e.on_remote_edit(&mut c, remote("B", "s3", now + 20));
        tokio::time::advance(Duration::from_millis(10)).await;

        assert_eq!(e.apply_local_edit(&mut c, "A".into()), LocalOutcome::Suppressed);
        assert_eq!(e.buffer(), "B");
        assert!(e.pending().is_none());
    }

    #[tokio::test]
    async fn join_sync_response_carries_author_stamp_and_version() {
        let f = fixture("start").await;
        let mut wire = f
            .deps
            .hub
            .channel(events::topic("AB12", TopicKind::Content))
            .on(events::CONTENT)
            .subscribe();
        let mut e = seeded(&f).await;
        let mut c = ctx("s1");
        let authored = f.clock.now_ms() + 5;
        e.on_remote_edit(&mut c, remote("theirs", "s3", authored));

        let req = ContentRequest { session_id: "s2".into(), timestamp: 0 };
        assert!(e.on_content_request(&c, &req));

        let ev: ContentEvent = wire.try_recv().unwrap().decode().unwrap();
        assert!(ev.is_join_sync);
        assert_eq!(ev.content, "theirs");
        assert_eq!(ev.session_id, "s3");
        assert_eq!(ev.timestamp, authored);
        assert_eq!(ev.version, Some(e.version()));
    }

    #[tokio::test]
    async fn join_sync_response_does_not_beat_a_same_millisecond_edit() {
        let f = fixture("start").await;
        let mut responder = seeded(&f).await;
        let mut bystander = seeded(&f).await;
        let mut rc = ctx("s9");
        let mut bc = ctx("s5");
        let ts = f.clock.now_ms() + 5;

        // s1's older edit reached the responder; s4's edit in the same ms won at the bystander
        responder.on_remote_edit(&mut rc, remote("older", "s1", ts));
        bystander.on_remote_edit(&mut bc, remote("newer", "s4", ts));
        bystander.on_remote_edit(&mut bc, remote("older", "s1", ts));
        assert_eq!(bystander.buffer(), "newer");

        let mut wire = f
            .deps
            .hub
            .channel(events::topic("AB12", TopicKind::Content))
            .on(events::CONTENT)
            .subscribe();
        let req = ContentRequest { session_id: "s7".into(), timestamp: 0 };
        responder.on_content_request(&rc, &req);
        let ev: ContentEvent = wire.try_recv().unwrap().decode().unwrap();

        assert_eq!(bystander.on_remote_edit(&mut bc, ev), RemoteOutcome::Stale);
        assert_eq!(bystander.buffer(), "newer");
    }

    #[tokio::test]
    async fn version_reconciles_past_incoming() {
        let f = fixture("start").await;
        let mut e = seeded(&f).await;
        let mut c = ctx("s1");
        let mut ev = remote("v9", "s2", f.clock.now_ms() + 1);
        ev.version = Some(9);
        e.on_remote_edit(&mut c, ev);
        assert_eq!(e.version(), 10);
    }

    #[tokio::test]
    async fn join_sync_accepted_while_awaiting() {
        let f = fixture("start").await;
        let mut e = seeded(&f).await;
        let mut c = ctx("s2");

        // responder's buffer is older than the stored record but still wins
        let mut ev = remote("X", "s1", 0);
        ev.is_join_sync = true;
        assert!(matches!(e.on_remote_edit(&mut c, ev.clone()), RemoteOutcome::Applied { join_sync: true, .. }));
        assert_eq!(e.buffer(), "X");

        ev.content = "Y".into();
        assert_eq!(e.on_remote_edit(&mut c, ev), RemoteOutcome::Stale);
    }

    #[tokio::test]
    async fn placeholder_seed_prefers_cache_and_saves() {
        let f = fixture("").await;
        f.deps.cache.put("AB12", "cached work");
        let e = seeded(&f).await;
        assert_eq!(e.buffer(), "cached work");
        let room = f.store.get("AB12").await.unwrap().unwrap();
        assert_eq!(room.content, "cached work");
        assert_eq!(room.version, 2);
    }

    #[tokio::test]
    async fn placeholder_buffer_never_answers_requests() {
        let f = fixture("").await;
        let e = seeded(&f).await;
        let c = ctx("s1");
        let req = ContentRequest { session_id: "s2".into(), timestamp: 0 };
        assert!(!e.on_content_request(&c, &req));
    }

    #[tokio::test]
    async fn first_observer_responds_only_to_later_joiners() {
        let f = fixture("start").await;
        let e = seeded(&f).await;
        let c = ctx("s1");
        let mut later = c.info.clone();
        later.session_id = "s2".into();
        later.joined_at = c.info.joined_at + chrono::Duration::seconds(1);
        let mut earlier = later.clone();
        earlier.joined_at = c.info.joined_at - chrono::Duration::seconds(1);

        assert!(e.on_peers_joined(&c, &[later.clone()], true));
        assert!(!e.on_peers_joined(&c, &[later], false));
        assert!(!e.on_peers_joined(&c, &[earlier], true));
    }

    #[tokio::test]
    async fn teardown_caches_and_persists() {
        let f = fixture("start").await;
        let mut e = seeded(&f).await;
        let mut c = ctx("s1");
        e.apply_local_edit(&mut c, "unsaved".into());
        e.teardown();
        assert_eq!(f.deps.cache.get("AB12").as_deref(), Some("unsaved"));

        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        let room = f.store.get("AB12").await.unwrap().unwrap();
        assert_eq!(room.content, "unsaved");
    }
}
