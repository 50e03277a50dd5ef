use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use pairpad_core::model::{Caret, Language, SessionInfo};

use crate::exec::{CodeExecutor, ExecutorRegistry};

/// Explicit per-session state threaded through the sync and navigation handlers.
pub struct SessionCtx {
    pub info: SessionInfo,
    pub room: String,
    pub language: Language,
    /// Last caret the client reported.
    pub caret: Option<Caret>,
    /// Remote buffers applied within the lock window, oldest first.
    sync_lock: VecDeque<SyncLock>,
    executor: Option<(Language, Option<Arc<dyn CodeExecutor>>)>,
}

struct SyncLock {
    until: Instant,
    applied: String,
}

impl SessionCtx {
    pub fn new(info: SessionInfo, room: impl Into<String>, language: Language) -> Self {
        Self {
            info,
            room: room.into(),
            language,
            caret: None,
            sync_lock: VecDeque::new(),
            executor: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.info.session_id
    }

    /// Hold the sync lock for `ttl` after a remote buffer was applied.
    ///
    /// Every buffer applied inside the window stays locked, so a late echo
    /// of an older apply is still recognised.
    pub fn lock_sync(&mut self, applied: &str, ttl: Duration) {
        let now = Instant::now();
        self.expire_locks(now);
        self.sync_lock.push_back(SyncLock {
            until: now + ttl,
            applied: applied.to_string(),
        });
    }

    /// True when `content` is just the editor reflecting a remote apply.
    pub fn is_sync_echo(&mut self, content: &str) -> bool {
        self.expire_locks(Instant::now());
        self.sync_lock.iter().any(|lock| lock.applied == content)
    }

    fn expire_locks(&mut self, now: Instant) {
        while self.sync_lock.front().is_some_and(|lock| lock.until <= now) {
            self.sync_lock.pop_front();
        }
    }

    /// Executor for the current language, looked up once per language.
    pub fn executor(&mut self, registry: &ExecutorRegistry) -> Option<Arc<dyn CodeExecutor>> {
        match &self.executor {
            Some((lang, exec)) if *lang == self.language => exec.clone(),
            _ => {
                let exec = registry.get(self.language);
                self.executor = Some((self.language, exec.clone()));
                exec
            }
        }
    }
}
