use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::obs::GatewayMetrics;
use crate::store::RoomStore;

use super::PresenceTracker;

/// Deletes a room's durable record once its participant set is empty.
///
/// Deletion is best-effort: failures are logged and dropped, and deleting a
/// room that is already gone is a no-op.
pub struct RoomLifecycleManager {
    store: Arc<dyn RoomStore>,
    tracker: Arc<PresenceTracker>,
    metrics: Arc<GatewayMetrics>,
}

impl RoomLifecycleManager {
    pub fn new(store: Arc<dyn RoomStore>, tracker: Arc<PresenceTracker>, metrics: Arc<GatewayMetrics>) -> Self {
        Self { store, tracker, metrics }
    }

    /// Called when a room's participant set went empty.
    ///
    /// Someone may have rejoined in between; such rooms are kept.
    pub async fn on_participant_set_empty(&self, code: &str) -> u64 {
        if self.tracker.count(code) > 0 {
            debug!(room = code, "room repopulated before cleanup");
            self.metrics.room_deletions.inc(&[("outcome", "skipped")]);
            return 0;
        }
        self.attempt_delete(code).await
    }

    /// Delete by key. Returns affected rows; never fails.
    pub async fn attempt_delete(&self, code: &str) -> u64 {
        match self.store.delete(code).await {
            Ok(0) => {
                debug!(room = code, "room already deleted");
                self.metrics.room_deletions.inc(&[("outcome", "noop")]);
                0
            }
            Ok(n) => {
                info!(room = code, "room deleted after last leave");
                self.metrics.room_deletions.inc(&[("outcome", "deleted")]);
                n
            }
            Err(e) => {
                warn!(room = code, error = %e, "room delete failed");
                self.metrics.room_deletions.inc(&[("outcome", "failed")]);
                0
            }
        }
    }

    /// Drain empty-room notifications until every sender is gone.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<String>) {
        while let Some(code) = rx.recv().await {
            self.on_participant_set_empty(&code).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Hub;
    use crate::store::MemoryRoomStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use pairpad_core::error::{PairpadError, Result};
    use pairpad_core::model::{Room, RoomPatch, RoomSettings, SessionInfo};

    fn settings() -> RoomSettings {
        RoomSettings {
            subject_name: "Strings & Arrays".into(),
            difficulty: "Standard".into(),
            set_number: 1,
        }
    }

    struct FailingStore;

    #[async_trait]
    impl RoomStore for FailingStore {
        async fn get(&self, _: &str) -> Result<Option<Room>> {
            Ok(None)
        }
        async fn insert(&self, _: Room) -> Result<()> {
            Ok(())
        }
        async fn update(&self, _: &str, _: RoomPatch) -> Result<u64> {
            Ok(0)
        }
        async fn delete(&self, _: &str) -> Result<u64> {
            Err(PairpadError::Store("permission denied".into()))
        }
    }

    #[tokio::test]
    async fn second_delete_reports_zero() {
        let store = Arc::new(MemoryRoomStore::new());
        store.insert(Room::new("AB12", "start", settings(), "u1")).await.unwrap();
        let tracker = Arc::new(PresenceTracker::new(Hub::new(8)));
        let metrics = Arc::new(GatewayMetrics::default());
        let mgr = RoomLifecycleManager::new(store, tracker, metrics.clone());

        assert_eq!(mgr.attempt_delete("AB12").await, 1);
        assert_eq!(mgr.attempt_delete("AB12").await, 0);
        assert_eq!(metrics.room_deletions.get(&[("outcome", "noop")]), 1);
    }

    #[tokio::test]
    async fn store_failure_is_swallowed() {
        let tracker = Arc::new(PresenceTracker::new(Hub::new(8)));
        let metrics = Arc::new(GatewayMetrics::default());
        let mgr = RoomLifecycleManager::new(Arc::new(FailingStore), tracker, metrics.clone());
        assert_eq!(mgr.attempt_delete("AB12").await, 0);
        assert_eq!(metrics.room_deletions.get(&[("outcome", "failed")]), 1);
    }

    #[tokio::test]
    async fn repopulated_room_is_kept() {
        let store = Arc::new(MemoryRoomStore::new());
        store.insert(Room::new("AB12", "start", settings(), "u1")).await.unwrap();
        let tracker = Arc::new(PresenceTracker::new(Hub::new(8)));
        let mgr = RoomLifecycleManager::new(store.clone(), tracker.clone(), Arc::new(GatewayMetrics::default()));

        let _s = tracker
            .join(
                "AB12",
                SessionInfo {
                    session_id: "s9".into(),
                    display_name: "late".into(),
                    joined_at: Utc::now(),
                },
            )
            .unwrap();
        assert_eq!(mgr.on_participant_set_empty("AB12").await, 0);
        assert!(store.get("AB12").await.unwrap().is_some());
    }
}
