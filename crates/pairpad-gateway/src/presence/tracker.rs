use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use pairpad_core::error::Result;
use pairpad_core::model::SessionInfo;
use pairpad_core::protocol::events::{self, PresenceEvent, TopicKind};

use crate::broadcast::{Hub, Subscription};

/// Peers entering or leaving, deduplicated by session id. Never contains the observer.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceChange {
    Join(Vec<SessionInfo>),
    Leave(Vec<SessionInfo>),
}

/// Room presence: `room -> {session id -> SessionInfo}`.
///
/// Entries are tracked for as long as the owning `PresenceHandle` lives. When
/// an untrack leaves a room empty, the room code is sent to the empty-room
/// listener (the lifecycle manager).
pub struct PresenceTracker {
    hub: Hub,
    rooms: DashMap<String, DashMap<String, SessionInfo>>,
    on_empty: Option<mpsc::UnboundedSender<String>>,
}

impl PresenceTracker {
    pub fn new(hub: Hub) -> Self {
        Self {
            hub,
            rooms: DashMap::new(),
            on_empty: None,
        }
    }

    /// Tracker that reports rooms whose participant set became empty.
    pub fn with_empty_listener(hub: Hub, on_empty: mpsc::UnboundedSender<String>) -> Self {
        Self {
            on_empty: Some(on_empty),
            ..Self::new(hub)
        }
    }

    /// Track `session` in `room` and announce it to the room.
    ///
    /// The returned handle carries the members present before this join and
    /// receives every later join/leave. Dropping it untracks the session.
    pub fn join(self: &Arc<Self>, room: &str, session: SessionInfo) -> Result<PresenceHandle> {
        let sub = self
            .hub
            .channel(events::topic(room, TopicKind::Presence))
            .on(events::PRESENCE_JOIN)
            .on(events::PRESENCE_LEAVE)
            .subscribe();

        let members = self.rooms.entry(room.to_string()).or_default();
        let peers: Vec<SessionInfo> = members
            .iter()
            .filter(|m| m.key() != &session.session_id)
            .map(|m| m.value().clone())
            .collect();
        members.insert(session.session_id.clone(), session.clone());
        drop(members);

        self.hub.channel(events::topic(room, TopicKind::Presence)).publish(
            events::PRESENCE_JOIN,
            &PresenceEvent {
                sessions: vec![session.clone()],
            },
        )?;

        Ok(PresenceHandle {
            tracker: Arc::clone(self),
            room: room.to_string(),
            session,
            peers: sorted(peers),
            sub,
            tracked: true,
        })
    }

    pub fn count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }

    /// Remove the session; returns how many members remain.
    fn untrack(&self, room: &str, session: &SessionInfo) -> usize {
        let remaining = match self.rooms.get(room) {
            Some(members) => {
                members.remove(&session.session_id);
                members.len()
            }
            None => 0,
        };
        if remaining == 0 && self.rooms.remove_if(room, |_, m| m.is_empty()).is_some() {
            if let Some(tx) = &self.on_empty {
                let _ = tx.send(room.to_string());
            }
        }

        let published = self.hub.channel(events::topic(room, TopicKind::Presence)).publish(
            events::PRESENCE_LEAVE,
            &PresenceEvent {
                sessions: vec![session.clone()],
            },
        );
        if let Err(e) = published {
            tracing::warn!(room, error = %e, "presence leave publish failed");
        }
        remaining
    }
}

fn sorted(mut list: Vec<SessionInfo>) -> Vec<SessionInfo> {
    list.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.session_id.cmp(&b.session_id)));
    list
}

/// One session's tracked presence in one room.
pub struct PresenceHandle {
    tracker: Arc<PresenceTracker>,
    room: String,
    session: SessionInfo,
    peers: Vec<SessionInfo>,
    sub: Subscription,
    tracked: bool,
}

impl PresenceHandle {
    /// Members that were already present when this session joined.
    pub fn initial_peers(&self) -> &[SessionInfo] {
        &self.peers
    }

    /// Next join/leave of some other session. `None` once the hub is gone.
    pub async fn next_change(&mut self) -> Option<PresenceChange> {
        loop {
            let msg = self.sub.recv().await?;
            let ev: PresenceEvent = match msg.decode() {
                Ok(ev) => ev,
                Err(e) => {
                    tracing::warn!(room = %self.room, error = %e, "bad presence payload");
                    continue;
                }
            };

            let mut seen = HashSet::new();
            let sessions: Vec<SessionInfo> = ev
                .sessions
                .into_iter()
                .filter(|s| s.session_id != self.session.session_id)
                .filter(|s| seen.insert(s.session_id.clone()))
                .collect();
            if sessions.is_empty() {
                continue;
            }

            return Some(match &*msg.event {
                events::PRESENCE_LEAVE => PresenceChange::Leave(sessions),
                _ => PresenceChange::Join(sessions),
            });
        }
    }

    /// Untrack now. Returns how many members remain in the room.
    pub fn leave(mut self) -> usize {
        self.tracked = false;
        self.tracker.untrack(&self.room, &self.session)
    }
}

impl Drop for PresenceHandle {
    fn drop(&mut self) {
        if self.tracked {
            self.tracker.untrack(&self.room, &self.session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn info(id: &str, offset_ms: i64) -> SessionInfo {
        SessionInfo {
            session_id: id.into(),
            display_name: format!("user-{id}"),
            joined_at: Utc::now() + Duration::milliseconds(offset_ms),
        }
    }

    #[tokio::test]
    async fn join_reports_existing_peers_and_notifies_them() {
        let tracker = Arc::new(PresenceTracker::new(Hub::new(16)));
        let mut s1 = tracker.join("AB12", info("s1", 0)).unwrap();
        assert!(s1.initial_peers().is_empty());

        let s2 = tracker.join("AB12", info("s2", 10)).unwrap();
        assert_eq!(s2.initial_peers().len(), 1);
        assert_eq!(s2.initial_peers()[0].session_id, "s1");

        match s1.next_change().await.unwrap() {
            PresenceChange::Join(list) => assert_eq!(list[0].session_id, "s2"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(tracker.count("AB12"), 2);
    }

    #[tokio::test]
    async fn own_join_is_not_reported() {
        let tracker = Arc::new(PresenceTracker::new(Hub::new(16)));
        let mut s1 = tracker.join("AB12", info("s1", 0)).unwrap();
        let _s2 = tracker.join("AB12", info("s2", 0)).unwrap();
        // the first change s1 sees is s2, not its own announcement
        assert!(matches!(s1.next_change().await, Some(PresenceChange::Join(l)) if l[0].session_id == "s2"));
    }

    #[tokio::test]
    async fn last_leave_notifies_empty_listener() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tracker = Arc::new(PresenceTracker::with_empty_listener(Hub::new(16), tx));
        let s1 = tracker.join("AB12", info("s1", 0)).unwrap();
        let s2 = tracker.join("AB12", info("s2", 0)).unwrap();

        assert_eq!(s2.leave(), 1);
        assert!(rx.try_recv().is_err());

        drop(s1);
        assert_eq!(rx.try_recv().unwrap(), "AB12");
        assert_eq!(tracker.count("AB12"), 0);
    }

    #[tokio::test]
    async fn leave_is_seen_by_remaining_peer() {
        let tracker = Arc::new(PresenceTracker::new(Hub::new(16)));
        let mut s1 = tracker.join("AB12", info("s1", 0)).unwrap();
        let s2 = tracker.join("AB12", info("s2", 5)).unwrap();
        s2.leave();

        assert!(matches!(s1.next_change().await, Some(PresenceChange::Join(_))));
        match s1.next_change().await.unwrap() {
            PresenceChange::Leave(list) => assert_eq!(list[0].session_id, "s2"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
