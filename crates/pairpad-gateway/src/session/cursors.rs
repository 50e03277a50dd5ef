use std::collections::BTreeMap;

use pairpad_core::model::{CursorState, SessionInfo};
use pairpad_core::protocol::events::CursorEvent;

/// Latest caret of every other session in the room. Last received wins per session.
#[derive(Debug, Default)]
pub struct CursorBoard {
    cursors: BTreeMap<String, CursorState>,
}

impl CursorBoard {
    /// Record a peer's caret. Own broadcasts are ignored.
    pub fn update(&mut self, own_session: &str, ev: CursorEvent) -> bool {
        if ev.session_id == own_session {
            return false;
        }
        let state = CursorState {
            line: ev.line,
            column: ev.column,
            display_name: ev.display_name,
        };
        self.cursors.insert(ev.session_id, state);
        true
    }

    /// Drop carets of sessions that left. Returns true when anything was removed.
    pub fn remove_left(&mut self, left: &[SessionInfo]) -> bool {
        let before = self.cursors.len();
        for s in left {
            self.cursors.remove(&s.session_id);
        }
        self.cursors.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CursorState)> {
        self.cursors.iter()
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ev(id: &str, line: u32) -> CursorEvent {
        CursorEvent {
            session_id: id.into(),
            display_name: id.to_uppercase(),
            line,
            column: 1,
        }
    }

    #[test]
    fn own_cursor_ignored_and_latest_wins() {
        let mut board = CursorBoard::default();
        assert!(!board.update("s1", ev("s1", 1)));
        assert!(board.update("s1", ev("s2", 1)));
        assert!(board.update("s1", ev("s2", 7)));
        assert_eq!(board.len(), 1);
        assert_eq!(board.iter().next().unwrap().1.line, 7);
    }

    #[test]
    fn leave_removes_entry() {
        let mut board = CursorBoard::default();
        board.update("s1", ev("s2", 1));
        let left = SessionInfo {
            session_id: "s2".into(),
            display_name: "S2".into(),
            joined_at: Utc::now(),
        };
        assert!(board.remove_left(std::slice::from_ref(&left)));
        assert!(!board.remove_left(&[left]));
        assert!(board.is_empty());
    }
}
