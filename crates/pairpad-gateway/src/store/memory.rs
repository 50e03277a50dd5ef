use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use pairpad_core::error::{PairpadError, Result};
use pairpad_core::model::{Room, RoomPatch};

use super::RoomStore;

/// Process-local store: `code -> Room`.
#[derive(Default)]
pub struct MemoryRoomStore {
    rooms: DashMap<String, Room>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self { rooms: DashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn get(&self, code: &str) -> Result<Option<Room>> {
        Ok(self.rooms.get(code).map(|r| r.value().clone()))
    }

    async fn insert(&self, room: Room) -> Result<()> {
        match self.rooms.entry(room.code.clone()) {
            Entry::Occupied(_) => Err(PairpadError::BadRequest(format!("room {} already exists", room.code))),
            Entry::Vacant(v) => {
                v.insert(room);
                Ok(())
            }
        }
    }

    async fn update(&self, code: &str, patch: RoomPatch) -> Result<u64> {
        match self.rooms.get_mut(code) {
            Some(mut room) => {
                room.apply(&patch);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete(&self, code: &str) -> Result<u64> {
        Ok(self.rooms.remove(code).map(|_| 1).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairpad_core::model::RoomSettings;

    fn room(code: &str) -> Room {
        Room::new(
            code,
            "start",
            RoomSettings {
                subject_name: "Strings & Arrays".into(),
                difficulty: "Standard".into(),
                set_number: 1,
            },
            "u1",
        )
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryRoomStore::new();
        store.insert(room("AB12")).await.unwrap();
        assert_eq!(store.delete("AB12").await.unwrap(), 1);
        assert_eq!(store.delete("AB12").await.unwrap(), 0);
        assert!(store.get("AB12").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_rejected() {
        let store = MemoryRoomStore::new();
        store.insert(room("AB12")).await.unwrap();
        assert!(store.insert(room("AB12")).await.is_err());
    }

    #[tokio::test]
    async fn update_reports_affected_rows() {
        let store = MemoryRoomStore::new();
        assert_eq!(store.update("NOPE", RoomPatch::question_index(1)).await.unwrap(), 0);

        store.insert(room("AB12")).await.unwrap();
        assert_eq!(store.update("AB12", RoomPatch::content("x", Some(2))).await.unwrap(), 1);
        let r = store.get("AB12").await.unwrap().unwrap();
        assert_eq!((r.content.as_str(), r.version), ("x", 2));
    }
}
