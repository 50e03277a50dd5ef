//! Durable room records and the local fallback cache.
//!
//! `RoomStore` is the seam to whatever transactional store backs rooms. Every
//! implementation applies partial updates through `Room::apply`, so version
//! stamping behaves identically across backends.

mod cache;
mod memory;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;

use pairpad_core::error::Result;
use pairpad_core::model::{Room, RoomPatch};

use crate::config::{StoreKind, StoreSection};

pub use cache::{FallbackCache, MokaCache};
pub use memory::MemoryRoomStore;
pub use sqlite::SqliteRoomStore;

#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn get(&self, code: &str) -> Result<Option<Room>>;

    /// Fails with `BadRequest` when the code is taken.
    async fn insert(&self, room: Room) -> Result<()>;

    /// Returns the number of rows touched (0 when the room is gone).
    async fn update(&self, code: &str, patch: RoomPatch) -> Result<u64>;

    /// Returns the number of rows removed; deleting a missing room yields 0.
    async fn delete(&self, code: &str) -> Result<u64>;
}

/// Build the store selected in config.
pub async fn open(cfg: &StoreSection) -> Result<Arc<dyn RoomStore>> {
    match cfg.kind {
        StoreKind::Memory => Ok(Arc::new(MemoryRoomStore::new())),
        StoreKind::Sqlite => {
            let url = cfg.url.as_deref().unwrap_or_default();
            Ok(Arc::new(SqliteRoomStore::connect(url).await?))
        }
    }
}

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const ROOM_CODE_LEN: usize = 6;

/// Random shareable room code (no 0/O/1/I).
pub fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}
