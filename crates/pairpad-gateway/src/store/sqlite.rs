use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use pairpad_core::error::{PairpadError, Result};
use pairpad_core::model::{Room, RoomPatch};

use super::RoomStore;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS rooms (
    code TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    language TEXT NOT NULL,
    version INTEGER NOT NULL,
    last_updated INTEGER NOT NULL,
    subject_name TEXT NOT NULL,
    difficulty TEXT NOT NULL,
    set_number INTEGER NOT NULL,
    question_index INTEGER NOT NULL,
    created_by TEXT NOT NULL
)";

const SELECT_ROOM: &str = "SELECT code,content,language,version,last_updated,subject_name,difficulty,set_number,question_index,created_by FROM rooms WHERE code=?";

// One statement, so concurrent writers queue on the write lock instead of
// deadlocking on a read-then-write upgrade. Mirrors `Room::apply`.
const UPDATE_ROOM: &str = "UPDATE rooms SET
    content = COALESCE(?, content),
    version = CASE WHEN ? IS NULL THEN version ELSE MAX(version + 1, ?) END,
    last_updated = COALESCE(?, last_updated),
    language = COALESCE(?, language),
    subject_name = COALESCE(?, subject_name),
    difficulty = COALESCE(?, difficulty),
    set_number = COALESCE(?, set_number),
    question_index = COALESCE(?, question_index)
    WHERE code = ?";

type RoomRow = (String, String, String, i64, i64, String, String, i64, i64, String);

fn store_err(e: sqlx::Error) -> PairpadError {
    PairpadError::Store(e.to_string())
}

fn from_row(row: RoomRow) -> Result<Room> {
    let (code, content, language, version, last_updated, subject_name, difficulty, set_number, question_index, created_by) = row;
    Ok(Room {
        code,
        content,
        language: language.parse()?,
        version: version.max(0) as u64,
        last_updated: DateTime::<Utc>::from_timestamp_millis(last_updated).unwrap_or_default(),
        subject_name,
        difficulty,
        set_number: set_number.max(0) as u32,
        question_index: question_index.max(0) as u32,
        created_by,
    })
}

/// SQLite-backed store. Partial updates compute the new version in SQL.
pub struct SqliteRoomStore {
    pool: SqlitePool,
}

impl SqliteRoomStore {
    /// Connect and create the `rooms` table if missing.
    pub async fn connect(url: &str) -> Result<Self> {
        // every pooled connection to `:memory:` would get its own database
        let max = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max)
            .connect(url)
            .await
            .map_err(store_err)?;
        sqlx::query(SCHEMA).execute(&pool).await.map_err(store_err)?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl RoomStore for SqliteRoomStore {
    async fn get(&self, code: &str) -> Result<Option<Room>> {
        let row = sqlx::query_as::<_, RoomRow>(SELECT_ROOM)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.map(from_row).transpose()
    }

    async fn insert(&self, room: Room) -> Result<()> {
        let res = sqlx::query("INSERT INTO rooms (code,content,language,version,last_updated,subject_name,difficulty,set_number,question_index,created_by) VALUES (?,?,?,?,?,?,?,?,?,?)")
            .bind(&room.code)
            .bind(&room.content)
            .bind(room.language.as_str())
            .bind(room.version as i64)
            .bind(room.last_updated.timestamp_millis())
            .bind(&room.subject_name)
            .bind(&room.difficulty)
            .bind(room.set_number as i64)
            .bind(room.question_index as i64)
            .bind(&room.created_by)
            .execute(&self.pool)
            .await;
        match res {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(PairpadError::BadRequest(format!("room {} already exists", room.code)))
            }
            Err(e) => Err(store_err(e)),
        }
    }

    async fn update(&self, code: &str, patch: RoomPatch) -> Result<u64> {
        let last_updated = patch
            .last_updated
            .or_else(|| patch.content.as_ref().map(|_| Utc::now()))
            .map(|t| t.timestamp_millis());
        let res = sqlx::query(UPDATE_ROOM)
            .bind(patch.content.as_deref())
            .bind(patch.content.as_deref())
            .bind(patch.version.unwrap_or(0) as i64)
            .bind(last_updated)
            .bind(patch.language.map(|l| l.as_str()))
            .bind(patch.subject_name.as_deref())
            .bind(patch.difficulty.as_deref())
            .bind(patch.set_number.map(i64::from))
            .bind(patch.question_index.map(i64::from))
            .bind(code)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(res.rows_affected())
    }

    async fn delete(&self, code: &str) -> Result<u64> {
        let res = sqlx::query("DELETE FROM rooms WHERE code=?")
            .bind(code)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(res.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairpad_core::model::{Language, RoomSettings};

    async fn store() -> SqliteRoomStore {
        SqliteRoomStore::connect("sqlite::memory:").await.unwrap()
    }

    fn room() -> Room {
        Room::new(
            "QX7P2M",
            "",
            RoomSettings {
                subject_name: "Strings & Arrays".into(),
                difficulty: "Standard".into(),
                set_number: 1,
            },
            "u1",
        )
    }

    #[tokio::test]
    async fn round_trips_a_room() {
        let s = store().await;
        let r = room();
        s.insert(r.clone()).await.unwrap();
        let got = s.get("QX7P2M").await.unwrap().unwrap();
        assert_eq!(got.code, r.code);
        assert_eq!(got.content, r.content);
        assert_eq!(got.version, 1);
        assert_eq!(got.last_updated.timestamp_millis(), r.last_updated.timestamp_millis());
    }

    #[tokio::test]
    async fn partial_update_keeps_other_fields() {
        let s = store().await;
        s.insert(room()).await.unwrap();

        assert_eq!(s.update("QX7P2M", RoomPatch::content("x = 1", Some(5))).await.unwrap(), 1);
        assert_eq!(s.update("QX7P2M", RoomPatch::language(Language::Java)).await.unwrap(), 1);

        let got = s.get("QX7P2M").await.unwrap().unwrap();
        assert_eq!(got.content, "x = 1");
        assert_eq!(got.version, 5);
        assert_eq!(got.language, Language::Java);
        assert_eq!(got.subject_name, "Strings & Arrays");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_content_writes_all_land() {
        let path = std::env::temp_dir().join(format!("pairpad-{}.db", uuid::Uuid::new_v4()));
        let s = std::sync::Arc::new(
            SqliteRoomStore::connect(&format!("sqlite://{}?mode=rwc", path.display()))
                .await
                .unwrap(),
        );
        s.insert(room()).await.unwrap();

        let writers: Vec<_> = (0..20)
            .map(|i| {
                let s = s.clone();
                tokio::spawn(async move { s.update("QX7P2M", RoomPatch::content(format!("w{i}"), None)).await })
            })
            .collect();
        for w in writers {
            assert_eq!(w.await.unwrap().unwrap(), 1);
        }

        let got = s.get("QX7P2M").await.unwrap().unwrap();
        assert_eq!(got.version, 21);
        assert!(got.content.starts_with('w'));

        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }

    #[tokio::test]
    async fn version_never_moves_backwards() {
        let s = store().await;
        s.insert(room()).await.unwrap();
        s.update("QX7P2M", RoomPatch::content("a", Some(7))).await.unwrap();
        s.update("QX7P2M", RoomPatch::content("b", Some(3))).await.unwrap();
        s.update("QX7P2M", RoomPatch::question_index(2)).await.unwrap();

        let got = s.get("QX7P2M").await.unwrap().unwrap();
        assert_eq!(got.version, 8);
        assert_eq!(got.content, "b");
        assert_eq!(got.question_index, 2);
    }

    #[tokio::test]
    async fn missing_rows_report_zero() {
        let s = store().await;
        assert_eq!(s.update("NOPE", RoomPatch::question_index(1)).await.unwrap(), 0);
        assert_eq!(s.delete("NOPE").await.unwrap(), 0);

        s.insert(room()).await.unwrap();
        assert!(s.insert(room()).await.is_err());
        assert_eq!(s.delete("QX7P2M").await.unwrap(), 1);
        assert_eq!(s.delete("QX7P2M").await.unwrap(), 0);
    }
}
