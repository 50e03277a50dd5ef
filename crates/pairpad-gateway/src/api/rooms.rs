use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use pairpad_core::error::PairpadError;
use pairpad_core::model::{Language, Room, RoomPatch, RoomSettings, PLACEHOLDER_CONTENT};

use crate::app_state::AppState;
use crate::store::generate_room_code;

use super::ApiError;

const CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub subject_name: String,
    pub difficulty: String,
    pub set_number: u32,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub language: Language,
}

/// `POST /api/rooms`: new room seeded with problem 0's starter code.
pub async fn create_room(
    State(app): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<Room>), ApiError> {
    let settings = RoomSettings {
        subject_name: req.subject_name,
        difficulty: req.difficulty,
        set_number: req.set_number,
    };
    let catalog = app.catalog();
    let Some(first) = catalog.problem(&settings, 0) else {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Could not load the problem set. Please try again.",
        ));
    };
    let content = first.starter_code(req.language).unwrap_or(PLACEHOLDER_CONTENT);

    let store = app.store();
    for _ in 0..CODE_ATTEMPTS {
        let mut room = Room::new(generate_room_code(), content, settings.clone(), req.created_by.clone());
        room.language = req.language;
        match store.insert(room.clone()).await {
            Ok(()) => {
                info!(room = %room.code, subject = %settings.subject_name, "room created");
                return Ok((StatusCode::CREATED, Json(room)));
            }
            // code collision; draw again
            Err(PairpadError::BadRequest(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "could not allocate a room code"))
}

/// `GET /api/rooms/:code`: join check.
pub async fn get_room(State(app): State<AppState>, Path(code): Path<String>) -> Result<Json<Room>, ApiError> {
    match app.store().get(&code).await? {
        Some(room) => Ok(Json(room)),
        None => Err(ApiError::new(StatusCode::NOT_FOUND, "Room not found")),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveContentRequest {
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// `POST /api/save-content`: unconditional best-effort save used during page teardown.
pub async fn save_content(
    State(app): State<AppState>,
    Json(req): Json<SaveContentRequest>,
) -> Result<Json<Value>, ApiError> {
    let (Some(room_id), Some(content)) = (
        req.room_id.filter(|s| !s.is_empty()),
        req.content.filter(|s| !s.is_empty()),
    ) else {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Missing roomId or content"));
    };

    match app.store().update(&room_id, RoomPatch::content(content.as_str(), None)).await {
        Ok(0) => Err(ApiError::new(StatusCode::NOT_FOUND, "Room not found")),
        Ok(_) => {
            app.cache().put(&room_id, &content);
            Ok(Json(json!({ "success": true })))
        }
        Err(e) => {
            warn!(room = %room_id, error = %e, "fallback save failed");
            app.metrics().persist_failures.inc(&[("reason", "store")]);
            Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
