//! JSON HTTP endpoints outside the real-time path.

pub mod rooms;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use pairpad_core::error::PairpadError;

/// `{ "error": msg }` with a status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub msg: String,
}

impl ApiError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self { status, msg: msg.into() }
    }
}

impl From<PairpadError> for ApiError {
    fn from(e: PairpadError) -> Self {
        let status = match &e {
            PairpadError::BadRequest(_) | PairpadError::UnsupportedVersion => StatusCode::BAD_REQUEST,
            PairpadError::NotFound(_) => StatusCode::NOT_FOUND,
            PairpadError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            PairpadError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            PairpadError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PairpadError::Store(_) | PairpadError::Transport(_) | PairpadError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.msg }))).into_response()
    }
}
