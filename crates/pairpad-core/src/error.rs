//! Shared error type across pairpad crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid input / malformed message.
    BadRequest,
    /// Room (or other keyed record) does not exist.
    NotFound,
    /// Rate limited.
    RateLimited,
    /// Payload too large.
    PayloadTooLarge,
    /// Unsupported protocol version.
    UnsupportedVersion,
    /// A collaborator (store, executor, problem set) is unavailable.
    Unavailable,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::NotFound => "NOT_FOUND",
            ClientCode::RateLimited => "RATE_LIMITED",
            ClientCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::Unavailable => "UNAVAILABLE",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, PairpadError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum PairpadError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited")]
    RateLimited,
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("unsupported protocol version")]
    UnsupportedVersion,
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("store: {0}")]
    Store(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl PairpadError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            PairpadError::BadRequest(_) => ClientCode::BadRequest,
            PairpadError::NotFound(_) => ClientCode::NotFound,
            PairpadError::RateLimited => ClientCode::RateLimited,
            PairpadError::PayloadTooLarge => ClientCode::PayloadTooLarge,
            PairpadError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            PairpadError::Unavailable(_) => ClientCode::Unavailable,
            PairpadError::Store(_) | PairpadError::Transport(_) | PairpadError::Internal(_) => {
                ClientCode::Internal
            }
        }
    }

    /// Transient collaborator failures: logged and abandoned, never retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, PairpadError::Store(_) | PairpadError::Transport(_))
    }
}

impl From<serde_json::Error> for PairpadError {
    fn from(e: serde_json::Error) -> Self {
        PairpadError::BadRequest(format!("json: {e}"))
    }
}
