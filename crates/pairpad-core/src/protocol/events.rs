//! Room broadcast topics and event payloads.
//!
//! Every room code owns a handful of topics; payloads travel as JSON with
//! camelCase field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Language, SessionInfo};

pub const CONTENT: &str = "content";
pub const REQUEST_CONTENT: &str = "request_content";
pub const CURSOR: &str = "cursor";
pub const QUESTION: &str = "question";
pub const SETTINGS_CHANGED: &str = "settings_changed";
pub const LANGUAGE: &str = "language";
pub const CODE_OUTPUT: &str = "code-output";
pub const PRESENCE_JOIN: &str = "presence:join";
pub const PRESENCE_LEAVE: &str = "presence:leave";

/// Topic families scoped to a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKind {
    /// `room:C`: output, settings, language.
    Room,
    Content,
    Cursor,
    Sync,
    Question,
    Presence,
}

/// Topic name for `kind` in room `code`.
pub fn topic(code: &str, kind: TopicKind) -> String {
    match kind {
        TopicKind::Room => format!("room:{code}"),
        TopicKind::Content => format!("room:{code}:content"),
        TopicKind::Cursor => format!("room:{code}:cursor"),
        TopicKind::Sync => format!("room:{code}:sync"),
        TopicKind::Question => format!("room:{code}:question"),
        TopicKind::Presence => format!("room:{code}:presence"),
    }
}

/// Whole-buffer content broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentEvent {
    pub content: String,
    pub session_id: String,
    /// Edit time in unix milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default)]
    pub is_join_sync: bool,
}

/// Late joiner asking peers to republish their buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    pub session_id: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorEvent {
    pub session_id: String,
    pub display_name: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionEvent {
    pub question_index: u32,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsEvent {
    pub subject_name: String,
    pub difficulty: String,
    pub set_number: u32,
    pub updated_by: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageEvent {
    pub language: Language,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeOutputEvent {
    pub output: String,
    pub display_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_error: bool,
}

impl CodeOutputEvent {
    /// Text shown to everyone in the room.
    pub fn render(&self) -> String {
        format!(
            "[{}] {} ran the code:\n{}",
            self.timestamp.format("%H:%M:%S"),
            self.display_name,
            self.output
        )
    }
}

/// Presence join/leave batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEvent {
    pub sessions: Vec<SessionInfo>,
}
