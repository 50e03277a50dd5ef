//! Room, session and cursor data model.
//!
//! `Room` is the durable record; `SessionInfo` and `CursorState` are ephemeral
//! and only ever live inside a room's in-memory presence set.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PairpadError, Result};

/// Canonical "unset" buffer marker. Distinguishable from real content only by convention.
pub const PLACEHOLDER_CONTENT: &str = "// Start coding here...";

/// True when `content` carries no real code (empty or the placeholder).
pub fn is_unset(content: &str) -> bool {
    content.is_empty() || content == PLACEHOLDER_CONTENT
}

/// Languages a room can be edited (and executed) in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Javascript,
    Python,
    Java,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Javascript => "javascript",
            Language::Python => "python",
            Language::Java => "java",
        }
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::Python
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = PairpadError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "javascript" | "js" => Ok(Language::Javascript),
            "python" | "py" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            other => Err(PairpadError::BadRequest(format!("unsupported language: {other}"))),
        }
    }
}

/// Which problem collection a room is working through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSettings {
    pub subject_name: String,
    pub difficulty: String,
    pub set_number: u32,
}

/// Durable room record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// Unique, human-shareable join key.
    pub code: String,
    pub content: String,
    pub language: Language,
    /// Strictly increases on every accepted content write.
    pub version: u64,
    pub last_updated: DateTime<Utc>,
    pub subject_name: String,
    pub difficulty: String,
    pub set_number: u32,
    pub question_index: u32,
    pub created_by: String,
}

impl Room {
    /// Fresh room at version 1.
    pub fn new(code: impl Into<String>, content: impl Into<String>, settings: RoomSettings, created_by: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            code: code.into(),
            content: if content.is_empty() { PLACEHOLDER_CONTENT.to_string() } else { content },
            language: Language::default(),
            version: 1,
            last_updated: Utc::now(),
            subject_name: settings.subject_name,
            difficulty: settings.difficulty,
            set_number: settings.set_number,
            question_index: 0,
            created_by: created_by.into(),
        }
    }

    pub fn settings(&self) -> RoomSettings {
        RoomSettings {
            subject_name: self.subject_name.clone(),
            difficulty: self.difficulty.clone(),
            set_number: self.set_number,
        }
    }

    /// Apply a partial update in place.
    ///
    /// A content write always moves `version` forward: it becomes the larger of
    /// `version + 1` and the writer's proposed version. Non-content writes never
    /// touch the version.
    pub fn apply(&mut self, patch: &RoomPatch) {
        if let Some(content) = &patch.content {
            self.content = content.clone();
            let proposed = patch.version.unwrap_or(0);
            self.version = (self.version + 1).max(proposed);
            self.last_updated = patch.last_updated.unwrap_or_else(Utc::now);
        } else if let Some(ts) = patch.last_updated {
            self.last_updated = ts;
        }
        if let Some(language) = patch.language {
            self.language = language;
        }
        if let Some(subject) = &patch.subject_name {
            self.subject_name = subject.clone();
        }
        if let Some(difficulty) = &patch.difficulty {
            self.difficulty = difficulty.clone();
        }
        if let Some(set_number) = patch.set_number {
            self.set_number = set_number;
        }
        if let Some(index) = patch.question_index {
            self.question_index = index;
        }
    }
}

/// Per-field partial update. `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomPatch {
    pub content: Option<String>,
    pub version: Option<u64>,
    pub last_updated: Option<DateTime<Utc>>,
    pub language: Option<Language>,
    pub subject_name: Option<String>,
    pub difficulty: Option<String>,
    pub set_number: Option<u32>,
    pub question_index: Option<u32>,
}

impl RoomPatch {
    pub fn content(content: impl Into<String>, version: Option<u64>) -> Self {
        Self {
            content: Some(content.into()),
            version,
            last_updated: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn question_index(index: u32) -> Self {
        Self { question_index: Some(index), ..Self::default() }
    }

    pub fn settings(settings: &RoomSettings) -> Self {
        Self {
            subject_name: Some(settings.subject_name.clone()),
            difficulty: Some(settings.difficulty.clone()),
            set_number: Some(settings.set_number),
            question_index: Some(0),
            ..Self::default()
        }
    }

    pub fn language(language: Language) -> Self {
        Self { language: Some(language), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One connected participant. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}

/// Latest known caret of a remote session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorState {
    pub line: u32,
    pub column: u32,
    pub display_name: String,
}

/// 1-based caret position, as editors report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caret {
    pub line: u32,
    pub column: u32,
}

impl Caret {
    /// Clamp into `content` so the caret still points at a valid position.
    pub fn clamp_to(self, content: &str) -> Caret {
        let lines: Vec<&str> = content.split('\n').collect();
        let line = self.line.clamp(1, lines.len().max(1) as u32);
        let width = lines
            .get(line as usize - 1)
            .map(|l| l.chars().count() as u32)
            .unwrap_or(0);
        Caret {
            line,
            column: self.column.clamp(1, width + 1),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn settings() -> RoomSettings {
        RoomSettings {
            subject_name: "Strings".into(),
            difficulty: "Standard".into(),
            set_number: 1,
        }
    }

    #[test]
    fn content_write_bumps_version_past_proposal() {
        let mut room = Room::new("AB12", "start", settings(), "u1");
        room.apply(&RoomPatch::content("start+1", Some(2)));
        assert_eq!(room.version, 2);

        // stale proposal still moves forward
        room.apply(&RoomPatch::content("start+2", Some(1)));
        assert_eq!(room.version, 3);

        room.apply(&RoomPatch::content("start+3", Some(10)));
        assert_eq!(room.version, 10);
    }

    #[test]
    fn non_content_write_keeps_version() {
        let mut room = Room::new("AB12", "start", settings(), "u1");
        room.apply(&RoomPatch::question_index(2));
        assert_eq!(room.version, 1);
        assert_eq!(room.question_index, 2);
    }

    #[test]
    fn empty_initial_content_becomes_placeholder() {
        let room = Room::new("AB12", "", settings(), "u1");
        assert!(is_unset(&room.content));
    }

    #[test]
    fn caret_clamps_into_shorter_content() {
        let c = Caret { line: 5, column: 40 }.clamp_to("ab\ncdef");
        assert_eq!(c, Caret { line: 2, column: 5 });

        let c = Caret { line: 1, column: 2 }.clamp_to("xyz");
        assert_eq!(c, Caret { line: 1, column: 2 });

        let c = Caret { line: 0, column: 0 }.clamp_to("");
        assert_eq!(c, Caret { line: 1, column: 1 });
    }

    #[test]
    fn language_parses_aliases() {
        assert_eq!("js".parse::<Language>().unwrap(), Language::Javascript);
        assert!("cobol".parse::<Language>().is_err());
    }
}
