//! Server -> client frame builders.
//!
//! Frames mirror the client envelope shape (`v`, `svc`, `type`, `data`) and
//! are always built with `serde_json` so user strings are escaped.

use serde::Serialize;
use serde_json::{json, Value};

use crate::model::{Caret, CursorState, Language, RoomSettings, SessionInfo};

fn frame(svc: &str, msg_type: &str, data: Value) -> String {
    json!({
        "v": 1,
        "svc": svc,
        "type": msg_type,
        "data": data,
    })
    .to_string()
}

/// Why the buffer shown to the client changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentOrigin {
    /// Initial load from the store / fallback cache.
    Seed,
    /// A peer's broadcast replaced the buffer.
    Remote,
    /// Join-sync response from a peer.
    JoinSync,
    /// Exercise changed; buffer reset to starter code.
    Question,
}

pub fn sys_joined(
    session: &SessionInfo,
    room: &str,
    language: Language,
    question_index: u32,
    settings: &RoomSettings,
) -> String {
    frame(
        "sys",
        "joined",
        json!({
            "session_id": session.session_id,
            "display_name": session.display_name,
            "room": room,
            "language": language,
            "question_index": question_index,
            "settings": settings,
        }),
    )
}

pub fn sys_error(code: &str, msg: &str) -> String {
    frame("sys", "error", json!({ "code": code, "msg": msg }))
}

pub fn sys_pong() -> String {
    frame("sys", "pong", Value::Null)
}

pub fn doc_content(content: &str, caret: Option<Caret>, origin: ContentOrigin) -> String {
    frame(
        "doc",
        "content",
        json!({ "content": content, "caret": caret, "origin": origin }),
    )
}

pub fn doc_cursors<'a>(cursors: impl IntoIterator<Item = (&'a String, &'a CursorState)>) -> String {
    let map: serde_json::Map<String, Value> = cursors
        .into_iter()
        .map(|(sid, c)| (sid.clone(), json!(c)))
        .collect();
    frame("doc", "cursors", json!({ "cursors": map }))
}

pub fn doc_language(language: Language) -> String {
    frame("doc", "language", json!({ "language": language }))
}

pub fn room_participants(participants: &[SessionInfo]) -> String {
    frame("room", "participants", json!({ "participants": participants }))
}

pub fn room_settings(settings: &RoomSettings, updated_by: &str) -> String {
    frame(
        "room",
        "settings",
        json!({ "settings": settings, "updated_by": updated_by }),
    )
}

/// `problem` is `None` when the configured set has no such exercise.
pub fn nav_question<P: Serialize>(question_index: u32, problem: Option<&P>) -> String {
    frame(
        "nav",
        "question",
        json!({ "question_index": question_index, "problem": problem }),
    )
}

pub fn exec_output(output: &str, is_error: bool) -> String {
    frame("exec", "output", json!({ "output": output, "is_error": is_error }))
}
