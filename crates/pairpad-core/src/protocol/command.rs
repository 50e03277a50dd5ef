//! Typed client commands.
//!
//! An `Envelope` is decoded once; `data` is only parsed after `svc/type`
//! selected the command shape.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{PairpadError, Result};
use crate::model::{Caret, Language, RoomSettings};
use crate::protocol::text::Envelope;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    /// Local buffer changed.
    Edit { content: String },
    /// Own caret moved.
    Cursor(Caret),
    /// Persist now (tab hidden / page teardown). Falls back to the session buffer.
    Save { content: Option<String> },
    SetLanguage(Language),
    NextQuestion,
    PreviousQuestion,
    ChangeSettings(RoomSettings),
    Run,
    Ping,
}

#[derive(Deserialize)]
struct EditData {
    content: String,
}

#[derive(Deserialize)]
struct SaveData {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct LanguageData {
    language: Language,
}

fn data<T: DeserializeOwned>(env: &Envelope) -> Result<T> {
    let raw = env
        .data
        .as_ref()
        .ok_or_else(|| PairpadError::BadRequest(format!("{} requires data", env.kind())))?;
    serde_json::from_str(raw.get())
        .map_err(|e| PairpadError::BadRequest(format!("{} invalid data: {e}", env.kind())))
}

impl TryFrom<&Envelope> for ClientCommand {
    type Error = PairpadError;

    fn try_from(env: &Envelope) -> Result<Self> {
        let cmd = match (env.svc.as_str(), env.msg_type.as_str()) {
            ("doc", "edit") => {
                let d: EditData = data(env)?;
                ClientCommand::Edit { content: d.content }
            }
            ("doc", "cursor") => ClientCommand::Cursor(data(env)?),
            ("doc", "save") => {
                let content = match env.data {
                    Some(_) => data::<SaveData>(env)?.content,
                    None => None,
                };
                ClientCommand::Save { content }
            }
            ("doc", "language") => {
                let d: LanguageData = data(env)?;
                ClientCommand::SetLanguage(d.language)
            }
            ("nav", "next") => ClientCommand::NextQuestion,
            ("nav", "previous") => ClientCommand::PreviousQuestion,
            ("nav", "settings") => ClientCommand::ChangeSettings(data(env)?),
            ("exec", "run") => ClientCommand::Run,
            ("sys", "ping") => ClientCommand::Ping,
            _ => return Err(PairpadError::BadRequest(format!("unknown command: {}", env.kind()))),
        };
        Ok(cmd)
    }
}
