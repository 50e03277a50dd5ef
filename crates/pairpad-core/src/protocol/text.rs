//! Text envelope (JSON).
//!
//! `data` is kept as `RawValue` so it is only parsed once the command is known.

use serde::Deserialize;
use serde_json::value::RawValue;

use crate::error::{PairpadError, Result};

/// Only supported envelope version.
pub const ENVELOPE_VERSION: u8 = 1;

/// Client envelope (Text frame).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// Protocol version.
    pub v: u8,
    /// Service name (`doc`, `nav`, `exec`, `sys`).
    pub svc: String,
    /// Message type (field name is `type` in JSON).
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Optional client sequence number, echoed in errors.
    #[serde(default)]
    pub seq: Option<u64>,
    /// Optional room code. The session is bound to one room, so this is only checked.
    #[serde(default)]
    pub room: Option<String>,
    /// Optional payload, stored as raw JSON (lazy parsing).
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
}

impl Envelope {
    pub fn parse(s: &str) -> Result<Self> {
        let env: Envelope = serde_json::from_str(s)
            .map_err(|e| PairpadError::BadRequest(format!("invalid envelope json: {e}")))?;
        if env.v != ENVELOPE_VERSION {
            return Err(PairpadError::UnsupportedVersion);
        }
        Ok(env)
    }

    /// `svc/type` label used in logs and errors.
    pub fn kind(&self) -> String {
        format!("{}/{}", self.svc, self.msg_type)
    }
}
