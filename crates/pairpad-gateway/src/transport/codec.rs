//! Decode-once codec for inbound WebSocket frames.
//!
//! Text frames become an `Envelope` whose `data` stays a lazy `RawValue`.
//! Binary frames are surfaced only so the caller can reject them.

use axum::extract::ws::Message;

use pairpad_core::protocol::text::Envelope;
use pairpad_core::Result;

#[derive(Debug)]
pub enum Inbound {
    Text { env: Envelope, bytes_len: usize },
    Binary { bytes_len: usize },
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// Raw frame length, computed before decoding for the policy check.
pub fn frame_len(msg: &Message) -> usize {
    match msg {
        Message::Text(s) => s.len(),
        Message::Binary(b) => b.len(),
        Message::Ping(v) | Message::Pong(v) => v.len(),
        Message::Close(_) => 0,
    }
}

pub fn decode(msg: Message) -> Result<Inbound> {
    match msg {
        Message::Text(s) => {
            let env = Envelope::parse(&s)?;
            Ok(Inbound::Text { env, bytes_len: s.len() })
        }
        Message::Binary(b) => Ok(Inbound::Binary { bytes_len: b.len() }),
        Message::Ping(v) => Ok(Inbound::Ping(v)),
        Message::Pong(v) => Ok(Inbound::Pong(v)),
        Message::Close(_) => Ok(Inbound::Close),
    }
}
