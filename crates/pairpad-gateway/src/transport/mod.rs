//! Transport layer (WebSocket).
//!
//! Exposes the WS upgrade handler and the codec that decodes each frame once
//! before it reaches the session.

pub mod codec;
pub mod ws;
