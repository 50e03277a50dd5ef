//! Inbound frame policy: size limit and per-connection rate limiting.
//!
//! Checked on the raw frame length before any decoding happens.

pub mod engine;

pub use engine::{InboundPolicy, PolicyDecision};
