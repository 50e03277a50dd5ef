//! Protocol modules.
//!
//! - `text`: the JSON envelope exchanged between a browser editor and its
//!   session actor (lazy `RawValue` payloads).
//! - `command`: typed client commands decoded from envelopes.
//! - `frames`: server -> client frame builders.
//! - `events`: room broadcast topics and the payloads published on them.
//!
//! All decoders are panic-free: malformed input is reported as `PairpadError`.

pub mod command;
pub mod events;
pub mod frames;
pub mod text;
