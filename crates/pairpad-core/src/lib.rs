//! pairpad core: transport-agnostic model, protocol primitives and error types.
//!
//! This crate defines the room/session data model, the broadcast topic and
//! payload contracts, and the text envelope spoken between the browser editor
//! and its session actor. It carries no transport or runtime dependencies so
//! the gateway, tests and tooling can share it.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here.
//! All fallible paths surface as `PairpadError`/`Result` so a malformed frame
//! from one client never takes a session down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod model;
pub mod protocol;

/// Shared result type.
pub use error::{PairpadError, Result};
