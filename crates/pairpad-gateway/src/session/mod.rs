//! The per-connection session actor.
//!
//! A `RoomSession` owns one participant's sync engine, navigator, cursor view
//! and broadcast subscriptions. The transport drives it with client commands
//! and `next_event()`; everything it wants the client to see is pushed as a
//! text frame on the outbound queue.

pub mod ctx;
pub mod cursors;
pub mod room_session;

pub use ctx::SessionCtx;
pub use cursors::CursorBoard;
pub use room_session::{RoomSession, SessionEvent};
