//! pairpad gateway library entry.
//!
//! Wires the broadcaster, presence, stores, sync engine, navigator and
//! transport into the collaborative editing server. Consumed by the binary
//! (`main.rs`) and by integration tests.

pub mod api;
pub mod app_state;
pub mod broadcast;
pub mod config;
pub mod exec;
pub mod obs;
pub mod ops;
pub mod policy;
pub mod presence;
pub mod problems;
pub mod router;
pub mod session;
pub mod store;
pub mod sync;
pub mod transport;
