//! Per-session document synchronization.

pub mod clock;
pub mod engine;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{EditStamp, LocalOutcome, PendingEdit, RemoteOutcome, SyncDeps, SyncEngine};
