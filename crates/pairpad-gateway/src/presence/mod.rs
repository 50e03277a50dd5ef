//! Room membership, join/leave notifications and last-leave cleanup.

pub mod lifecycle;
pub mod tracker;

pub use lifecycle::RoomLifecycleManager;
pub use tracker::{PresenceChange, PresenceHandle, PresenceTracker};
