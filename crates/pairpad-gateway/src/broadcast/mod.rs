//! Per-room fan-out (Broadcaster).
//!
//! Topics are plain strings (see `pairpad_core::protocol::events::topic`).
//! Delivery is at-most-once and lossy: nothing is persisted and a full
//! subscriber queue drops the message.

mod hub;

pub use hub::{Broadcast, Channel, Hub, Subscription, SubscriptionBuilder};
