//! Top-level facade crate for pairpad.
//!
//! Re-exports the core model/protocol and the gateway runtime so users can depend on a single crate.

pub mod core {
    pub use pairpad_core::*;
}

pub mod gateway {
    pub use pairpad_gateway::*;
}
