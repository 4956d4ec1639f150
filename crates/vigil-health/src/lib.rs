//! Health monitoring for one isolation group.
//!
//! Liveness, channel connectivity, and an end-to-end gateway round-trip are
//! checked in that order, stopping at the first failure. The combined result
//! and the persisted recovery mode map to a [`vigil_state::HealthVerdict`]
//! through the pure [`classify`] function.

mod connectivity;
mod gateway_probe;
mod monitor;
mod target;

pub use connectivity::*;
pub use gateway_probe::*;
pub use monitor::*;
pub use target::*;
