//! Per-group recovery state and notification markers.
//!
//! Every persisted key carries the isolation group id as a suffix, so two
//! groups' supervision cycles never share a file.

mod file_store;
mod recovery_state;

pub use file_store::*;
pub use recovery_state::*;
