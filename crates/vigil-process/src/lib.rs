//! Isolation-mode-specific gateway process control.
//!
//! Each group's gateway is stopped, started, and restarted through exactly one
//! primitive chosen from its isolation mode: the shared service unit for
//! `none`, a per-group service unit for `session`, and a per-group container
//! for `container`.

mod command_runner;
mod process_control;
mod restart_primitive;

pub use command_runner::*;
pub use process_control::*;
pub use restart_primitive::*;
