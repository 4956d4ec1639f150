//! Habitat data model consumed by the supervision engine.
//!
//! The flat parameter set produced by the external habitat parser is converted
//! exactly once into ordered agents, isolation groups, and provider keys. All
//! downstream crates read these collections instead of numbered fields.

mod group;
mod parameters;
mod platform;
mod provider;

pub use group::*;
pub use parameters::*;
pub use platform::*;
pub use provider::*;
