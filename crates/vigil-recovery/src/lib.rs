//! Recovery orchestration for one isolation group.
//!
//! [`plan_transition`] is the pure `(state, verdict) -> (next mode, action)`
//! function. [`RecoveryOrchestrator`] executes the chosen action: entering
//! safe mode through discovery, synthesis, validation, install, and restart,
//! or sending deduplicated notifications.

mod config_install;
mod error;
mod notifier;
mod orchestrator;
mod synthesizer;
mod transition;

pub use config_install::*;
pub use error::*;
pub use notifier::*;
pub use orchestrator::*;
pub use synthesizer::*;
pub use transition::*;
