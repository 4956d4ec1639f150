use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Failures that end a recovery cycle. Persisted state is already up to date
/// when one of these is returned.
pub enum RecoveryError {
    #[error("config synthesis failed for group '{group}': {detail}")]
    Synthesis { group: String, detail: String },
    #[error("synthesized config for group '{group}' rejected: {reason}")]
    StructuralConfig { group: String, reason: String },
    #[error("failed to install config for group '{group}' at {path}: {detail}")]
    Install {
        group: String,
        path: String,
        detail: String,
    },
    #[error("restart of {target} for group '{group}' failed: {detail}")]
    Restart {
        group: String,
        target: String,
        detail: String,
    },
    #[error("recovery state for group '{group}' unavailable: {detail}")]
    State { group: String, detail: String },
}

impl RecoveryError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            RecoveryError::Synthesis { .. } => "synthesis_failed",
            RecoveryError::StructuralConfig { .. } => "config_rejected",
            RecoveryError::Install { .. } => "install_failed",
            RecoveryError::Restart { .. } => "restart_failed",
            RecoveryError::State { .. } => "state_unavailable",
        }
    }
}
