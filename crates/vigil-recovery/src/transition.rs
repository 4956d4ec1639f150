use serde::Serialize;
use vigil_state::{HealthVerdict, RecoveryMode, RecoveryState};

pub const DEFAULT_MAX_RECOVERY_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    None,
    EnterSafeMode,
    /// Attempts exhausted while still Normal.
    Escalate,
    NotifySafeModeStable,
    AlertCritical,
    /// Reset to `Normal/0` and clear both notification markers.
    Restore,
}

impl RecoveryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RecoveryAction::None => "none",
            RecoveryAction::EnterSafeMode => "enter_safe_mode",
            RecoveryAction::Escalate => "escalate",
            RecoveryAction::NotifySafeModeStable => "notify_safe_mode_stable",
            RecoveryAction::AlertCritical => "alert_critical",
            RecoveryAction::Restore => "restore",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next_mode: RecoveryMode,
    pub action: RecoveryAction,
}

impl Transition {
    fn new(next_mode: RecoveryMode, action: RecoveryAction) -> Self {
        Self { next_mode, action }
    }
}

/// Pure recovery state machine. Side effects belong to the caller.
pub fn plan_transition(
    state: &RecoveryState,
    verdict: HealthVerdict,
    max_attempts: u32,
) -> Transition {
    use RecoveryAction as Action;
    use RecoveryMode as Mode;

    match (state.mode, verdict) {
        (_, HealthVerdict::Healthy) if *state == RecoveryState::default() => {
            Transition::new(Mode::Normal, Action::None)
        }
        (_, HealthVerdict::Healthy) => Transition::new(Mode::Normal, Action::Restore),
        (Mode::Normal, HealthVerdict::DegradedEnteringSafeMode) => {
            if state.attempt_count >= max_attempts {
                Transition::new(Mode::Critical, Action::Escalate)
            } else {
                Transition::new(Mode::SafeMode, Action::EnterSafeMode)
            }
        }
        (Mode::Normal, HealthVerdict::SafeModeStable) => Transition::new(Mode::Normal, Action::None),
        (Mode::SafeMode, HealthVerdict::SafeModeStable) => {
            Transition::new(Mode::SafeMode, Action::NotifySafeModeStable)
        }
        (Mode::Critical, HealthVerdict::SafeModeStable) => {
            Transition::new(Mode::Critical, Action::None)
        }
        (_, HealthVerdict::DegradedEnteringSafeMode | HealthVerdict::Critical) => {
            Transition::new(Mode::Critical, Action::AlertCritical)
        }
    }
}
