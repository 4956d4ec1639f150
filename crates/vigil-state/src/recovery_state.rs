use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use vigil_habitat::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Outcome of one monitoring cycle. Never cached beyond that cycle.
pub enum HealthVerdict {
    Healthy,
    DegradedEnteringSafeMode,
    SafeModeStable,
    Critical,
}

impl HealthVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthVerdict::Healthy => "healthy",
            HealthVerdict::DegradedEnteringSafeMode => "degraded_entering_safe_mode",
            HealthVerdict::SafeModeStable => "safe_mode_stable",
            HealthVerdict::Critical => "critical",
        }
    }
}

impl fmt::Display for HealthVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMode {
    #[default]
    Normal,
    SafeMode,
    /// Terminal until an operator resets the group or it observes `Healthy`.
    Critical,
}

impl RecoveryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RecoveryMode::Normal => "normal",
            RecoveryMode::SafeMode => "safe_mode",
            RecoveryMode::Critical => "critical",
        }
    }
}

impl fmt::Display for RecoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// The channel the emergency config was synthesized for.
pub struct SafeModeChannel {
    pub agent_id: String,
    pub platform: Platform,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecoveryState {
    #[serde(default)]
    pub mode: RecoveryMode,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default)]
    pub last_notified_verdict: Option<HealthVerdict>,
    #[serde(default)]
    pub safe_mode_channel: Option<SafeModeChannel>,
}

impl RecoveryState {
    pub fn is_normal(&self) -> bool {
        self.mode == RecoveryMode::Normal && self.attempt_count == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// One-time notification markers.
pub enum NotificationCategory {
    SafeMode,
    Critical,
}

impl NotificationCategory {
    pub const ALL: [NotificationCategory; 2] =
        [NotificationCategory::SafeMode, NotificationCategory::Critical];

    pub fn as_str(self) -> &'static str {
        match self {
            NotificationCategory::SafeMode => "safe-mode",
            NotificationCategory::Critical => "critical",
        }
    }

    pub fn other(self) -> NotificationCategory {
        match self {
            NotificationCategory::SafeMode => NotificationCategory::Critical,
            NotificationCategory::Critical => NotificationCategory::SafeMode,
        }
    }

    pub fn verdict(self) -> HealthVerdict {
        match self {
            NotificationCategory::SafeMode => HealthVerdict::SafeModeStable,
            NotificationCategory::Critical => HealthVerdict::Critical,
        }
    }
}

/// Group-scoped persistence for [`RecoveryState`] and notification markers.
///
/// An implementation is bound to exactly one group at construction and has no
/// way to address another group's keys.
pub trait RecoveryStateStore {
    fn group_id(&self) -> &str;

    /// Missing state loads as `Normal/0`.
    fn load(&self) -> Result<RecoveryState>;

    fn save(&self, state: &RecoveryState) -> Result<()>;

    fn notification_marked(&self, category: NotificationCategory) -> Result<bool>;

    /// Sets `category`'s marker and clears the other one.
    fn mark_notified(&self, category: NotificationCategory) -> Result<()>;

    /// Returns whether a marker was present.
    fn clear_notified(&self, category: NotificationCategory) -> Result<bool>;

    /// Drops all persisted state and markers for the group.
    fn reset(&self) -> Result<()>;
}
