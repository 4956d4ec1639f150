use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use vigil_core::{now_unix, read_optional_text, remove_file_if_exists, write_text_atomic};
use vigil_habitat::validate_group_id;

use crate::recovery_state::{NotificationCategory, RecoveryState, RecoveryStateStore};

const RECOVERY_STATE_SCHEMA_VERSION: u32 = 1;

fn recovery_state_schema_version() -> u32 {
    RECOVERY_STATE_SCHEMA_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecoveryStateFile {
    #[serde(default = "recovery_state_schema_version")]
    schema_version: u32,
    group: String,
    #[serde(flatten)]
    state: RecoveryState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Flat files under `state_dir`, each suffixed with the group id:
/// `recovery-<group>.json` and `notified-<category>-<group>`.
pub struct FileStateStore {
    state_dir: PathBuf,
    group: String,
}

impl FileStateStore {
    pub fn new(state_dir: impl Into<PathBuf>, group: &str) -> Result<Self> {
        validate_group_id(group)?;
        Ok(Self {
            state_dir: state_dir.into(),
            group: group.to_string(),
        })
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(format!("recovery-{}.json", self.group))
    }

    pub fn marker_path(&self, category: NotificationCategory) -> PathBuf {
        self.state_dir
            .join(format!("notified-{}-{}", category.as_str(), self.group))
    }
}

impl RecoveryStateStore for FileStateStore {
    fn group_id(&self) -> &str {
        &self.group
    }

    fn load(&self) -> Result<RecoveryState> {
        let path = self.state_path();
        let Some(raw) = read_optional_text(&path)? else {
            return Ok(RecoveryState::default());
        };
        let parsed = serde_json::from_str::<RecoveryStateFile>(&raw)
            .with_context(|| format!("failed to parse recovery state {}", path.display()))?;
        if parsed.schema_version != RECOVERY_STATE_SCHEMA_VERSION {
            bail!(
                "unsupported recovery state schema version {} in {} (expected {})",
                parsed.schema_version,
                path.display(),
                RECOVERY_STATE_SCHEMA_VERSION
            );
        }
        if parsed.group != self.group {
            bail!(
                "recovery state {} belongs to group '{}', not '{}'",
                path.display(),
                parsed.group,
                self.group
            );
        }
        Ok(parsed.state)
    }

    fn save(&self, state: &RecoveryState) -> Result<()> {
        let path = self.state_path();
        let file = RecoveryStateFile {
            schema_version: RECOVERY_STATE_SCHEMA_VERSION,
            group: self.group.clone(),
            state: state.clone(),
        };
        let payload =
            serde_json::to_string_pretty(&file).context("failed to serialize recovery state")?;
        if read_optional_text(&path)?.as_deref() == Some(payload.as_str()) {
            return Ok(());
        }
        write_text_atomic(&path, &payload)
            .with_context(|| format!("failed to persist recovery state {}", path.display()))?;
        debug!(
            group = %self.group,
            mode = %state.mode,
            attempts = state.attempt_count,
            "recovery state saved"
        );
        Ok(())
    }

    fn notification_marked(&self, category: NotificationCategory) -> Result<bool> {
        let path = self.marker_path(category);
        path.try_exists()
            .with_context(|| format!("failed to inspect marker {}", path.display()))
    }

    fn mark_notified(&self, category: NotificationCategory) -> Result<()> {
        let path = self.marker_path(category);
        write_text_atomic(&path, &format!("{}\n", now_unix()))
            .with_context(|| format!("failed to write marker {}", path.display()))?;
        self.clear_notified(category.other())?;
        Ok(())
    }

    fn clear_notified(&self, category: NotificationCategory) -> Result<bool> {
        remove_file_if_exists(&self.marker_path(category))
    }

    fn reset(&self) -> Result<()> {
        remove_file_if_exists(&self.state_path())?;
        for category in NotificationCategory::ALL {
            self.clear_notified(category)?;
        }
        Ok(())
    }
}
