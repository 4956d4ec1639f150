use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::info;
use vigil_core::{read_optional_text, write_text_atomic};
use vigil_credentials::ProviderAuthMethod;
use vigil_habitat::{IsolationGroup, IsolationMode, Platform, Provider};
use vigil_health::{is_safe_mode_config, SAFE_MODE_AGENT_ID};

pub const ACTIVE_CONFIG_FILE_NAME: &str = "gateway.json";
const BACKUP_SUFFIX: &str = ".pre-safe-mode";

/// `<root>/gateway.json` for the shared process, `<root>/<group>/gateway.json` otherwise.
pub fn active_config_path(config_root: &Path, group: &IsolationGroup) -> PathBuf {
    match group.mode {
        IsolationMode::None => config_root.join(ACTIVE_CONFIG_FILE_NAME),
        IsolationMode::Session | IsolationMode::Container => {
            config_root.join(&group.id).join(ACTIVE_CONFIG_FILE_NAME)
        }
    }
}

pub fn backup_config_path(active: &Path) -> PathBuf {
    let mut name = active
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(BACKUP_SUFFIX);
    active.with_file_name(name)
}

/// Structural checks a synthesized emergency config must pass before install.
pub fn validate_safe_mode_config(
    raw: &str,
    platform: Platform,
    provider: Provider,
    auth_method: ProviderAuthMethod,
    expected_port: u16,
) -> Result<Value> {
    let document = serde_json::from_str::<Value>(raw).context("config is not valid JSON")?;
    if !document.is_object() {
        bail!("config must be a JSON object");
    }

    let agents = document
        .pointer("/agents/list")
        .and_then(Value::as_array)
        .context("config is missing agents.list")?;
    if agents.len() != 1 {
        bail!("agents.list must contain exactly one agent, found {}", agents.len());
    }
    let agent_id = agents[0].get("id").and_then(Value::as_str).unwrap_or_default();
    if agent_id != SAFE_MODE_AGENT_ID {
        bail!("agents.list[0].id must be '{SAFE_MODE_AGENT_ID}', found '{agent_id}'");
    }

    let accounts_pointer = format!("/channels/{}/accounts", platform.as_str());
    let accounts = document
        .pointer(&accounts_pointer)
        .and_then(Value::as_object)
        .with_context(|| format!("config is missing channels.{}.accounts", platform.as_str()))?;
    if accounts.contains_key("default") {
        bail!(
            "channels.{}.accounts must not use a 'default' account key",
            platform.as_str()
        );
    }
    if !accounts.contains_key(SAFE_MODE_AGENT_ID) {
        bail!(
            "channels.{}.accounts must be keyed by '{SAFE_MODE_AGENT_ID}'",
            platform.as_str()
        );
    }

    let env_key = match auth_method {
        ProviderAuthMethod::ApiKey => provider.api_key_env(),
        ProviderAuthMethod::OauthToken => provider.oauth_token_env(),
    };
    let env_value = document
        .pointer(&format!("/env/{env_key}"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if env_value.is_empty() {
        bail!("env.{env_key} must carry the selected provider credential");
    }

    let port = document
        .pointer("/gateway/port")
        .and_then(Value::as_u64)
        .and_then(|value| u16::try_from(value).ok())
        .context("gateway.port must be an integer port")?;
    if port != expected_port {
        bail!("gateway.port must be {expected_port} for this group, found {port}");
    }
    Ok(document)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub active_path: PathBuf,
    pub backup_path: Option<PathBuf>,
}

/// Installs `raw` as the active config, first backing up a normal config once.
///
/// An existing backup is never overwritten, and an installed safe-mode config
/// is never backed up, so the backup always holds the last normal config.
pub fn install_active_config(active: &Path, raw: &str) -> Result<InstallReport> {
    let backup = backup_config_path(active);
    let mut backup_path = None;
    if !backup.exists() && !is_safe_mode_config(active).unwrap_or(false) {
        if let Some(previous) = read_optional_text(active)? {
            write_text_atomic(&backup, &previous)
                .with_context(|| format!("failed to back up config to {}", backup.display()))?;
            info!(backup = %backup.display(), "backed up active gateway config");
            backup_path = Some(backup);
        }
    }
    write_text_atomic(active, raw)
        .with_context(|| format!("failed to install gateway config {}", active.display()))?;
    Ok(InstallReport {
        active_path: active.to_path_buf(),
        backup_path,
    })
}
