use std::{fmt, str::FromStr};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::platform::Platform;
use crate::provider::{ModelRef, Provider};

pub const DEFAULT_GROUP_ID: &str = "default";
pub const DEFAULT_UNIT_BASE: &str = "vigil-gateway";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// How a group's gateway process is isolated from other groups.
pub enum IsolationMode {
    None,
    Session,
    Container,
}

impl IsolationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            IsolationMode::None => "none",
            IsolationMode::Session => "session",
            IsolationMode::Container => "container",
        }
    }
}

impl fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IsolationMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "shared" => Ok(IsolationMode::None),
            "session" => Ok(IsolationMode::Session),
            "container" => Ok(IsolationMode::Container),
            other => bail!("unsupported isolation mode '{other}'; expected none, session, or container"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkPolicy {
    Host,
    Bridge,
    None,
}

impl NetworkPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            NetworkPolicy::Host => "host",
            NetworkPolicy::Bridge => "bridge",
            NetworkPolicy::None => "none",
        }
    }
}

impl FromStr for NetworkPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "host" => Ok(NetworkPolicy::Host),
            "bridge" | "internal" => Ok(NetworkPolicy::Bridge),
            "none" => Ok(NetworkPolicy::None),
            other => bail!("unsupported network policy '{other}'; expected host, bridge, or none"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One configured agent. Immutable for the duration of a supervision cycle.
pub struct Agent {
    pub id: String,
    pub name: String,
    pub model: String,
    pub telegram_bot_token: Option<String>,
    pub discord_bot_token: Option<String>,
    pub group: String,
}

impl Agent {
    /// Non-empty credential configured for `platform`, if any.
    pub fn credential_for(&self, platform: Platform) -> Option<&str> {
        let raw = match platform {
            Platform::Telegram => self.telegram_bot_token.as_deref(),
            Platform::Discord => self.discord_bot_token.as_deref(),
        };
        raw.map(str::trim).filter(|value| !value.is_empty())
    }

    pub fn model_ref(&self) -> Option<ModelRef> {
        ModelRef::parse(&self.model).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Agents sharing one gateway instance.
pub struct IsolationGroup {
    pub id: String,
    pub agents: Vec<Agent>,
    pub mode: IsolationMode,
    pub network: NetworkPolicy,
    pub port: u16,
    pub shared_paths: Vec<String>,
}

impl IsolationGroup {
    /// Provider implied by the first agent's configured model.
    pub fn preferred_provider(&self) -> Option<Provider> {
        self.agents
            .first()
            .and_then(Agent::model_ref)
            .map(|model| model.provider)
    }

    pub fn agent(&self, agent_id: &str) -> Option<&Agent> {
        self.agents.iter().find(|agent| agent.id == agent_id)
    }

    /// Fully-qualified process/service/container identifier for this group.
    ///
    /// `none` shares one process, so the bare base name is used; the other
    /// modes suffix the group id so no primitive ever touches another group.
    pub fn unit_name(&self, base: &str) -> String {
        match self.mode {
            IsolationMode::None => base.to_string(),
            IsolationMode::Session | IsolationMode::Container => format!("{base}-{}", self.id),
        }
    }
}

/// Group ids become file-name suffixes and unit names, so only `[A-Za-z0-9_-]` is accepted.
pub fn validate_group_id(raw: &str) -> Result<()> {
    if raw.is_empty() {
        bail!("isolation group id cannot be empty");
    }
    if raw.len() > 64 {
        bail!("isolation group id '{raw}' exceeds 64 characters");
    }
    if let Some(invalid) = raw
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_')))
    {
        bail!("isolation group id '{raw}' contains unsupported character '{invalid}'");
    }
    Ok(())
}
