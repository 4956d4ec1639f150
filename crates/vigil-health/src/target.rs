use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use vigil_core::read_optional_text;
use vigil_habitat::{Agent, ChannelPolicy, IsolationGroup, Platform};
use vigil_state::SafeModeChannel;

/// Agent id the emergency configuration must use.
pub const SAFE_MODE_AGENT_ID: &str = "safe-mode";

#[derive(Debug, Clone, PartialEq, Eq)]
/// What the group's active configuration is expected to serve.
pub struct HealthTarget {
    pub group_id: String,
    pub port: u16,
    pub agents: Vec<Agent>,
    pub policy: ChannelPolicy,
    pub probe_agent_id: Option<String>,
    pub serving_safe_config: bool,
}

impl HealthTarget {
    pub fn normal(group: &IsolationGroup, policy: ChannelPolicy) -> Self {
        Self {
            group_id: group.id.clone(),
            port: group.port,
            agents: group.agents.clone(),
            policy,
            probe_agent_id: group.agents.first().map(|agent| agent.id.clone()),
            serving_safe_config: false,
        }
    }

    /// The single `safe-mode` agent bound to the persisted channel.
    ///
    /// When the persisted agent no longer exists in the group the target has
    /// no agents, so connectivity fails.
    pub fn safe_mode(group: &IsolationGroup, channel: &SafeModeChannel) -> Self {
        let agents = group
            .agent(&channel.agent_id)
            .map(|source| {
                let credential = source.credential_for(channel.platform).map(str::to_string);
                vec![Agent {
                    id: SAFE_MODE_AGENT_ID.to_string(),
                    name: format!("{} (safe mode)", source.name),
                    model: source.model.clone(),
                    telegram_bot_token: credential
                        .clone()
                        .filter(|_| channel.platform == Platform::Telegram),
                    discord_bot_token: credential.filter(|_| channel.platform == Platform::Discord),
                    group: group.id.clone(),
                }]
            })
            .unwrap_or_default();
        Self {
            group_id: group.id.clone(),
            port: group.port,
            agents,
            policy: ChannelPolicy::Single {
                platform: channel.platform,
            },
            probe_agent_id: Some(SAFE_MODE_AGENT_ID.to_string()),
            serving_safe_config: true,
        }
    }
}

/// Whether the config at `path` is a synthesized emergency config.
pub fn is_safe_mode_config(path: &Path) -> Result<bool> {
    let Some(raw) = read_optional_text(path)? else {
        return Ok(false);
    };
    let document = serde_json::from_str::<Value>(&raw)
        .with_context(|| format!("failed to parse gateway config {}", path.display()))?;
    let ids: Vec<&str> = document
        .pointer("/agents/list")
        .and_then(Value::as_array)
        .map(|agents| {
            agents
                .iter()
                .filter_map(|agent| agent.get("id").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    Ok(ids == [SAFE_MODE_AGENT_ID])
}
