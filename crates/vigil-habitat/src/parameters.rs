//! Flat parameter-set boundary.
//!
//! The external habitat parser emits `KEY=value` pairs with numbered agent
//! fields (`AGENT1_NAME`, `AGENT2_BOT_TOKEN`, ...). They are folded here, once,
//! into declaration-ordered agents and first-appearance-ordered groups. Values
//! are treated as already validated: unknown keys are ignored and malformed
//! enum values fall back to defaults only where the contract defines one.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::group::{
    validate_group_id, Agent, IsolationGroup, IsolationMode, NetworkPolicy, DEFAULT_GROUP_ID,
};
use crate::platform::{ChannelPolicy, Platform};
use crate::provider::Provider;

pub const DEFAULT_AGENT_MODEL: &str = "anthropic/claude-sonnet-4-5";
pub const DEFAULT_GATEWAY_PORT: u16 = 18789;
pub const MAX_AGENT_COUNT: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    values: BTreeMap<String, String>,
}

impl ParameterSet {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Parses `KEY=value` lines; `#` comments, blank lines, and an `export ` prefix are allowed.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut values = BTreeMap::new();
        for (index, line) in raw.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
            let Some((key, value)) = trimmed.split_once('=') else {
                bail!("line {} is not a KEY=value pair", index + 1);
            };
            let key = key.trim();
            if key.is_empty() {
                bail!("line {} has an empty key", index + 1);
            }
            values.insert(key.to_string(), unquote(value.trim()).to_string());
        }
        Ok(Self { values })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read habitat parameters {}", path.display()))?;
        Self::parse(&raw)
            .with_context(|| format!("failed to parse habitat parameters {}", path.display()))
    }

    /// Trimmed, non-empty value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Configured model-provider API keys, as given (possibly empty).
pub struct ProviderKeys {
    keys: BTreeMap<Provider, String>,
}

impl ProviderKeys {
    pub fn with_key(mut self, provider: Provider, key: impl Into<String>) -> Self {
        self.keys.insert(provider, key.into());
        self
    }

    /// Non-empty configured key for `provider`.
    pub fn key_for(&self, provider: Provider) -> Option<&str> {
        self.keys
            .get(&provider)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Everything the engine needs from one deployment's parameter set.
pub struct Habitat {
    pub agents: Vec<Agent>,
    pub groups: Vec<IsolationGroup>,
    pub channel_policy: ChannelPolicy,
    pub provider_keys: ProviderKeys,
    pub owner_ids: BTreeMap<Platform, String>,
    pub gateway_token: Option<String>,
}

impl Habitat {
    pub fn from_parameters(params: &ParameterSet) -> Result<Self> {
        let channel_policy =
            ChannelPolicy::from_platform_setting(params.get("PLATFORM").unwrap_or("telegram"))?;
        let default_model = params.get("DEFAULT_MODEL").unwrap_or(DEFAULT_AGENT_MODEL);
        let default_isolation = params.get("ISOLATION_DEFAULT").unwrap_or("none");
        let default_network = params.get("NETWORK_DEFAULT").unwrap_or("host");
        let base_port = match params.get("GATEWAY_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("GATEWAY_PORT '{raw}' is not a valid port"))?,
            None => DEFAULT_GATEWAY_PORT,
        };
        let shared_paths = params
            .get("SHARED_PATHS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|path| !path.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let agent_count = resolve_agent_count(params)?;
        let mut agents = Vec::with_capacity(agent_count);
        let mut groups: Vec<IsolationGroup> = Vec::new();
        for number in 1..=agent_count {
            let field = |suffix: &str| format!("AGENT{number}_{suffix}");
            let group_id = params
                .get(&field("ISOLATION_GROUP"))
                .unwrap_or(DEFAULT_GROUP_ID)
                .to_string();
            validate_group_id(&group_id)
                .with_context(|| format!("invalid {}", field("ISOLATION_GROUP")))?;

            let agent = Agent {
                id: format!("agent{number}"),
                name: params
                    .get(&field("NAME"))
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Agent{number}")),
                model: params
                    .get(&field("MODEL"))
                    .unwrap_or(default_model)
                    .to_string(),
                telegram_bot_token: params
                    .first_of(&[
                        field("BOT_TOKEN").as_str(),
                        field("TELEGRAM_BOT_TOKEN").as_str(),
                    ])
                    .map(str::to_string),
                discord_bot_token: params
                    .get(&field("DISCORD_BOT_TOKEN"))
                    .map(str::to_string),
                group: group_id.clone(),
            };

            match groups.iter_mut().find(|group| group.id == group_id) {
                Some(group) => group.agents.push(agent.clone()),
                None => {
                    let mode = params
                        .get(&field("ISOLATION"))
                        .unwrap_or(default_isolation)
                        .parse::<IsolationMode>()
                        .with_context(|| format!("invalid {}", field("ISOLATION")))?;
                    let network = params
                        .get(&field("NETWORK"))
                        .unwrap_or(default_network)
                        .parse::<NetworkPolicy>()
                        .with_context(|| format!("invalid {}", field("NETWORK")))?;
                    let offset = u16::try_from(groups.len()).unwrap_or(u16::MAX);
                    groups.push(IsolationGroup {
                        id: group_id,
                        agents: vec![agent.clone()],
                        mode,
                        network,
                        port: base_port.saturating_add(offset),
                        shared_paths: shared_paths.clone(),
                    });
                }
            }
            agents.push(agent);
        }

        let mut provider_keys = ProviderKeys::default();
        for (provider, keys) in [
            (Provider::Anthropic, &["ANTHROPIC_API_KEY"][..]),
            (Provider::OpenAi, &["OPENAI_API_KEY"][..]),
            (Provider::Google, &["GOOGLE_API_KEY", "GEMINI_API_KEY"][..]),
        ] {
            if let Some(key) = params.first_of(keys) {
                provider_keys = provider_keys.with_key(provider, key);
            }
        }

        let mut owner_ids = BTreeMap::new();
        for (platform, key) in [
            (Platform::Telegram, "TELEGRAM_OWNER_ID"),
            (Platform::Discord, "DISCORD_OWNER_ID"),
        ] {
            if let Some(owner) = params.get(key) {
                owner_ids.insert(platform, owner.to_string());
            }
        }

        Ok(Self {
            agents,
            groups,
            channel_policy,
            provider_keys,
            owner_ids,
            gateway_token: params.get("GATEWAY_TOKEN").map(str::to_string),
        })
    }

    pub fn group(&self, group_id: &str) -> Option<&IsolationGroup> {
        self.groups.iter().find(|group| group.id == group_id)
    }

    pub fn owner_id(&self, platform: Platform) -> Option<&str> {
        self.owner_ids.get(&platform).map(String::as_str)
    }
}

fn resolve_agent_count(params: &ParameterSet) -> Result<usize> {
    if let Some(raw) = params.get("AGENT_COUNT") {
        let count = raw
            .parse::<usize>()
            .with_context(|| format!("AGENT_COUNT '{raw}' is not a number"))?;
        if count > MAX_AGENT_COUNT {
            bail!("AGENT_COUNT {count} exceeds the supported maximum of {MAX_AGENT_COUNT}");
        }
        return Ok(count);
    }
    let mut count = 0usize;
    while count < MAX_AGENT_COUNT && params.get(&format!("AGENT{}_NAME", count + 1)).is_some() {
        count += 1;
    }
    Ok(count)
}
