use std::{fmt, str::FromStr};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Messaging platforms a gateway agent can be bound to.
pub enum Platform {
    Telegram,
    Discord,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Telegram => "telegram",
            Platform::Discord => "discord",
        }
    }

    pub fn other(self) -> Platform {
        match self {
            Platform::Telegram => Platform::Discord,
            Platform::Discord => Platform::Telegram,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "telegram" => Ok(Platform::Telegram),
            "discord" => Ok(Platform::Discord),
            other => bail!("unsupported platform '{other}'; expected telegram or discord"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// Deployment-wide channel policy.
///
/// `Single` demands every agent authenticate on one platform and forbids
/// cross-platform credential fallback. `Either` accepts any agent that works
/// on at least one of the two platforms, primary first.
pub enum ChannelPolicy {
    Single { platform: Platform },
    Either { primary: Platform, secondary: Platform },
}

impl ChannelPolicy {
    /// Resolves the `PLATFORM` habitat value (`telegram`, `discord`, `both`).
    pub fn from_platform_setting(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "" | "telegram" => Ok(ChannelPolicy::Single {
                platform: Platform::Telegram,
            }),
            "discord" => Ok(ChannelPolicy::Single {
                platform: Platform::Discord,
            }),
            "both" => Ok(ChannelPolicy::Either {
                primary: Platform::Telegram,
                secondary: Platform::Discord,
            }),
            other => bail!("unsupported PLATFORM '{other}'; expected telegram, discord, or both"),
        }
    }

    pub fn primary(&self) -> Platform {
        match self {
            ChannelPolicy::Single { platform } => *platform,
            ChannelPolicy::Either { primary, .. } => *primary,
        }
    }

    pub fn allows_cross_platform_fallback(&self) -> bool {
        matches!(self, ChannelPolicy::Either { .. })
    }

    /// Platforms to search, in order, when `preferred` leads the search.
    pub fn search_order(&self, preferred: Option<Platform>) -> Vec<Platform> {
        match (self, preferred) {
            (ChannelPolicy::Single { platform }, preferred) => vec![preferred.unwrap_or(*platform)],
            (ChannelPolicy::Either { primary, secondary }, None) => vec![*primary, *secondary],
            (ChannelPolicy::Either { .. }, Some(preferred)) => vec![preferred, preferred.other()],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChannelPolicy::Single { .. } => "single",
            ChannelPolicy::Either { .. } => "either",
        }
    }
}
