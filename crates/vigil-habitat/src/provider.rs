use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
    Google,
}

impl Provider {
    /// Fixed order used after the preferred provider during discovery.
    pub const FALLBACK_ORDER: [Provider; 3] =
        [Provider::Anthropic, Provider::OpenAi, Provider::Google];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
            Provider::Google => "google",
        }
    }

    /// Environment key the synthesized gateway config uses for an API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Google => "GOOGLE_API_KEY",
        }
    }

    /// Environment key the synthesized gateway config uses for an OAuth token.
    pub fn oauth_token_env(&self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_OAUTH_TOKEN",
            Provider::OpenAi => "OPENAI_OAUTH_TOKEN",
            Provider::Google => "GOOGLE_OAUTH_TOKEN",
        }
    }

    /// Model used by the safe-mode agent when the preferred model's provider is unusable.
    pub fn default_safe_mode_model(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic/claude-sonnet-4-5",
            Provider::OpenAi => "openai/gpt-4o-mini",
            Provider::Google => "google/gemini-2.0-flash",
        }
    }

    /// `preferred` first, then the remaining providers in fixed fallback order.
    pub fn discovery_order(preferred: Option<Provider>) -> Vec<Provider> {
        let mut order = Vec::with_capacity(Self::FALLBACK_ORDER.len());
        if let Some(preferred) = preferred {
            order.push(preferred);
        }
        order.extend(
            Self::FALLBACK_ORDER
                .iter()
                .copied()
                .filter(|provider| Some(*provider) != preferred),
        );
        order
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelRefParseError {
    #[error("missing model identifier")]
    MissingModel,
    #[error("unsupported provider '{0}'. Supported providers: anthropic, openai, google (alias gemini)")]
    UnsupportedProvider(String),
}

impl FromStr for Provider {
    type Err = ModelRefParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "anthropic" => Ok(Provider::Anthropic),
            "openai" => Ok(Provider::OpenAi),
            "google" | "gemini" => Ok(Provider::Google),
            _ => Err(ModelRefParseError::UnsupportedProvider(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub provider: Provider,
    pub model: String,
}

impl ModelRef {
    /// Splits `provider/model` on the first `/`; the prefix names the provider.
    pub fn parse(input: &str) -> Result<Self, ModelRefParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ModelRefParseError::MissingModel);
        }
        let Some((provider, model)) = trimmed.split_once('/') else {
            return Err(ModelRefParseError::UnsupportedProvider(String::new()));
        };
        let model = model.trim();
        if model.is_empty() {
            return Err(ModelRefParseError::MissingModel);
        }
        Ok(Self {
            provider: Provider::from_str(provider)?,
            model: model.to_string(),
        })
    }

    pub fn as_qualified(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }
}
