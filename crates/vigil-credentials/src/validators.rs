//! Single-call credential validators.
//!
//! Each probe is one authenticated metadata request bounded by the configured
//! timeout, with no retry. Timeouts and transport failures are reported as
//! ordinary invalid outcomes; the next scheduled cycle is the retry.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde_json::Value;
use vigil_habitat::{Platform, Provider};

use crate::auth::auth_header_for;

pub const MAX_PROBE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 8_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Valid,
    Invalid { reason: String },
}

impl ProbeOutcome {
    pub fn invalid(reason: impl Into<String>) -> Self {
        ProbeOutcome::Invalid {
            reason: reason.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ProbeOutcome::Valid)
    }

    pub fn reason(&self) -> &str {
        match self {
            ProbeOutcome::Valid => "valid",
            ProbeOutcome::Invalid { reason } => reason.as_str(),
        }
    }
}

/// `ValidateToken` for messaging platforms.
pub trait PlatformValidator {
    fn validate_token(&self, platform: Platform, token: &str) -> ProbeOutcome;
}

/// `ValidateKey` for model providers.
pub trait ProviderValidator {
    fn validate_key(&self, provider: Provider, key: &str) -> ProbeOutcome;
}

impl<F> PlatformValidator for F
where
    F: Fn(Platform, &str) -> ProbeOutcome,
{
    fn validate_token(&self, platform: Platform, token: &str) -> ProbeOutcome {
        self(platform, token)
    }
}

impl<F> ProviderValidator for F
where
    F: Fn(Provider, &str) -> ProbeOutcome,
{
    fn validate_key(&self, provider: Provider, key: &str) -> ProbeOutcome {
        self(provider, key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorEndpoints {
    pub telegram_api_base: String,
    pub discord_api_base: String,
    pub anthropic_api_base: String,
    pub openai_api_base: String,
    pub google_api_base: String,
}

impl Default for ValidatorEndpoints {
    fn default() -> Self {
        Self {
            telegram_api_base: "https://api.telegram.org".to_string(),
            discord_api_base: "https://discord.com/api/v10".to_string(),
            anthropic_api_base: "https://api.anthropic.com".to_string(),
            openai_api_base: "https://api.openai.com".to_string(),
            google_api_base: "https://generativelanguage.googleapis.com".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpCredentialValidator {
    client: Client,
    endpoints: ValidatorEndpoints,
}

impl HttpCredentialValidator {
    /// Builds a validator whose per-probe timeout is clamped to [`MAX_PROBE_TIMEOUT_MS`].
    pub fn new(endpoints: ValidatorEndpoints, timeout_ms: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms.clamp(1, MAX_PROBE_TIMEOUT_MS)))
            .build()
            .context("failed to build credential probe http client")?;
        Ok(Self { client, endpoints })
    }

    fn send(&self, request: RequestBuilder) -> Result<(StatusCode, Value), ProbeOutcome> {
        let response = request.send().map_err(|error| classify_transport_error(&error))?;
        let status = response.status();
        let body = response.text().unwrap_or_default();
        let payload = serde_json::from_str::<Value>(&body).unwrap_or(Value::Null);
        Ok((status, payload))
    }

    fn probe_telegram(&self, token: &str) -> ProbeOutcome {
        let endpoint = format!(
            "{}/bot{token}/getMe",
            self.endpoints.telegram_api_base.trim_end_matches('/')
        );
        match self.send(self.client.get(&endpoint)) {
            Ok((status, payload)) if status.is_success() => {
                if payload.get("ok").and_then(Value::as_bool).unwrap_or(false) {
                    ProbeOutcome::Valid
                } else {
                    ProbeOutcome::invalid("invalid_response")
                }
            }
            Ok((status, _)) => ProbeOutcome::invalid(classify_status(status)),
            Err(outcome) => outcome,
        }
    }

    fn probe_discord(&self, token: &str) -> ProbeOutcome {
        let endpoint = format!(
            "{}/users/@me",
            self.endpoints.discord_api_base.trim_end_matches('/')
        );
        let request = self
            .client
            .get(&endpoint)
            .header("Authorization", format!("Bot {token}"));
        match self.send(request) {
            Ok((status, payload)) if status.is_success() => {
                if payload.get("id").and_then(Value::as_str).is_some() {
                    ProbeOutcome::Valid
                } else {
                    ProbeOutcome::invalid("invalid_response")
                }
            }
            Ok((status, _)) => ProbeOutcome::invalid(classify_status(status)),
            Err(outcome) => outcome,
        }
    }

    fn provider_models_endpoint(&self, provider: Provider) -> String {
        match provider {
            Provider::Anthropic => format!(
                "{}/v1/models",
                self.endpoints.anthropic_api_base.trim_end_matches('/')
            ),
            Provider::OpenAi => format!(
                "{}/v1/models",
                self.endpoints.openai_api_base.trim_end_matches('/')
            ),
            Provider::Google => format!(
                "{}/v1beta/models",
                self.endpoints.google_api_base.trim_end_matches('/')
            ),
        }
    }
}

impl PlatformValidator for HttpCredentialValidator {
    fn validate_token(&self, platform: Platform, token: &str) -> ProbeOutcome {
        let token = token.trim();
        if token.is_empty() {
            return ProbeOutcome::invalid("missing");
        }
        match platform {
            Platform::Telegram => self.probe_telegram(token),
            Platform::Discord => self.probe_discord(token),
        }
    }
}

impl ProviderValidator for HttpCredentialValidator {
    fn validate_key(&self, provider: Provider, key: &str) -> ProbeOutcome {
        if key.trim().is_empty() {
            return ProbeOutcome::invalid("missing");
        }
        let auth = auth_header_for(provider, key);
        let mut request = self
            .client
            .get(self.provider_models_endpoint(provider))
            .header(auth.header_name, auth.header_value.as_str());
        for (name, value) in &auth.extra_headers {
            request = request.header(*name, *value);
        }
        match self.send(request) {
            Ok((status, _)) if status.is_success() => ProbeOutcome::Valid,
            Ok((status, _)) => ProbeOutcome::invalid(classify_status(status)),
            Err(outcome) => outcome,
        }
    }
}

fn classify_transport_error(error: &reqwest::Error) -> ProbeOutcome {
    if error.is_timeout() {
        return ProbeOutcome::invalid("timeout");
    }
    ProbeOutcome::invalid("transport_error")
}

fn classify_status(status: StatusCode) -> String {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return "unauthorized".to_string();
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return "rate_limited".to_string();
    }
    format!("http_{}", status.as_u16())
}
