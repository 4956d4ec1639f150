use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use vigil_credentials::{ProbeOutcome, MAX_PROBE_TIMEOUT_MS};

pub const HEALTH_MARKER: &str = "VIGIL_HEALTH_OK";
pub const HEALTH_INSTRUCTION: &str = "Reply with exactly VIGIL_HEALTH_OK and nothing else.";
const GATEWAY_HOST: &str = "127.0.0.1";

/// One deterministic round-trip through the live gateway.
pub trait GatewayProbe {
    fn round_trip(&self, port: u16, agent_id: &str) -> ProbeOutcome;
}

impl<F> GatewayProbe for F
where
    F: Fn(u16, &str) -> ProbeOutcome,
{
    fn round_trip(&self, port: u16, agent_id: &str) -> ProbeOutcome {
        self(port, agent_id)
    }
}

#[derive(Clone)]
/// Sends [`HEALTH_INSTRUCTION`] to the gateway's chat-completions endpoint and
/// requires [`HEALTH_MARKER`] in the reply text.
pub struct HttpGatewayProbe {
    client: Client,
    host: String,
    gateway_token: Option<String>,
}

impl std::fmt::Debug for HttpGatewayProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGatewayProbe")
            .field("host", &self.host)
            .field(
                "gateway_token",
                &self.gateway_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl HttpGatewayProbe {
    pub fn new(timeout_ms: u64, gateway_token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms.clamp(1, MAX_PROBE_TIMEOUT_MS)))
            .build()
            .context("failed to build gateway probe http client")?;
        Ok(Self {
            client,
            host: GATEWAY_HOST.to_string(),
            gateway_token: gateway_token.filter(|token| !token.trim().is_empty()),
        })
    }
}

impl GatewayProbe for HttpGatewayProbe {
    fn round_trip(&self, port: u16, agent_id: &str) -> ProbeOutcome {
        let endpoint = format!("http://{}:{port}/v1/chat/completions", self.host);
        let mut request = self.client.post(&endpoint).json(&json!({
            "model": agent_id,
            "messages": [{"role": "user", "content": HEALTH_INSTRUCTION}],
            "stream": false,
        }));
        if let Some(token) = self.gateway_token.as_deref() {
            request = request.bearer_auth(token.trim());
        }
        let response = match request.send() {
            Ok(response) => response,
            Err(error) if error.is_timeout() => return ProbeOutcome::invalid("timeout"),
            Err(error) if error.is_connect() => return ProbeOutcome::invalid("connection_refused"),
            Err(_) => return ProbeOutcome::invalid("transport_error"),
        };
        let status = response.status();
        let body = response.text().unwrap_or_default();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return ProbeOutcome::invalid("unauthorized");
            }
            return ProbeOutcome::invalid(format!("http_{}", status.as_u16()));
        }
        if reply_text(&body).contains(HEALTH_MARKER) {
            ProbeOutcome::Valid
        } else {
            ProbeOutcome::invalid("marker_missing")
        }
    }
}

fn reply_text(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|payload| {
            payload
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}
