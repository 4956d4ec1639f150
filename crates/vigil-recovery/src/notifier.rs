use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use serde_json::{json, Value};
use vigil_credentials::{credential_fingerprint, ValidatorEndpoints};
use vigil_habitat::Platform;

const NOTIFY_TIMEOUT_MS: u64 = 10_000;

#[derive(Clone, PartialEq, Eq)]
pub struct Notification {
    pub platform: Platform,
    pub credential: String,
    pub recipient: String,
    pub message: String,
}

impl std::fmt::Debug for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notification")
            .field("platform", &self.platform)
            .field("credential", &credential_fingerprint(&self.credential))
            .field("recipient", &self.recipient)
            .field("message", &self.message)
            .finish()
    }
}

/// One outbound send. Errors are reported, never retried within a cycle.
pub trait Notifier {
    fn send(&self, notification: &Notification) -> Result<()>;
}

impl<F> Notifier for F
where
    F: Fn(&Notification) -> Result<()>,
{
    fn send(&self, notification: &Notification) -> Result<()> {
        self(notification)
    }
}

#[derive(Debug, Clone)]
/// Direct-message delivery through the platform bot APIs.
pub struct HttpNotifier {
    client: Client,
    telegram_api_base: String,
    discord_api_base: String,
}

impl HttpNotifier {
    pub fn new(endpoints: &ValidatorEndpoints) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(NOTIFY_TIMEOUT_MS))
            .build()
            .context("failed to build notifier http client")?;
        Ok(Self {
            client,
            telegram_api_base: endpoints.telegram_api_base.trim_end_matches('/').to_string(),
            discord_api_base: endpoints.discord_api_base.trim_end_matches('/').to_string(),
        })
    }

    fn send_telegram(&self, notification: &Notification) -> Result<()> {
        let endpoint = format!(
            "{}/bot{}/sendMessage",
            self.telegram_api_base, notification.credential
        );
        let response = self
            .client
            .post(&endpoint)
            .json(&json!({
                "chat_id": notification.recipient.trim(),
                "text": notification.message,
                "disable_web_page_preview": true
            }))
            .send()
            .context("telegram sendMessage request failed")?;
        let status = response.status();
        if !status.is_success() {
            bail!("telegram sendMessage returned status {}", status.as_u16());
        }
        Ok(())
    }

    fn send_discord(&self, notification: &Notification) -> Result<()> {
        let authorization = format!("Bot {}", notification.credential);
        let response = self
            .client
            .post(format!("{}/users/@me/channels", self.discord_api_base))
            .header("Authorization", &authorization)
            .json(&json!({"recipient_id": notification.recipient.trim()}))
            .send()
            .context("discord open-dm request failed")?;
        let status = response.status();
        if !status.is_success() {
            bail!("discord open-dm returned status {}", status.as_u16());
        }
        let payload = response
            .json::<Value>()
            .context("discord open-dm returned invalid json")?;
        let Some(channel_id) = payload.get("id").and_then(Value::as_str) else {
            bail!("discord open-dm response is missing channel id");
        };

        let response = self
            .client
            .post(format!(
                "{}/channels/{channel_id}/messages",
                self.discord_api_base
            ))
            .header("Authorization", &authorization)
            .json(&json!({"content": notification.message}))
            .send()
            .context("discord message request failed")?;
        let status = response.status();
        if !status.is_success() {
            bail!("discord message returned status {}", status.as_u16());
        }
        Ok(())
    }
}

impl Notifier for HttpNotifier {
    fn send(&self, notification: &Notification) -> Result<()> {
        match notification.platform {
            Platform::Telegram => self.send_telegram(notification),
            Platform::Discord => self.send_discord(notification),
        }
    }
}

pub fn safe_mode_message(group_id: &str, agent_id: &str, platform: Platform) -> String {
    format!(
        "Gateway group '{group_id}' is running in safe mode on {platform} with a single emergency agent (credentials from {agent_id}). Normal agents are offline until their configuration is repaired."
    )
}

pub fn critical_message(group_id: &str, reason: &str) -> String {
    format!(
        "Gateway group '{group_id}' is CRITICAL: {reason}. Automatic recovery has stopped; manual intervention is required."
    )
}
