use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use vigil_credentials::{credential_fingerprint, ProviderAuthMethod};
use vigil_habitat::{Platform, Provider};
use vigil_process::{collect_pipe, drain_pipe};
use wait_timeout::ChildExt;

pub const DEFAULT_SYNTHESIZER_TIMEOUT_MS: u64 = 30_000;
pub const SYNTH_ENV_GATEWAY_TOKEN: &str = "VIGIL_SYNTH_GATEWAY_TOKEN";
pub const SYNTH_ENV_PROVIDER_CREDENTIAL: &str = "VIGIL_SYNTH_PROVIDER_CREDENTIAL";
pub const SYNTH_ENV_BOT_TOKEN: &str = "VIGIL_SYNTH_BOT_TOKEN";

#[derive(Clone, PartialEq, Eq)]
/// Inputs for one single-agent emergency config.
pub struct SynthesisRequest {
    pub group_id: String,
    pub gateway_token: Option<String>,
    pub provider: Provider,
    pub provider_credential: String,
    pub auth_method: ProviderAuthMethod,
    pub platform: Platform,
    pub bot_token: String,
    pub owner_id: Option<String>,
    pub model: String,
    pub port: u16,
}

impl std::fmt::Debug for SynthesisRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisRequest")
            .field("group_id", &self.group_id)
            .field("provider", &self.provider)
            .field(
                "provider_credential",
                &credential_fingerprint(&self.provider_credential),
            )
            .field("auth_method", &self.auth_method)
            .field("platform", &self.platform)
            .field("bot_token", &credential_fingerprint(&self.bot_token))
            .field("owner_id", &self.owner_id)
            .field("model", &self.model)
            .field("port", &self.port)
            .finish()
    }
}

impl SynthesisRequest {
    /// Non-secret arguments. Secrets travel in the `VIGIL_SYNTH_*` environment.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = vec![
            "--mode".to_string(),
            "safe-mode".to_string(),
            "--group".to_string(),
            self.group_id.clone(),
            "--provider".to_string(),
            self.provider.as_str().to_string(),
            "--auth-method".to_string(),
            self.auth_method.as_str().to_string(),
            "--platform".to_string(),
            self.platform.as_str().to_string(),
            "--model".to_string(),
            self.model.clone(),
            "--port".to_string(),
            self.port.to_string(),
        ];
        if let Some(owner_id) = self.owner_id.as_deref() {
            args.push("--owner-id".to_string());
            args.push(owner_id.to_string());
        }
        args
    }
}

/// External config synthesis: one request in, one JSON document out.
pub trait ConfigSynthesizer {
    fn synthesize(&self, request: &SynthesisRequest) -> Result<String>;
}

impl<F> ConfigSynthesizer for F
where
    F: Fn(&SynthesisRequest) -> Result<String>,
{
    fn synthesize(&self, request: &SynthesisRequest) -> Result<String> {
        self(request)
    }
}

#[derive(Debug, Clone)]
/// Runs a synthesizer executable and captures its stdout as the config.
pub struct CommandConfigSynthesizer {
    program: PathBuf,
    timeout: Duration,
}

impl CommandConfigSynthesizer {
    pub fn new(program: impl Into<PathBuf>, timeout_ms: u64) -> Self {
        Self {
            program: program.into(),
            timeout: Duration::from_millis(timeout_ms.max(1)),
        }
    }
}

impl ConfigSynthesizer for CommandConfigSynthesizer {
    fn synthesize(&self, request: &SynthesisRequest) -> Result<String> {
        let mut command = Command::new(&self.program);
        command
            .args(request.command_args())
            .env(SYNTH_ENV_PROVIDER_CREDENTIAL, &request.provider_credential)
            .env(SYNTH_ENV_BOT_TOKEN, &request.bot_token)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(token) = request.gateway_token.as_deref() {
            command.env(SYNTH_ENV_GATEWAY_TOKEN, token);
        }
        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn synthesizer {}", self.program.display()))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("failed to open synthesizer stdout"))?;
        let reader = std::thread::spawn(move || {
            let mut buffer = String::new();
            stdout.read_to_string(&mut buffer).map(|_| buffer)
        });
        let stderr_reader = drain_pipe(child.stderr.take());

        let status = match child
            .wait_timeout(self.timeout)
            .context("failed while waiting for synthesizer")?
        {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                bail!(
                    "synthesizer timed out after {} ms",
                    self.timeout.as_millis()
                );
            }
        };
        let output = reader
            .join()
            .map_err(|_| anyhow!("synthesizer stdout reader panicked"))?
            .context("failed to read synthesizer stdout")?;
        if !status.success() {
            let stderr = collect_pipe(stderr_reader);
            bail!(
                "synthesizer exited with {}: {}",
                status
                    .code()
                    .map_or_else(|| "signal".to_string(), |code| format!("code {code}")),
                stderr.trim()
            );
        }
        if output.trim().is_empty() {
            bail!("synthesizer produced no output");
        }
        Ok(output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use super::*;
    use tempfile::tempdir;

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("synthesize");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        let mut permissions = std::fs::metadata(&path).expect("metadata").permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(&path, permissions).expect("chmod");
        path
    }

    fn request() -> SynthesisRequest {
        SynthesisRequest {
            group_id: "browser".to_string(),
            gateway_token: Some("gw-secret".to_string()),
            provider: Provider::Anthropic,
            provider_credential: "sk-ant-api03-secret".to_string(),
            auth_method: ProviderAuthMethod::ApiKey,
            platform: Platform::Telegram,
            bot_token: "123:tg-secret".to_string(),
            owner_id: Some("4242".to_string()),
            model: "anthropic/claude-sonnet-4-5".to_string(),
            port: 18790,
        }
    }

    #[test]
    fn functional_command_synthesizer_passes_secrets_through_environment() {
        let temp = tempdir().expect("tempdir");
        let script = write_script(
            temp.path(),
            "printf '{\"args\":\"%s\",\"bot\":\"%s\",\"key\":\"%s\"}' \"$*\" \"$VIGIL_SYNTH_BOT_TOKEN\" \"$VIGIL_SYNTH_PROVIDER_CREDENTIAL\"",
        );
        let synthesizer = CommandConfigSynthesizer::new(script, 5_000);
        let output = synthesizer.synthesize(&request()).expect("synthesize");
        let payload: serde_json::Value = serde_json::from_str(&output).expect("json");
        let args = payload["args"].as_str().expect("args");
        assert!(args.starts_with("--mode safe-mode --group browser --provider anthropic"));
        assert!(args.ends_with("--owner-id 4242"));
        assert!(!args.contains("secret"));
        assert_eq!(payload["bot"], "123:tg-secret");
        assert_eq!(payload["key"], "sk-ant-api03-secret");
    }

    #[test]
    fn regression_failing_synthesizer_reports_stderr() {
        let temp = tempdir().expect("tempdir");
        let script = write_script(temp.path(), "echo 'unknown provider' >&2\nexit 2");
        let error = CommandConfigSynthesizer::new(script, 5_000)
            .synthesize(&request())
            .expect_err("must fail");
        let rendered = error.to_string();
        assert!(rendered.contains("code 2"));
        assert!(rendered.contains("unknown provider"));
    }

    #[test]
    fn regression_chatty_synthesizer_stderr_does_not_block_completion() {
        let temp = tempdir().expect("tempdir");
        let script = write_script(
            temp.path(),
            "head -c 200000 /dev/zero | tr '\\0' w >&2\nprintf '{\"gateway\":{}}'",
        );
        let output = CommandConfigSynthesizer::new(script, 10_000)
            .synthesize(&request())
            .expect("synthesize despite large stderr");
        assert_eq!(output, "{\"gateway\":{}}");
    }

    #[test]
    fn regression_synthesizer_timeout_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let script = write_script(temp.path(), "exec sleep 5");
        let error = CommandConfigSynthesizer::new(script, 100)
            .synthesize(&request())
            .expect_err("must time out");
        assert!(error.to_string().contains("timed out"));
    }

    #[test]
    fn unit_request_debug_output_redacts_secrets() {
        let rendered = format!("{:?}", request());
        assert!(!rendered.contains("tg-secret"));
        assert!(!rendered.contains("sk-ant-api03-secret"));
        assert!(rendered.contains("sha256:"));
    }
}
