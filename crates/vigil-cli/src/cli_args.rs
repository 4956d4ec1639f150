use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::CliRunMode;

pub const MAX_PROBE_TIMEOUT_MS: u64 = 10_000;

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u32(value: &str) -> Result<u32, String> {
    let parsed = value
        .parse::<u32>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_probe_timeout_ms(value: &str) -> Result<u64, String> {
    let parsed = parse_positive_u64(value)?;
    if parsed > MAX_PROBE_TIMEOUT_MS {
        return Err(format!("value must be at most {MAX_PROBE_TIMEOUT_MS}"));
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "vigil",
    about = "Health supervision and recovery for isolated gateway groups",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "VIGIL_GROUP",
        default_value = "default",
        help = "Isolation group supervised by this invocation"
    )]
    pub group: String,

    #[arg(
        long = "habitat-params",
        env = "VIGIL_HABITAT_PARAMS",
        default_value = "/etc/vigil/habitat.env",
        help = "Flat KEY=value parameter set produced by the habitat parser"
    )]
    pub habitat_params: PathBuf,

    #[arg(
        long = "state-dir",
        env = "VIGIL_STATE_DIR",
        default_value = "/var/lib/vigil",
        help = "Directory holding group-scoped recovery state, markers, and diagnostics ledgers"
    )]
    pub state_dir: PathBuf,

    #[arg(
        long = "config-root",
        env = "VIGIL_CONFIG_ROOT",
        default_value = "/etc/vigil/gateway",
        help = "Root of active gateway configs (<root>/gateway.json or <root>/<group>/gateway.json)"
    )]
    pub config_root: PathBuf,

    #[arg(
        long = "oauth-profiles",
        env = "VIGIL_OAUTH_PROFILES",
        help = "Optional OAuth profile store consulted before provider API keys"
    )]
    pub oauth_profiles: Option<PathBuf>,

    #[arg(
        long = "ledger-path",
        env = "VIGIL_LEDGER_PATH",
        help = "Override the per-run diagnostics ledger path (default <state-dir>/diagnostics-<group>.log)"
    )]
    pub ledger_path: Option<PathBuf>,

    #[arg(
        long = "run-mode",
        env = "VIGIL_RUN_MODE",
        value_enum,
        default_value_t = CliRunMode::Scheduled,
        help = "scheduled checks liveness; post-start assumes the gateway process is up"
    )]
    pub run_mode: CliRunMode,

    #[arg(
        long = "max-recovery-attempts",
        env = "VIGIL_MAX_RECOVERY_ATTEMPTS",
        default_value_t = 2,
        value_parser = parse_positive_u32,
        help = "Safe-mode attempts before the group escalates to critical"
    )]
    pub max_recovery_attempts: u32,

    #[arg(
        long = "probe-timeout-ms",
        env = "VIGIL_PROBE_TIMEOUT_MS",
        default_value_t = 8_000,
        value_parser = parse_probe_timeout_ms,
        help = "Per-probe timeout for credential validators and the gateway round-trip"
    )]
    pub probe_timeout_ms: u64,

    #[arg(
        long = "restart-timeout-ms",
        env = "VIGIL_RESTART_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Timeout for one restart command; expiry counts as an unconfirmed restart"
    )]
    pub restart_timeout_ms: u64,

    #[arg(
        long = "unit-base",
        env = "VIGIL_UNIT_BASE",
        default_value = "vigil-gateway",
        help = "Base service/container name; session and container groups append -<group>"
    )]
    pub unit_base: String,

    #[arg(
        long = "systemd-user",
        env = "VIGIL_SYSTEMD_USER",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Drive service units through systemctl --user"
    )]
    pub systemd_user: bool,

    #[arg(
        long,
        env = "VIGIL_SYNTHESIZER",
        default_value = "vigil-synthesize-config",
        help = "Executable that prints the safe-mode gateway config as JSON"
    )]
    pub synthesizer: PathBuf,

    #[arg(
        long = "synthesizer-timeout-ms",
        env = "VIGIL_SYNTHESIZER_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64
    )]
    pub synthesizer_timeout_ms: u64,

    #[arg(
        long = "telegram-api-base",
        env = "VIGIL_TELEGRAM_API_BASE",
        default_value = "https://api.telegram.org"
    )]
    pub telegram_api_base: String,

    #[arg(
        long = "discord-api-base",
        env = "VIGIL_DISCORD_API_BASE",
        default_value = "https://discord.com/api/v10"
    )]
    pub discord_api_base: String,

    #[arg(
        long = "anthropic-api-base",
        env = "VIGIL_ANTHROPIC_API_BASE",
        default_value = "https://api.anthropic.com"
    )]
    pub anthropic_api_base: String,

    #[arg(
        long = "openai-api-base",
        env = "VIGIL_OPENAI_API_BASE",
        default_value = "https://api.openai.com"
    )]
    pub openai_api_base: String,

    #[arg(
        long = "google-api-base",
        env = "VIGIL_GOOGLE_API_BASE",
        default_value = "https://generativelanguage.googleapis.com"
    )]
    pub google_api_base: String,

    #[arg(
        long,
        env = "VIGIL_JSON",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Emit reports as pretty JSON"
    )]
    pub json: bool,

    #[arg(
        long,
        conflicts_with_all = ["reset", "discover"],
        help = "Print the group's persisted recovery state and markers, then exit"
    )]
    pub status: bool,

    #[arg(
        long,
        conflicts_with = "discover",
        help = "Clear the group's recovery state and markers (operator intervention), then exit"
    )]
    pub reset: bool,

    #[arg(
        long,
        help = "Run credential discovery only and print the diagnostics ledger; no state changes or restarts"
    )]
    pub discover: bool,
}
