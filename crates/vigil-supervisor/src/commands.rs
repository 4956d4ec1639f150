use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::{error, info};
use vigil_cli::{resolve_cli_action, validate_cli, Cli, CliAction};
use vigil_credentials::{ChannelCredential, ProviderCredential};
use vigil_diagnostics::{render_boot_report, DiagnosticsLedger};
use vigil_habitat::Platform;
use vigil_state::{
    FileStateStore, HealthVerdict, NotificationCategory, RecoveryMode, RecoveryStateStore,
    SafeModeChannel,
};

use crate::runtime::SupervisorRuntime;

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    validate_cli(&cli)?;
    let action = resolve_cli_action(&cli);
    info!(group = %cli.group, action = action.as_str(), "vigil invoked");
    match action {
        CliAction::Status => {
            let store = FileStateStore::new(&cli.state_dir, &cli.group)?;
            println!("{}", render_status(&store, cli.json)?);
            Ok(())
        }
        CliAction::Reset => {
            let store = FileStateStore::new(&cli.state_dir, &cli.group)?;
            store.reset()?;
            info!(group = %cli.group, "recovery state reset by operator");
            println!("group={} reset=true", cli.group);
            Ok(())
        }
        CliAction::Discover => {
            let runtime = SupervisorRuntime::from_cli(&cli)?;
            let mut ledger = runtime.open_ledger()?;
            let report = run_discovery(&runtime, &mut ledger)?;
            println!("{}", render_discovery(&report, &ledger, cli.json)?);
            Ok(())
        }
        CliAction::Supervise => {
            let runtime = SupervisorRuntime::from_cli(&cli)?;
            let mut ledger = runtime.open_ledger()?;
            match runtime.supervise(&mut ledger)? {
                Ok(report) => {
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        println!("{}", report.render_line());
                    }
                    Ok(())
                }
                Err(recovery_error) => {
                    error!(
                        group = %cli.group,
                        reason = recovery_error.reason_code(),
                        error = %recovery_error,
                        "supervision cycle failed"
                    );
                    Err(anyhow!(recovery_error))
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct StatusReport {
    pub group: String,
    pub mode: RecoveryMode,
    pub attempt_count: u32,
    pub last_notified_verdict: Option<HealthVerdict>,
    pub safe_mode_channel: Option<SafeModeChannel>,
    pub safe_mode_notified: bool,
    pub critical_notified: bool,
}

pub(crate) fn collect_status(store: &dyn RecoveryStateStore) -> Result<StatusReport> {
    let state = store.load()?;
    Ok(StatusReport {
        group: store.group_id().to_string(),
        mode: state.mode,
        attempt_count: state.attempt_count,
        last_notified_verdict: state.last_notified_verdict,
        safe_mode_channel: state.safe_mode_channel,
        safe_mode_notified: store.notification_marked(NotificationCategory::SafeMode)?,
        critical_notified: store.notification_marked(NotificationCategory::Critical)?,
    })
}

pub(crate) fn render_status(store: &dyn RecoveryStateStore, json: bool) -> Result<String> {
    let status = collect_status(store)?;
    if json {
        return Ok(serde_json::to_string_pretty(&status)?);
    }
    let channel = status
        .safe_mode_channel
        .as_ref()
        .map(|channel| format!("{}:{}", channel.platform, channel.agent_id))
        .unwrap_or_else(|| "none".to_string());
    Ok(format!(
        "group={} mode={} attempts={} safe_mode_channel={} notified_safe_mode={} notified_critical={}",
        status.group,
        status.mode,
        status.attempt_count,
        channel,
        status.safe_mode_notified,
        status.critical_notified
    ))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct DiscoveredChannel {
    pub agent_id: String,
    pub platform: Platform,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct DiscoveredProvider {
    pub provider: String,
    pub auth_method: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct DiscoveryReport {
    pub group: String,
    pub channel: Option<DiscoveredChannel>,
    pub provider: Option<DiscoveredProvider>,
}

impl DiscoveryReport {
    fn from_selection(
        group: &str,
        channel: Option<ChannelCredential>,
        provider: Option<ProviderCredential>,
    ) -> Self {
        Self {
            group: group.to_string(),
            channel: channel.map(|channel| DiscoveredChannel {
                agent_id: channel.agent_id,
                platform: channel.platform,
            }),
            provider: provider.map(|provider| DiscoveredProvider {
                provider: provider.provider.as_str().to_string(),
                auth_method: provider.auth_method.as_str().to_string(),
            }),
        }
    }
}

/// Credential discovery alone: no state, config, or process is touched.
fn run_discovery(
    runtime: &SupervisorRuntime,
    ledger: &mut DiagnosticsLedger,
) -> Result<DiscoveryReport> {
    let group = runtime.group()?;
    let habitat = runtime.habitat();
    let discovery = runtime.discovery();
    let channel =
        discovery.find_working_channel_credential(group, &habitat.channel_policy, None, ledger);
    let provider =
        discovery.find_working_provider_credential(group, &habitat.provider_keys, ledger);
    Ok(DiscoveryReport::from_selection(&group.id, channel, provider))
}

fn render_discovery(
    report: &DiscoveryReport,
    ledger: &DiagnosticsLedger,
    json: bool,
) -> Result<String> {
    if json {
        let payload = serde_json::json!({
            "report": report,
            "ledger": ledger.lines(),
        });
        return Ok(serde_json::to_string_pretty(&payload)?);
    }
    Ok(render_boot_report(ledger.records()))
}
