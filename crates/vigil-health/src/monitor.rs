use std::fmt;

use tracing::{info, warn};
use vigil_credentials::{PlatformValidator, ProbeOutcome};
use vigil_diagnostics::{DiagnosticCategory, DiagnosticsLedger};
use vigil_process::ProcessControl;
use vigil_state::{HealthVerdict, RecoveryMode};

use crate::connectivity::check_channel_connectivity;
use crate::gateway_probe::GatewayProbe;
use crate::target::HealthTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Scheduled,
    /// Invoked from the gateway's post-start hook; liveness holds by construction.
    PostStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStep {
    Liveness,
    Connectivity,
    GatewayProbe,
}

impl HealthStep {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStep::Liveness => "liveness",
            HealthStep::Connectivity => "connectivity",
            HealthStep::GatewayProbe => "gateway_probe",
        }
    }
}

impl fmt::Display for HealthStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Passed,
    Skipped,
    Failed { reason: String },
    /// An earlier step failed.
    NotRun,
}

impl StepResult {
    fn failed(reason: impl Into<String>) -> Self {
        StepResult::Failed {
            reason: reason.into(),
        }
    }

    fn is_ok(&self) -> bool {
        matches!(self, StepResult::Passed | StepResult::Skipped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub liveness: StepResult,
    pub connectivity: StepResult,
    pub gateway_probe: StepResult,
}

impl HealthReport {
    pub fn passed(&self) -> bool {
        self.liveness.is_ok() && self.connectivity.is_ok() && self.gateway_probe.is_ok()
    }

    pub fn failure(&self) -> Option<(HealthStep, &str)> {
        [
            (HealthStep::Liveness, &self.liveness),
            (HealthStep::Connectivity, &self.connectivity),
            (HealthStep::GatewayProbe, &self.gateway_probe),
        ]
        .into_iter()
        .find_map(|(step, result)| match result {
            StepResult::Failed { reason } => Some((step, reason.as_str())),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthAssessment {
    pub verdict: HealthVerdict,
    pub report: HealthReport,
}

/// Maps one cycle's probe result and the persisted mode to a verdict.
pub fn classify(mode: RecoveryMode, passed: bool, serving_safe_config: bool) -> HealthVerdict {
    match (mode, passed) {
        (RecoveryMode::Normal, true) => HealthVerdict::Healthy,
        (RecoveryMode::Normal, false) => HealthVerdict::DegradedEnteringSafeMode,
        (RecoveryMode::SafeMode | RecoveryMode::Critical, true) if serving_safe_config => {
            HealthVerdict::SafeModeStable
        }
        (RecoveryMode::SafeMode | RecoveryMode::Critical, true) => HealthVerdict::Healthy,
        (RecoveryMode::SafeMode | RecoveryMode::Critical, false) => HealthVerdict::Critical,
    }
}

pub struct HealthMonitor<'a> {
    process: &'a dyn ProcessControl,
    validator: &'a dyn PlatformValidator,
    probe: &'a dyn GatewayProbe,
    run_mode: RunMode,
}

impl<'a> HealthMonitor<'a> {
    pub fn new(
        process: &'a dyn ProcessControl,
        validator: &'a dyn PlatformValidator,
        probe: &'a dyn GatewayProbe,
    ) -> Self {
        Self {
            process,
            validator,
            probe,
            run_mode: RunMode::Scheduled,
        }
    }

    pub fn with_run_mode(mut self, run_mode: RunMode) -> Self {
        self.run_mode = run_mode;
        self
    }

    /// Runs the three checks in order, stopping at the first failure.
    pub fn assess(&self, target: &HealthTarget, ledger: &mut DiagnosticsLedger) -> HealthReport {
        let mut report = HealthReport {
            liveness: self.check_liveness(ledger),
            connectivity: StepResult::NotRun,
            gateway_probe: StepResult::NotRun,
        };
        if !report.liveness.is_ok() {
            return report;
        }

        let connectivity = check_channel_connectivity(target, self.validator, ledger);
        report.connectivity = if connectivity.passed() {
            StepResult::Passed
        } else if target.agents.is_empty() {
            StepResult::failed("no agents to check")
        } else {
            StepResult::failed(format!(
                "channel unauthenticated: {}",
                connectivity.disconnected_agents().join(",")
            ))
        };
        if !report.connectivity.is_ok() {
            return report;
        }

        report.gateway_probe = match target.probe_agent_id.as_deref() {
            None => StepResult::failed("no probe agent"),
            Some(agent_id) => match self.probe.round_trip(target.port, agent_id) {
                ProbeOutcome::Valid => {
                    ledger.pass(DiagnosticCategory::Network, "gateway", "marker received");
                    StepResult::Passed
                }
                ProbeOutcome::Invalid { reason } => {
                    ledger.fail(DiagnosticCategory::Network, "gateway", &reason);
                    StepResult::failed(reason)
                }
            },
        };
        report
    }

    pub fn evaluate(
        &self,
        target: &HealthTarget,
        mode: RecoveryMode,
        ledger: &mut DiagnosticsLedger,
    ) -> HealthAssessment {
        let report = self.assess(target, ledger);
        let verdict = classify(mode, report.passed(), target.serving_safe_config);
        match report.failure() {
            Some((step, reason)) => warn!(
                group = %target.group_id,
                %mode,
                %step,
                reason,
                %verdict,
                "health check failed"
            ),
            None => info!(group = %target.group_id, %mode, %verdict, "health check passed"),
        }
        HealthAssessment { verdict, report }
    }

    fn check_liveness(&self, ledger: &mut DiagnosticsLedger) -> StepResult {
        if self.run_mode == RunMode::PostStart {
            ledger.pass(DiagnosticCategory::Network, "liveness", "assumed (post-start)");
            return StepResult::Skipped;
        }
        let target = self.process.primitive().to_string();
        match self.process.is_active() {
            Ok(true) => {
                ledger.pass(DiagnosticCategory::Network, "liveness", &format!("{target} active"));
                StepResult::Passed
            }
            Ok(false) => {
                ledger.fail(DiagnosticCategory::Network, "liveness", &format!("{target} inactive"));
                StepResult::failed(format!("{target} inactive"))
            }
            Err(error) => {
                let reason = format!("liveness check failed: {error}");
                ledger.fail(DiagnosticCategory::Network, "liveness", &reason);
                StepResult::failed(reason)
            }
        }
    }
}
