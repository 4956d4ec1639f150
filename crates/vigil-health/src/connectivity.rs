use tracing::debug;
use vigil_credentials::{PlatformValidator, ProbeOutcome};
use vigil_diagnostics::{DiagnosticCategory, DiagnosticsLedger};
use vigil_habitat::{Agent, ChannelPolicy, Platform};

use crate::target::HealthTarget;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConnectivity {
    pub agent_id: String,
    /// Platform the agent authenticated on, if any.
    pub connected_on: Option<Platform>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityReport {
    pub agents: Vec<AgentConnectivity>,
}

impl ConnectivityReport {
    /// Every agent connected; an empty target never passes.
    pub fn passed(&self) -> bool {
        !self.agents.is_empty() && self.agents.iter().all(|agent| agent.connected_on.is_some())
    }

    pub fn disconnected_agents(&self) -> Vec<&str> {
        self.agents
            .iter()
            .filter(|agent| agent.connected_on.is_none())
            .map(|agent| agent.agent_id.as_str())
            .collect()
    }
}

/// Validates every agent's channel credentials under the target's policy.
///
/// `Single` requires each agent on the policy platform. `Either` accepts each
/// agent on its first working platform, primary first. Agents are checked in
/// declaration order and all of them are checked so the ledger is complete.
pub fn check_channel_connectivity(
    target: &HealthTarget,
    validator: &dyn PlatformValidator,
    ledger: &mut DiagnosticsLedger,
) -> ConnectivityReport {
    let platforms = target.policy.search_order(None);
    let agents = target
        .agents
        .iter()
        .map(|agent| AgentConnectivity {
            agent_id: agent.id.clone(),
            connected_on: first_connected_platform(agent, &platforms, validator, ledger),
        })
        .collect::<Vec<_>>();
    let report = ConnectivityReport { agents };
    if target.agents.is_empty() {
        ledger.fail(DiagnosticCategory::Platform, &target.group_id, "no agents to check");
    }
    debug!(
        group = %target.group_id,
        policy = target.policy.label(),
        passed = report.passed(),
        "channel connectivity checked"
    );
    report
}

fn first_connected_platform(
    agent: &Agent,
    platforms: &[Platform],
    validator: &dyn PlatformValidator,
    ledger: &mut DiagnosticsLedger,
) -> Option<Platform> {
    for platform in platforms {
        let identity = format!("{platform}/{}", agent.id);
        let Some(token) = agent.credential_for(*platform) else {
            ledger.fail(DiagnosticCategory::Platform, &identity, "missing");
            continue;
        };
        match validator.validate_token(*platform, token) {
            ProbeOutcome::Valid => {
                ledger.pass(DiagnosticCategory::Platform, &identity, "token valid");
                return Some(*platform);
            }
            ProbeOutcome::Invalid { reason } => {
                ledger.fail(DiagnosticCategory::Platform, &identity, &reason);
            }
        }
    }
    None
}

/// Policy label used in cycle reports.
pub fn describe_policy(policy: &ChannelPolicy) -> String {
    match policy {
        ChannelPolicy::Single { platform } => format!("single:{platform}"),
        ChannelPolicy::Either { primary, secondary } => format!("either:{primary}+{secondary}"),
    }
}
