use std::path::PathBuf;

use serde::Serialize;
use tracing::{error, info, warn};
use vigil_credentials::{ChannelCredential, CredentialDiscovery};
use vigil_diagnostics::DiagnosticsLedger;
use vigil_habitat::{Habitat, IsolationGroup, Provider};
use vigil_health::{is_safe_mode_config, HealthMonitor, HealthTarget};
use vigil_process::{ProcessControl, RestartOutcome};
use vigil_state::{
    HealthVerdict, NotificationCategory, RecoveryMode, RecoveryState, RecoveryStateStore,
    SafeModeChannel,
};

use crate::config_install::{install_active_config, validate_safe_mode_config};
use crate::error::RecoveryError;
use crate::notifier::{critical_message, safe_mode_message, Notification, Notifier};
use crate::synthesizer::{ConfigSynthesizer, SynthesisRequest};
use crate::transition::{plan_transition, RecoveryAction};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// What one supervision cycle observed and did.
pub struct CycleReport {
    pub group: String,
    pub verdict: HealthVerdict,
    pub previous_mode: RecoveryMode,
    pub mode: RecoveryMode,
    pub attempt_count: u32,
    pub action: RecoveryAction,
    pub outcome: String,
    pub restart_confirmed: Option<bool>,
    pub notified: bool,
}

impl CycleReport {
    fn new(group: &str, verdict: HealthVerdict, previous: &RecoveryState, action: RecoveryAction) -> Self {
        Self {
            group: group.to_string(),
            verdict,
            previous_mode: previous.mode,
            mode: previous.mode,
            attempt_count: previous.attempt_count,
            action,
            outcome: String::new(),
            restart_confirmed: None,
            notified: false,
        }
    }

    fn finish(mut self, state: &RecoveryState, outcome: &str) -> Self {
        self.mode = state.mode;
        self.attempt_count = state.attempt_count;
        self.outcome = outcome.to_string();
        self
    }

    pub fn render_line(&self) -> String {
        let mut line = format!(
            "group={} verdict={} mode={}->{} attempts={} action={} outcome={}",
            self.group,
            self.verdict,
            self.previous_mode,
            self.mode,
            self.attempt_count,
            self.action.as_str(),
            self.outcome
        );
        if let Some(confirmed) = self.restart_confirmed {
            line.push_str(&format!(" restart_confirmed={confirmed}"));
        }
        if self.notified {
            line.push_str(" notified=true");
        }
        line
    }
}

/// Side-effecting executor for [`plan_transition`], bound to one group.
pub struct RecoveryOrchestrator<'a> {
    pub habitat: &'a Habitat,
    pub group: &'a IsolationGroup,
    pub store: &'a dyn RecoveryStateStore,
    pub discovery: &'a CredentialDiscovery<'a>,
    pub synthesizer: &'a dyn ConfigSynthesizer,
    pub process: &'a dyn ProcessControl,
    pub notifier: &'a dyn Notifier,
    pub active_config_path: PathBuf,
    pub max_attempts: u32,
}

impl RecoveryOrchestrator<'_> {
    /// Monitors the group against its active config, then acts on the verdict.
    pub fn supervise(
        &self,
        monitor: &HealthMonitor<'_>,
        ledger: &mut DiagnosticsLedger,
    ) -> Result<CycleReport, RecoveryError> {
        let state = self.load_state()?;
        let target = self.health_target(&state);
        let assessment = monitor.evaluate(&target, state.mode, ledger);
        self.apply(assessment.verdict, ledger)
    }

    /// Normal agents, or the single safe-mode agent while its config is installed.
    pub fn health_target(&self, state: &RecoveryState) -> HealthTarget {
        if state.mode != RecoveryMode::Normal {
            if let Some(channel) = state.safe_mode_channel.as_ref() {
                match is_safe_mode_config(&self.active_config_path) {
                    Ok(true) => return HealthTarget::safe_mode(self.group, channel),
                    Ok(false) => {}
                    Err(error) => warn!(
                        group = %self.group.id,
                        error = %format!("{error:#}"),
                        "failed to inspect active gateway config"
                    ),
                }
            }
        }
        HealthTarget::normal(self.group, self.habitat.channel_policy)
    }

    pub fn apply(
        &self,
        verdict: HealthVerdict,
        ledger: &mut DiagnosticsLedger,
    ) -> Result<CycleReport, RecoveryError> {
        let state = self.load_state()?;
        let transition = plan_transition(&state, verdict, self.max_attempts);
        let report = CycleReport::new(&self.group.id, verdict, &state, transition.action);
        info!(
            group = %self.group.id,
            %verdict,
            mode = %state.mode,
            attempts = state.attempt_count,
            action = transition.action.as_str(),
            "recovery transition planned"
        );

        match transition.action {
            RecoveryAction::None => Ok(report.finish(&state, "steady")),
            RecoveryAction::Restore => self.restore(report),
            RecoveryAction::EnterSafeMode => self.enter_safe_mode(state, report, ledger),
            RecoveryAction::Escalate | RecoveryAction::AlertCritical => {
                self.escalate(state, report, ledger)
            }
            RecoveryAction::NotifySafeModeStable => {
                let (state, notified, outcome) =
                    self.notify_once(state, NotificationCategory::SafeMode, ledger)?;
                let mut report = report.finish(&state, outcome);
                report.notified = notified;
                Ok(report)
            }
        }
    }

    fn restore(&self, report: CycleReport) -> Result<CycleReport, RecoveryError> {
        let state = RecoveryState::default();
        self.save_state(&state)?;
        for category in NotificationCategory::ALL {
            self.store
                .clear_notified(category)
                .map_err(|error| self.state_error(error))?;
        }
        info!(group = %self.group.id, "group restored to normal");
        Ok(report.finish(&state, "restored"))
    }

    fn enter_safe_mode(
        &self,
        mut state: RecoveryState,
        mut report: CycleReport,
        ledger: &mut DiagnosticsLedger,
    ) -> Result<CycleReport, RecoveryError> {
        state.attempt_count = state.attempt_count.saturating_add(1);
        self.save_state(&state)?;

        let policy = self.habitat.channel_policy;
        let Some(channel) =
            self.discovery
                .find_working_channel_credential(self.group, &policy, None, ledger)
        else {
            warn!(group = %self.group.id, attempts = state.attempt_count, "no working channel credential for safe mode");
            return Ok(report.finish(&state, "no_working_credential"));
        };
        let Some(provider) = self.discovery.find_working_provider_credential(
            self.group,
            &self.habitat.provider_keys,
            ledger,
        ) else {
            warn!(group = %self.group.id, attempts = state.attempt_count, "no working provider credential for safe mode");
            return Ok(report.finish(&state, "no_working_credential"));
        };

        let request = SynthesisRequest {
            group_id: self.group.id.clone(),
            gateway_token: self.habitat.gateway_token.clone(),
            provider: provider.provider,
            provider_credential: provider.credential.clone(),
            auth_method: provider.auth_method,
            platform: channel.platform,
            bot_token: channel.credential.clone(),
            owner_id: self.habitat.owner_id(channel.platform).map(str::to_string),
            model: self.safe_mode_model(provider.provider),
            port: self.group.port,
        };
        let raw = self
            .synthesizer
            .synthesize(&request)
            .map_err(|error| RecoveryError::Synthesis {
                group: self.group.id.clone(),
                detail: format!("{error:#}"),
            })?;
        if let Err(rejection) = validate_safe_mode_config(
            &raw,
            channel.platform,
            provider.provider,
            provider.auth_method,
            request.port,
        ) {
            error!(
                group = %self.group.id,
                reason = %format!("{rejection:#}"),
                "synthesized safe-mode config rejected; nothing installed"
            );
            return Err(RecoveryError::StructuralConfig {
                group: self.group.id.clone(),
                reason: format!("{rejection:#}"),
            });
        }
        install_active_config(&self.active_config_path, &raw).map_err(|error| {
            RecoveryError::Install {
                group: self.group.id.clone(),
                path: self.active_config_path.display().to_string(),
                detail: format!("{error:#}"),
            }
        })?;

        state.mode = RecoveryMode::SafeMode;
        state.last_notified_verdict = None;
        state.safe_mode_channel = Some(SafeModeChannel {
            agent_id: channel.agent_id.clone(),
            platform: channel.platform,
        });
        self.save_state(&state)?;
        self.store
            .clear_notified(NotificationCategory::SafeMode)
            .map_err(|error| self.state_error(error))?;

        let restart = self.process.restart().map_err(|error| RecoveryError::Restart {
            group: self.group.id.clone(),
            target: self.process.primitive().to_string(),
            detail: format!("{error:#}"),
        })?;
        report.restart_confirmed = Some(restart.is_confirmed());
        match restart {
            RestartOutcome::Confirmed => info!(
                group = %self.group.id,
                agent = %channel.agent_id,
                platform = %channel.platform,
                provider = %provider.provider,
                "safe mode entered"
            ),
            RestartOutcome::Unconfirmed { reason } => warn!(
                group = %self.group.id,
                %reason,
                "safe mode installed but restart not confirmed"
            ),
        }
        Ok(report.finish(&state, "entered_safe_mode"))
    }

    fn escalate(
        &self,
        mut state: RecoveryState,
        report: CycleReport,
        ledger: &mut DiagnosticsLedger,
    ) -> Result<CycleReport, RecoveryError> {
        if state.mode != RecoveryMode::Critical {
            state.mode = RecoveryMode::Critical;
            self.save_state(&state)?;
            error!(
                group = %self.group.id,
                attempts = state.attempt_count,
                "group is critical; automatic recovery stopped"
            );
        }
        let (state, notified, outcome) =
            self.notify_once(state, NotificationCategory::Critical, ledger)?;
        let mut report = report.finish(&state, outcome);
        report.notified = notified;
        Ok(report)
    }

    /// Sends at most one notification per marker category.
    ///
    /// A failed or impossible send leaves the marker unset so the next cycle
    /// tries again.
    fn notify_once(
        &self,
        mut state: RecoveryState,
        category: NotificationCategory,
        ledger: &mut DiagnosticsLedger,
    ) -> Result<(RecoveryState, bool, &'static str), RecoveryError> {
        let marked = self
            .store
            .notification_marked(category)
            .map_err(|error| self.state_error(error))?;
        if marked {
            return Ok((state, false, "notification_already_sent"));
        }

        let Some(channel) = self.notification_channel(&state, ledger) else {
            warn!(group = %self.group.id, category = category.as_str(), "no working channel to notify through");
            return Ok((state, false, "notification_skipped"));
        };
        let Some(recipient) = self.habitat.owner_id(channel.platform) else {
            warn!(
                group = %self.group.id,
                platform = %channel.platform,
                "no owner id configured; notification skipped"
            );
            return Ok((state, false, "notification_skipped"));
        };

        let message = match category {
            NotificationCategory::SafeMode => {
                safe_mode_message(&self.group.id, &channel.agent_id, channel.platform)
            }
            NotificationCategory::Critical => critical_message(
                &self.group.id,
                if state.attempt_count >= self.max_attempts {
                    "recovery attempts exhausted"
                } else {
                    "safe-mode configuration is failing"
                },
            ),
        };
        let notification = Notification {
            platform: channel.platform,
            credential: channel.credential,
            recipient: recipient.to_string(),
            message,
        };
        if let Err(error) = self.notifier.send(&notification) {
            warn!(
                group = %self.group.id,
                category = category.as_str(),
                error = %format!("{error:#}"),
                "notification send failed"
            );
            return Ok((state, false, "notification_failed"));
        }

        self.store
            .mark_notified(category)
            .map_err(|error| self.state_error(error))?;
        state.last_notified_verdict = Some(category.verdict());
        self.save_state(&state)?;
        let outcome = match category {
            NotificationCategory::SafeMode => "safe_mode_notified",
            NotificationCategory::Critical => "critical_alerted",
        };
        Ok((state, true, outcome))
    }

    fn notification_channel(
        &self,
        state: &RecoveryState,
        ledger: &mut DiagnosticsLedger,
    ) -> Option<ChannelCredential> {
        let persisted = state.safe_mode_channel.as_ref().and_then(|channel| {
            let agent = self.group.agent(&channel.agent_id)?;
            let credential = agent.credential_for(channel.platform)?;
            Some(ChannelCredential {
                agent_id: channel.agent_id.clone(),
                platform: channel.platform,
                credential: credential.to_string(),
            })
        });
        persisted.or_else(|| {
            self.discovery.find_working_channel_credential(
                self.group,
                &self.habitat.channel_policy,
                None,
                ledger,
            )
        })
    }

    fn safe_mode_model(&self, provider: Provider) -> String {
        self.group
            .agents
            .first()
            .and_then(|agent| agent.model_ref())
            .filter(|model| model.provider == provider)
            .map(|model| model.as_qualified())
            .unwrap_or_else(|| provider.default_safe_mode_model().to_string())
    }

    fn load_state(&self) -> Result<RecoveryState, RecoveryError> {
        self.store.load().map_err(|error| self.state_error(error))
    }

    fn save_state(&self, state: &RecoveryState) -> Result<(), RecoveryError> {
        self.store.save(state).map_err(|error| self.state_error(error))
    }

    fn state_error(&self, error: anyhow::Error) -> RecoveryError {
        RecoveryError::State {
            group: self.group.id.clone(),
            detail: format!("{error:#}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::path::Path;

    use anyhow::{anyhow, Result};
    use serde_json::json;
    use tempfile::{tempdir, TempDir};
    use vigil_credentials::{OAuthProfileStore, ProbeOutcome};
    use vigil_habitat::{ParameterSet, Platform};
    use vigil_process::RestartPrimitive;
    use vigil_state::FileStateStore;

    use super::*;
    use crate::config_install::backup_config_path;

    struct FakeProcess {
        primitive: RestartPrimitive,
        restarts: Cell<u32>,
        fail_restart: bool,
    }

    impl ProcessControl for FakeProcess {
        fn primitive(&self) -> &RestartPrimitive {
            &self.primitive
        }
        fn stop(&self) -> Result<()> {
            Ok(())
        }
        fn start(&self) -> Result<()> {
            Ok(())
        }
        fn restart(&self) -> Result<RestartOutcome> {
            self.restarts.set(self.restarts.get() + 1);
            if self.fail_restart {
                return Err(anyhow!("unit vigil-gateway-browser.service not found"));
            }
            Ok(RestartOutcome::Confirmed)
        }
        fn is_active(&self) -> Result<bool> {
            Ok(true)
        }
    }

    struct Fixture {
        temp: TempDir,
        habitat: Habitat,
        store: FileStateStore,
        process: FakeProcess,
        synth_calls: Cell<u32>,
        sent: RefCell<Vec<Notification>>,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = tempdir().expect("tempdir");
            let habitat = Habitat::from_parameters(&ParameterSet::from_pairs([
                ("PLATFORM", "telegram"),
                ("AGENT_COUNT", "2"),
                ("AGENT1_NAME", "Scout"),
                ("AGENT1_MODEL", "anthropic/claude-opus-4"),
                ("AGENT1_BOT_TOKEN", "revoked-1"),
                ("AGENT1_ISOLATION_GROUP", "browser"),
                ("AGENT1_ISOLATION", "session"),
                ("AGENT2_NAME", "Reader"),
                ("AGENT2_BOT_TOKEN", "valid-2"),
                ("AGENT2_ISOLATION_GROUP", "browser"),
                ("ANTHROPIC_API_KEY", "valid-anthropic"),
                ("TELEGRAM_OWNER_ID", "4242"),
            ]))
            .expect("habitat");
            let store = FileStateStore::new(temp.path().join("state"), "browser").expect("store");
            Self {
                temp,
                habitat,
                store,
                process: FakeProcess {
                    primitive: RestartPrimitive::ServiceUnit {
                        unit: "vigil-gateway-browser.service".to_string(),
                        user_scope: false,
                    },
                    restarts: Cell::new(0),
                    fail_restart: false,
                },
                synth_calls: Cell::new(0),
                sent: RefCell::new(Vec::new()),
            }
        }

        fn active_path(&self) -> PathBuf {
            self.temp.path().join("config").join("browser").join("gateway.json")
        }

        fn preset(&self, state: RecoveryState) {
            self.store.save(&state).expect("preset state");
        }

        fn apply_with(
            &self,
            verdict: HealthVerdict,
            synthesizer: &dyn ConfigSynthesizer,
            notifier: &dyn Notifier,
        ) -> Result<CycleReport, RecoveryError> {
            let oauth = OAuthProfileStore::empty();
            let discovery = CredentialDiscovery::new(&accept_valid_token, &accept_valid_key, &oauth);
            let orchestrator = RecoveryOrchestrator {
                habitat: &self.habitat,
                group: self.habitat.group("browser").expect("group"),
                store: &self.store,
                discovery: &discovery,
                synthesizer,
                process: &self.process,
                notifier,
                active_config_path: self.active_path(),
                max_attempts: 2,
            };
            let mut ledger = DiagnosticsLedger::in_memory();
            orchestrator.apply(verdict, &mut ledger)
        }

        fn apply(&self, verdict: HealthVerdict) -> Result<CycleReport, RecoveryError> {
            let synthesizer = |request: &SynthesisRequest| -> Result<String> {
                self.synth_calls.set(self.synth_calls.get() + 1);
                Ok(safe_mode_document(request).to_string())
            };
            let notifier = |notification: &Notification| -> Result<()> {
                self.sent.borrow_mut().push(notification.clone());
                Ok(())
            };
            self.apply_with(verdict, &synthesizer, &notifier)
        }
    }

    fn accept_valid_token(_: Platform, token: &str) -> ProbeOutcome {
        if token.starts_with("valid") {
            ProbeOutcome::Valid
        } else {
            ProbeOutcome::invalid("unauthorized")
        }
    }

    fn accept_valid_key(_: vigil_habitat::Provider, key: &str) -> ProbeOutcome {
        accept_valid_token(Platform::Telegram, key)
    }

    fn safe_mode_document(request: &SynthesisRequest) -> serde_json::Value {
        json!({
            "agents": {"list": [{"id": "safe-mode", "model": request.model}]},
            "channels": {
                request.platform.as_str(): {"accounts": {"safe-mode": {"botToken": request.bot_token}}}
            },
            "env": {request.provider.api_key_env(): request.provider_credential},
            "gateway": {"port": request.port}
        })
    }

    fn safe_mode_state(attempt_count: u32) -> RecoveryState {
        RecoveryState {
            mode: RecoveryMode::SafeMode,
            attempt_count,
            last_notified_verdict: None,
            safe_mode_channel: Some(SafeModeChannel {
                agent_id: "agent2".to_string(),
                platform: Platform::Telegram,
            }),
        }
    }

    fn write(path: &Path, raw: &str) {
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, raw).expect("write");
    }

    #[test]
    fn functional_degraded_group_enters_safe_mode_with_first_working_channel() {
        let fixture = Fixture::new();
        write(&fixture.active_path(), r#"{"agents":{"list":[{"id":"agent1"},{"id":"agent2"}]}}"#);

        let report = fixture
            .apply(HealthVerdict::DegradedEnteringSafeMode)
            .expect("enter safe mode");

        assert_eq!(report.outcome, "entered_safe_mode");
        assert_eq!(report.mode, RecoveryMode::SafeMode);
        assert_eq!(report.attempt_count, 1);
        assert_eq!(report.restart_confirmed, Some(true));
        assert_eq!(fixture.synth_calls.get(), 1);
        assert_eq!(fixture.process.restarts.get(), 1);

        let state = fixture.store.load().expect("load");
        assert_eq!(state, safe_mode_state(1));
        assert!(is_safe_mode_config(&fixture.active_path()).expect("inspect"));
        assert!(backup_config_path(&fixture.active_path()).exists());
        assert!(fixture.sent.borrow().is_empty());
    }

    #[test]
    fn unit_safe_mode_model_keeps_preferred_model_when_provider_matches() {
        let fixture = Fixture::new();
        let seen = RefCell::new(None);
        let synthesizer = |request: &SynthesisRequest| -> Result<String> {
            *seen.borrow_mut() = Some((request.model.clone(), request.owner_id.clone()));
            Ok(safe_mode_document(request).to_string())
        };
        let notifier = |_: &Notification| -> Result<()> { Ok(()) };
        fixture
            .apply_with(HealthVerdict::DegradedEnteringSafeMode, &synthesizer, &notifier)
            .expect("enter");
        assert_eq!(
            *seen.borrow(),
            Some((
                "anthropic/claude-opus-4".to_string(),
                Some("4242".to_string())
            ))
        );
    }

    #[test]
    fn regression_attempts_at_max_escalate_without_synthesis_or_restart() {
        let fixture = Fixture::new();
        fixture.preset(RecoveryState {
            attempt_count: 2,
            ..RecoveryState::default()
        });

        let report = fixture
            .apply(HealthVerdict::DegradedEnteringSafeMode)
            .expect("escalate");
        assert_eq!(report.action, RecoveryAction::Escalate);
        assert_eq!(report.mode, RecoveryMode::Critical);
        assert_eq!(report.outcome, "critical_alerted");
        assert_eq!(fixture.synth_calls.get(), 0);
        assert_eq!(fixture.process.restarts.get(), 0);

        let again = fixture.apply(HealthVerdict::Critical).expect("repeat");
        assert_eq!(again.outcome, "notification_already_sent");
        assert_eq!(fixture.sent.borrow().len(), 1);
        assert!(fixture.sent.borrow()[0].message.contains("attempts exhausted"));
        assert_eq!(fixture.store.load().expect("load").mode, RecoveryMode::Critical);
    }

    #[test]
    fn regression_rejected_config_aborts_before_install_and_restart() {
        let fixture = Fixture::new();
        write(&fixture.active_path(), r#"{"agents":{"list":[{"id":"agent1"}]}}"#);
        let synthesizer = |request: &SynthesisRequest| -> Result<String> {
            let mut document = safe_mode_document(request);
            document["channels"]["telegram"]["accounts"] = json!({"default": {"botToken": "x"}});
            Ok(document.to_string())
        };
        let notifier = |_: &Notification| -> Result<()> { Ok(()) };

        let error = fixture
            .apply_with(HealthVerdict::DegradedEnteringSafeMode, &synthesizer, &notifier)
            .expect_err("must reject");
        assert!(matches!(error, RecoveryError::StructuralConfig { .. }));
        assert_eq!(fixture.process.restarts.get(), 0);
        assert!(!is_safe_mode_config(&fixture.active_path()).expect("inspect"));

        let state = fixture.store.load().expect("load");
        assert_eq!(state.mode, RecoveryMode::Normal);
        assert_eq!(state.attempt_count, 1);
    }

    #[test]
    fn functional_missing_credentials_count_an_attempt_and_stay_normal() {
        let mut fixture = Fixture::new();
        fixture.habitat.provider_keys = vigil_habitat::ProviderKeys::default();

        let report = fixture
            .apply(HealthVerdict::DegradedEnteringSafeMode)
            .expect("cycle");
        assert_eq!(report.outcome, "no_working_credential");
        assert_eq!(report.mode, RecoveryMode::Normal);
        assert_eq!(report.attempt_count, 1);
        assert_eq!(fixture.synth_calls.get(), 0);
        assert_eq!(fixture.process.restarts.get(), 0);
    }

    #[test]
    fn regression_restart_failure_surfaces_after_state_is_persisted() {
        let mut fixture = Fixture::new();
        fixture.process.fail_restart = true;

        let error = fixture
            .apply(HealthVerdict::DegradedEnteringSafeMode)
            .expect_err("restart fails");
        assert_eq!(error.reason_code(), "restart_failed");
        assert_eq!(fixture.store.load().expect("load"), safe_mode_state(1));
        assert_eq!(fixture.process.restarts.get(), 1);
    }

    #[test]
    fn functional_safe_mode_stable_notification_is_sent_once() {
        let fixture = Fixture::new();
        fixture.preset(safe_mode_state(1));

        let first = fixture.apply(HealthVerdict::SafeModeStable).expect("first");
        assert!(first.notified);
        assert_eq!(first.outcome, "safe_mode_notified");
        let second = fixture.apply(HealthVerdict::SafeModeStable).expect("second");
        assert!(!second.notified);
        assert_eq!(second.outcome, "notification_already_sent");

        let sent = fixture.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "4242");
        assert_eq!(sent[0].credential, "valid-2");
        assert_eq!(
            fixture.store.load().expect("load").last_notified_verdict,
            Some(HealthVerdict::SafeModeStable)
        );
    }

    #[test]
    fn regression_failed_notification_is_retried_next_cycle() {
        let fixture = Fixture::new();
        fixture.preset(safe_mode_state(1));
        let synthesizer = |_: &SynthesisRequest| -> Result<String> { Err(anyhow!("unused")) };
        let failing = |_: &Notification| -> Result<()> { Err(anyhow!("telegram 502")) };

        let report = fixture
            .apply_with(HealthVerdict::SafeModeStable, &synthesizer, &failing)
            .expect("cycle");
        assert_eq!(report.outcome, "notification_failed");
        assert!(!fixture
            .store
            .notification_marked(NotificationCategory::SafeMode)
            .expect("marker"));

        let retry = fixture.apply(HealthVerdict::SafeModeStable).expect("retry");
        assert_eq!(retry.outcome, "safe_mode_notified");
    }

    #[test]
    fn functional_healthy_after_safe_mode_restores_and_clears_markers() {
        let fixture = Fixture::new();
        fixture.preset(safe_mode_state(1));
        fixture
            .store
            .mark_notified(NotificationCategory::SafeMode)
            .expect("mark");

        let report = fixture.apply(HealthVerdict::Healthy).expect("restore");
        assert_eq!(report.action, RecoveryAction::Restore);
        assert_eq!(report.mode, RecoveryMode::Normal);
        assert_eq!(report.attempt_count, 0);
        assert_eq!(fixture.store.load().expect("load"), RecoveryState::default());
        for category in NotificationCategory::ALL {
            assert!(!fixture.store.notification_marked(category).expect("marker"));
        }
        assert!(fixture.sent.borrow().is_empty());
    }

    #[test]
    fn functional_health_target_follows_installed_config() {
        let fixture = Fixture::new();
        let oauth = OAuthProfileStore::empty();
        let discovery = CredentialDiscovery::new(&accept_valid_token, &accept_valid_key, &oauth);
        let synthesizer = |_: &SynthesisRequest| -> Result<String> { Err(anyhow!("unused")) };
        let notifier = |_: &Notification| -> Result<()> { Ok(()) };
        let orchestrator = RecoveryOrchestrator {
            habitat: &fixture.habitat,
            group: fixture.habitat.group("browser").expect("group"),
            store: &fixture.store,
            discovery: &discovery,
            synthesizer: &synthesizer,
            process: &fixture.process,
            notifier: &notifier,
            active_config_path: fixture.active_path(),
            max_attempts: 2,
        };

        assert!(!orchestrator.health_target(&safe_mode_state(1)).serving_safe_config);
        write(&fixture.active_path(), r#"{"agents":{"list":[{"id":"safe-mode"}]}}"#);
        let target = orchestrator.health_target(&safe_mode_state(1));
        assert!(target.serving_safe_config);
        assert_eq!(target.probe_agent_id.as_deref(), Some("safe-mode"));
        assert!(!orchestrator.health_target(&RecoveryState::default()).serving_safe_config);
    }

    #[test]
    fn unit_cycle_report_line_is_stable() {
        let report = CycleReport {
            group: "browser".to_string(),
            verdict: HealthVerdict::DegradedEnteringSafeMode,
            previous_mode: RecoveryMode::Normal,
            mode: RecoveryMode::SafeMode,
            attempt_count: 1,
            action: RecoveryAction::EnterSafeMode,
            outcome: "entered_safe_mode".to_string(),
            restart_confirmed: Some(false),
            notified: false,
        };
        assert_eq!(
            report.render_line(),
            "group=browser verdict=degraded_entering_safe_mode mode=normal->safe_mode attempts=1 action=enter_safe_mode outcome=entered_safe_mode restart_confirmed=false"
        );
    }
}
