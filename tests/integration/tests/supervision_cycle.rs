use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::Result;
use serde_json::{json, Value};
use tempfile::TempDir;
use vigil_credentials::{
    CredentialDiscovery, OAuthProfile, OAuthProfileStore, ProbeOutcome, ProviderAuthMethod,
};
use vigil_diagnostics::{read_ledger_file, DiagnosticsLedger};
use vigil_habitat::{Habitat, ParameterSet, Platform, Provider};
use vigil_health::{is_safe_mode_config, HealthMonitor};
use vigil_process::{ProcessControl, RestartOutcome, RestartPrimitive};
use vigil_recovery::{
    active_config_path, backup_config_path, CycleReport, Notification, RecoveryAction,
    RecoveryError, RecoveryOrchestrator, SynthesisRequest, DEFAULT_MAX_RECOVERY_ATTEMPTS,
};
use vigil_state::{FileStateStore, RecoveryMode, RecoveryState, RecoveryStateStore};

const NOW_UNIX: u64 = 1_700_000_000;

struct FakeProcess {
    primitive: RestartPrimitive,
    restarts: Cell<u32>,
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
        Ok(RestartOutcome::Confirmed)
    }

    fn is_active(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Two session-isolated groups on one host with scripted external services.
struct Host {
    temp: TempDir,
    habitat: Habitat,
    valid_secrets: RefCell<BTreeSet<String>>,
    processes: BTreeMap<String, FakeProcess>,
    oauth: OAuthProfileStore,
    synth_requests: RefCell<Vec<SynthesisRequest>>,
    sent: RefCell<Vec<Notification>>,
}

impl Host {
    fn new() -> Self {
        Self::with_oauth(OAuthProfileStore::empty())
    }

    fn with_oauth(oauth: OAuthProfileStore) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let habitat = Habitat::from_parameters(&ParameterSet::from_pairs([
            ("PLATFORM", "telegram"),
            ("ISOLATION_DEFAULT", "session"),
            ("AGENT_COUNT", "3"),
            ("AGENT1_NAME", "Scout"),
            ("AGENT1_MODEL", "anthropic/claude-opus-4"),
            ("AGENT1_BOT_TOKEN", "tg-scout"),
            ("AGENT1_ISOLATION_GROUP", "browser"),
            ("AGENT2_NAME", "Reader"),
            ("AGENT2_BOT_TOKEN", "tg-reader"),
            ("AGENT2_ISOLATION_GROUP", "browser"),
            ("AGENT3_NAME", "Archivist"),
            ("AGENT3_BOT_TOKEN", "tg-archivist"),
            ("AGENT3_ISOLATION_GROUP", "documents"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
            ("OPENAI_API_KEY", "sk-openai"),
            ("TELEGRAM_OWNER_ID", "4242"),
        ]))
        .expect("habitat");

        let processes = habitat
            .groups
            .iter()
            .map(|group| {
                (
                    group.id.clone(),
                    FakeProcess {
                        primitive: RestartPrimitive::for_group(group, "vigil-gateway", false),
                        restarts: Cell::new(0),
                    },
                )
            })
            .collect();

        let host = Self {
            temp,
            habitat,
            valid_secrets: RefCell::new(
                ["tg-scout", "tg-reader", "tg-archivist", "sk-ant", "sk-openai"]
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            ),
            processes,
            oauth,
            synth_requests: RefCell::new(Vec::new()),
            sent: RefCell::new(Vec::new()),
        };
        for group in &host.habitat.groups {
            let agents = group
                .agents
                .iter()
                .map(|agent| json!({"id": agent.id}))
                .collect::<Vec<_>>();
            write_file(
                &host.config_path(&group.id),
                &json!({"agents": {"list": agents}}).to_string(),
            );
        }
        host
    }

    fn revoke(&self, secret: &str) {
        self.valid_secrets.borrow_mut().remove(secret);
    }

    fn rotate_back(&self, secret: &str) {
        self.valid_secrets.borrow_mut().insert(secret.to_string());
    }

    fn probe(&self, secret: &str) -> ProbeOutcome {
        if self.valid_secrets.borrow().contains(secret) {
            ProbeOutcome::Valid
        } else {
            ProbeOutcome::invalid("unauthorized")
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.temp.path().join("state")
    }

    fn store(&self, group_id: &str) -> FileStateStore {
        FileStateStore::new(self.state_dir(), group_id).expect("store")
    }

    fn config_path(&self, group_id: &str) -> PathBuf {
        let group = self.habitat.group(group_id).expect("group");
        active_config_path(&self.temp.path().join("config"), group)
    }

    fn restarts(&self, group_id: &str) -> u32 {
        self.processes[group_id].restarts.get()
    }

    fn cycle(&self, group_id: &str) -> Result<CycleReport, RecoveryError> {
        let mut ledger = DiagnosticsLedger::in_memory();
        self.cycle_with_ledger(group_id, &mut ledger)
    }

    fn cycle_with_ledger(
        &self,
        group_id: &str,
        ledger: &mut DiagnosticsLedger,
    ) -> Result<CycleReport, RecoveryError> {
        let group = self.habitat.group(group_id).expect("group");
        let store = self.store(group_id);
        let process = &self.processes[group_id];

        let platform_validator = |_: Platform, token: &str| -> ProbeOutcome { self.probe(token) };
        let provider_validator = |_: Provider, key: &str| -> ProbeOutcome { self.probe(key) };
        let gateway = |_: u16, _: &str| -> ProbeOutcome { ProbeOutcome::Valid };
        let synthesizer = |request: &SynthesisRequest| -> Result<String> {
            self.synth_requests.borrow_mut().push(request.clone());
            Ok(safe_mode_document(request).to_string())
        };
        let notifier = |notification: &Notification| -> Result<()> {
            self.sent.borrow_mut().push(notification.clone());
            Ok(())
        };

        let discovery = CredentialDiscovery::new(&platform_validator, &provider_validator, &self.oauth)
            .with_now_unix(NOW_UNIX);
        let monitor = HealthMonitor::new(process, &platform_validator, &gateway);
        let orchestrator = RecoveryOrchestrator {
            habitat: &self.habitat,
            group,
            store: &store,
            discovery: &discovery,
            synthesizer: &synthesizer,
            process,
            notifier: &notifier,
            active_config_path: self.config_path(group_id),
            max_attempts: DEFAULT_MAX_RECOVERY_ATTEMPTS,
        };
        orchestrator.supervise(&monitor, ledger)
    }
}

fn safe_mode_document(request: &SynthesisRequest) -> Value {
    let env_key = match request.auth_method {
        ProviderAuthMethod::ApiKey => request.provider.api_key_env(),
        ProviderAuthMethod::OauthToken => request.provider.oauth_token_env(),
    };
    json!({
        "agents": {"list": [{"id": "safe-mode", "model": request.model}]},
        "channels": {
            request.platform.as_str(): {"accounts": {"safe-mode": {"botToken": request.bot_token}}}
        },
        "env": {env_key: request.provider_credential},
        "gateway": {"port": request.port}
    })
}

fn write_file(path: &Path, raw: &str) {
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, raw).expect("write");
}

fn snapshot_dir(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut files = BTreeMap::new();
    if !root.exists() {
        return files;
    }
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).expect("read dir") {
            let path = entry.expect("entry").path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let bytes = fs::read(&path).expect("read file");
                files.insert(path, bytes);
            }
        }
    }
    files
}

#[test]
fn integration_degraded_group_recovers_without_touching_sibling_group() {
    let host = Host::new();
    host.revoke("tg-scout");
    let documents_config = fs::read(host.config_path("documents")).expect("documents config");

    let report = host.cycle("browser").expect("browser cycle");
    assert_eq!(report.action, RecoveryAction::EnterSafeMode);
    assert_eq!(report.outcome, "entered_safe_mode");
    assert_eq!(report.mode, RecoveryMode::SafeMode);
    assert_eq!(host.restarts("browser"), 1);
    assert!(is_safe_mode_config(&host.config_path("browser")).expect("inspect browser"));

    assert_eq!(host.restarts("documents"), 0);
    assert_eq!(
        fs::read(host.config_path("documents")).expect("documents config"),
        documents_config
    );
    let state_files = snapshot_dir(&host.state_dir());
    assert!(state_files
        .keys()
        .all(|path| !path.to_string_lossy().contains("documents")));
    assert_eq!(host.store("documents").load().expect("load"), RecoveryState::default());

    let documents = host.cycle("documents").expect("documents cycle");
    assert_eq!(documents.action, RecoveryAction::None);
    assert_eq!(host.store("browser").load().expect("load").mode, RecoveryMode::SafeMode);
}

#[test]
fn integration_healthy_rerun_is_idempotent_and_silent() {
    let host = Host::new();

    for _ in 0..2 {
        let report = host.cycle("documents").expect("cycle");
        assert_eq!(report.outcome, "steady");
        assert_eq!(report.attempt_count, 0);
    }
    assert!(snapshot_dir(&host.state_dir()).is_empty());
    assert!(host.sent.borrow().is_empty());

    host.revoke("tg-scout");
    host.cycle("browser").expect("enter safe mode");
    let stable = host.cycle("browser").expect("safe mode stable");
    assert_eq!(stable.outcome, "safe_mode_notified");
    let repeat = host.cycle("browser").expect("safe mode stable again");
    assert_eq!(repeat.outcome, "notification_already_sent");
    assert_eq!(host.sent.borrow().len(), 1);
    assert_eq!(host.sent.borrow()[0].recipient, "4242");

    host.rotate_back("tg-scout");
    let active = host.config_path("browser");
    fs::copy(backup_config_path(&active), &active).expect("operator restores config");
    let restored = host.cycle("browser").expect("restore");
    assert_eq!(restored.outcome, "restored");
    assert_eq!(restored.mode, RecoveryMode::Normal);

    let before = snapshot_dir(&host.state_dir());
    let rerun = host.cycle("browser").expect("healthy rerun");
    assert_eq!(rerun.action, RecoveryAction::None);
    assert_eq!(snapshot_dir(&host.state_dir()), before);
    assert_eq!(host.sent.borrow().len(), 1);
}

#[test]
fn integration_exhausted_attempts_escalate_without_synthesis_or_restart() {
    let host = Host::new();
    host.revoke("tg-scout");
    host.store("browser")
        .save(&RecoveryState {
            attempt_count: DEFAULT_MAX_RECOVERY_ATTEMPTS,
            ..RecoveryState::default()
        })
        .expect("preset attempts");

    let report = host.cycle("browser").expect("escalate");
    assert_eq!(report.action, RecoveryAction::Escalate);
    assert_eq!(report.mode, RecoveryMode::Critical);
    assert_eq!(report.outcome, "critical_alerted");
    assert!(host.synth_requests.borrow().is_empty());
    assert_eq!(host.restarts("browser"), 0);

    let again = host.cycle("browser").expect("still critical");
    assert_eq!(again.mode, RecoveryMode::Critical);
    assert_eq!(again.outcome, "notification_already_sent");
    assert_eq!(host.sent.borrow().len(), 1);
    assert!(host.sent.borrow()[0].message.contains("browser"));
}

#[test]
fn integration_repeated_discovery_failures_exhaust_attempts_then_go_critical() {
    let host = Host::new();
    host.revoke("tg-scout");
    host.revoke("tg-reader");

    let first = host.cycle("browser").expect("first attempt");
    assert_eq!(first.outcome, "no_working_credential");
    assert_eq!((first.mode, first.attempt_count), (RecoveryMode::Normal, 1));
    let second = host.cycle("browser").expect("second attempt");
    assert_eq!((second.mode, second.attempt_count), (RecoveryMode::Normal, 2));

    let third = host.cycle("browser").expect("exhausted");
    assert_eq!(third.action, RecoveryAction::Escalate);
    assert_eq!(third.mode, RecoveryMode::Critical);
    assert_eq!(third.outcome, "notification_skipped");
    assert!(host.synth_requests.borrow().is_empty());
    assert_eq!(host.restarts("browser"), 0);
    assert!(!is_safe_mode_config(&host.config_path("browser")).expect("inspect"));
}

#[test]
fn integration_oauth_profile_outranks_api_key_in_synthesized_config() {
    let oauth = OAuthProfileStore::empty().with_profile(
        "anthropic-main",
        OAuthProfile {
            provider: Provider::Anthropic,
            access_token: "oauth-access".to_string(),
            refresh_token: None,
            expires_unix: Some(NOW_UNIX + 3_600),
            revoked: false,
        },
    );
    let host = Host::with_oauth(oauth);
    host.revoke("tg-scout");

    host.cycle("browser").expect("enter safe mode");
    let requests = host.synth_requests.borrow();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].provider, Provider::Anthropic);
    assert_eq!(requests[0].auth_method, ProviderAuthMethod::OauthToken);
    assert_eq!(requests[0].provider_credential, "oauth-access");
    assert_eq!(requests[0].model, "anthropic/claude-opus-4");

    let installed: Value = serde_json::from_str(
        &fs::read_to_string(host.config_path("browser")).expect("installed config"),
    )
    .expect("json");
    assert_eq!(installed["env"]["ANTHROPIC_OAUTH_TOKEN"], "oauth-access");
    assert!(installed["env"].get("ANTHROPIC_API_KEY").is_none());
}

#[test]
fn integration_ledger_file_lists_attempts_in_declaration_order() {
    let host = Host::new();
    host.revoke("tg-scout");
    host.revoke("sk-ant");
    let ledger_path = host.state_dir().join("diagnostics-browser.log");
    let mut ledger = DiagnosticsLedger::create(&ledger_path).expect("ledger");

    let report = host
        .cycle_with_ledger("browser", &mut ledger)
        .expect("enter safe mode");
    assert_eq!(report.outcome, "entered_safe_mode");

    let lines = read_ledger_file(&ledger_path)
        .expect("read ledger")
        .iter()
        .map(|record| record.render_line())
        .collect::<Vec<_>>();
    assert_eq!(
        lines,
        vec![
            "network:liveness:✅:service_unit:vigil-gateway-browser.service active",
            "platform:telegram/agent1:❌:unauthorized",
            "platform:telegram/agent2:✅:token valid",
            "platform:telegram/agent1:❌:unauthorized",
            "platform:telegram/agent2:✅:token valid",
            "platform:selection:✅:telegram/agent2",
            "provider:anthropic:❌:unauthorized",
            "provider:openai:✅:key valid",
            "provider:selection:✅:openai",
        ]
    );
    assert_eq!(host.synth_requests.borrow()[0].model, "openai/gpt-4o-mini");
}
