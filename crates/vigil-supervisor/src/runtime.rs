use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use vigil_cli::{Cli, CliRunMode};
use vigil_credentials::{
    load_oauth_profiles, CredentialDiscovery, HttpCredentialValidator, OAuthProfileStore,
    ValidatorEndpoints,
};
use vigil_diagnostics::DiagnosticsLedger;
use vigil_habitat::{Habitat, IsolationGroup, ParameterSet};
use vigil_health::{HealthMonitor, HttpGatewayProbe, RunMode};
use vigil_process::{CommandProcessControl, RestartPrimitive};
use vigil_recovery::{
    active_config_path, CommandConfigSynthesizer, CycleReport, HttpNotifier, RecoveryError,
    RecoveryOrchestrator,
};
use vigil_state::FileStateStore;

pub(crate) fn ledger_path_for(cli: &Cli) -> PathBuf {
    cli.ledger_path
        .clone()
        .unwrap_or_else(|| cli.state_dir.join(format!("diagnostics-{}.log", cli.group)))
}

pub(crate) fn endpoints_from_cli(cli: &Cli) -> ValidatorEndpoints {
    ValidatorEndpoints {
        telegram_api_base: cli.telegram_api_base.clone(),
        discord_api_base: cli.discord_api_base.clone(),
        anthropic_api_base: cli.anthropic_api_base.clone(),
        openai_api_base: cli.openai_api_base.clone(),
        google_api_base: cli.google_api_base.clone(),
    }
}

fn run_mode_from_cli(mode: CliRunMode) -> RunMode {
    match mode {
        CliRunMode::Scheduled => RunMode::Scheduled,
        CliRunMode::PostStart => RunMode::PostStart,
    }
}

pub(crate) fn load_habitat(path: &Path) -> Result<Habitat> {
    let params = ParameterSet::load(path)?;
    Habitat::from_parameters(&params)
        .with_context(|| format!("failed to resolve habitat from {}", path.display()))
}

/// Owned collaborators for one group's supervision run.
pub(crate) struct SupervisorRuntime {
    habitat: Habitat,
    group_id: String,
    store: FileStateStore,
    validator: HttpCredentialValidator,
    oauth_profiles: OAuthProfileStore,
    process: CommandProcessControl,
    probe: HttpGatewayProbe,
    synthesizer: CommandConfigSynthesizer,
    notifier: HttpNotifier,
    active_config_path: PathBuf,
    ledger_path: PathBuf,
    max_attempts: u32,
    run_mode: RunMode,
}

impl SupervisorRuntime {
    pub(crate) fn from_cli(cli: &Cli) -> Result<Self> {
        let habitat = load_habitat(&cli.habitat_params)?;
        let group = habitat
            .group(&cli.group)
            .with_context(|| format!("isolation group '{}' is not defined by the habitat", cli.group))?;
        let primitive = RestartPrimitive::for_group(group, &cli.unit_base, cli.systemd_user);
        let active_config_path = active_config_path(&cli.config_root, group);

        let oauth_profiles = match cli.oauth_profiles.as_deref() {
            Some(path) => load_oauth_profiles(path)?,
            None => OAuthProfileStore::empty(),
        };
        let endpoints = endpoints_from_cli(cli);

        Ok(Self {
            store: FileStateStore::new(&cli.state_dir, &cli.group)?,
            validator: HttpCredentialValidator::new(endpoints.clone(), cli.probe_timeout_ms)?,
            oauth_profiles,
            process: CommandProcessControl::new(primitive, cli.restart_timeout_ms),
            probe: HttpGatewayProbe::new(cli.probe_timeout_ms, habitat.gateway_token.clone())?,
            synthesizer: CommandConfigSynthesizer::new(&cli.synthesizer, cli.synthesizer_timeout_ms),
            notifier: HttpNotifier::new(&endpoints)?,
            active_config_path,
            ledger_path: ledger_path_for(cli),
            max_attempts: cli.max_recovery_attempts,
            run_mode: run_mode_from_cli(cli.run_mode),
            group_id: cli.group.clone(),
            habitat,
        })
    }

    pub(crate) fn group(&self) -> Result<&IsolationGroup> {
        self.habitat
            .group(&self.group_id)
            .with_context(|| format!("isolation group '{}' is not defined by the habitat", self.group_id))
    }

    pub(crate) fn habitat(&self) -> &Habitat {
        &self.habitat
    }

    pub(crate) fn open_ledger(&self) -> Result<DiagnosticsLedger> {
        DiagnosticsLedger::create(&self.ledger_path)
    }

    pub(crate) fn discovery(&self) -> CredentialDiscovery<'_> {
        CredentialDiscovery::new(&self.validator, &self.validator, &self.oauth_profiles)
    }

    /// One full monitor-then-recover cycle.
    pub(crate) fn supervise(
        &self,
        ledger: &mut DiagnosticsLedger,
    ) -> Result<std::result::Result<CycleReport, RecoveryError>> {
        let group = self.group()?;
        let discovery = self.discovery();
        let monitor = HealthMonitor::new(&self.process, &self.validator, &self.probe)
            .with_run_mode(self.run_mode);
        let orchestrator = RecoveryOrchestrator {
            habitat: &self.habitat,
            group,
            store: &self.store,
            discovery: &discovery,
            synthesizer: &self.synthesizer,
            process: &self.process,
            notifier: &self.notifier,
            active_config_path: self.active_config_path.clone(),
            max_attempts: self.max_attempts,
        };
        Ok(orchestrator.supervise(&monitor, ledger))
    }
}
