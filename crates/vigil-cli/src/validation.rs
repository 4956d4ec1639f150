use anyhow::{Context, Result};
use vigil_habitat::validate_group_id;

use crate::{Cli, CliAction};

pub fn resolve_cli_action(cli: &Cli) -> CliAction {
    if cli.status {
        CliAction::Status
    } else if cli.reset {
        CliAction::Reset
    } else if cli.discover {
        CliAction::Discover
    } else {
        CliAction::Supervise
    }
}

/// Checks flag values clap cannot express on its own.
pub fn validate_cli(cli: &Cli) -> Result<()> {
    validate_group_id(&cli.group).context("invalid --group")?;
    if cli.unit_base.trim().is_empty() {
        anyhow::bail!("--unit-base cannot be empty");
    }
    if cli.synthesizer.as_os_str().is_empty() {
        anyhow::bail!("--synthesizer cannot be empty");
    }
    Ok(())
}
