mod bootstrap_helpers;
mod commands;
mod runtime;

use anyhow::Result;
use clap::Parser;
use vigil_cli::Cli;

use crate::bootstrap_helpers::init_tracing;
use crate::commands::run_cli;

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run_cli(cli)
}
