use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{info, warn};

use crate::command_runner::{run_with_timeout, CommandRun};
use crate::restart_primitive::RestartPrimitive;

pub const DEFAULT_RESTART_TIMEOUT_MS: u64 = 30_000;
const CONTAINER_STOP_GRACE_SECONDS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    Confirmed,
    /// The restart was issued but not confirmed; it is never re-issued in the same cycle.
    Unconfirmed { reason: String },
}

impl RestartOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, RestartOutcome::Confirmed)
    }
}

/// Process-manager operations for one group's gateway.
///
/// The recovery ladder only calls `restart` and `is_active`; `stop` and `start`
/// complete the manager surface for hosts that drive the gateway directly.
pub trait ProcessControl {
    fn primitive(&self) -> &RestartPrimitive;
    fn stop(&self) -> Result<()>;
    fn start(&self) -> Result<()>;
    fn restart(&self) -> Result<RestartOutcome>;
    fn is_active(&self) -> Result<bool>;
}

#[derive(Debug, Clone)]
/// Drives `systemctl` for service units and `docker` for containers.
pub struct CommandProcessControl {
    primitive: RestartPrimitive,
    timeout: Duration,
    systemctl_program: PathBuf,
    docker_program: PathBuf,
}

impl CommandProcessControl {
    pub fn new(primitive: RestartPrimitive, timeout_ms: u64) -> Self {
        Self {
            primitive,
            timeout: Duration::from_millis(timeout_ms.max(1)),
            systemctl_program: PathBuf::from("systemctl"),
            docker_program: PathBuf::from("docker"),
        }
    }

    pub fn with_programs(mut self, systemctl: impl Into<PathBuf>, docker: impl Into<PathBuf>) -> Self {
        self.systemctl_program = systemctl.into();
        self.docker_program = docker.into();
        self
    }

    fn invocation(&self, verb: &str) -> (PathBuf, Vec<String>) {
        match &self.primitive {
            RestartPrimitive::ServiceUnit { unit, user_scope } => {
                let mut args = Vec::new();
                if *user_scope {
                    args.push("--user".to_string());
                }
                args.push(verb.to_string());
                if verb == "is-active" {
                    args.push("--quiet".to_string());
                }
                args.push(unit.clone());
                (self.systemctl_program.clone(), args)
            }
            RestartPrimitive::Container { name } => {
                let args = match verb {
                    "is-active" => vec![
                        "inspect".to_string(),
                        "-f".to_string(),
                        "{{.State.Running}}".to_string(),
                        name.clone(),
                    ],
                    "stop" | "restart" => vec![
                        verb.to_string(),
                        "-t".to_string(),
                        CONTAINER_STOP_GRACE_SECONDS.to_string(),
                        name.clone(),
                    ],
                    _ => vec![verb.to_string(), name.clone()],
                };
                (self.docker_program.clone(), args)
            }
        }
    }

    fn run(&self, verb: &str) -> Result<CommandRun> {
        let (program, args) = self.invocation(verb);
        run_with_timeout(&program, &args, self.timeout)
    }

    fn run_required(&self, verb: &str) -> Result<()> {
        let run = self.run(verb)?;
        if run.timed_out() {
            bail!(
                "{verb} of {} timed out after {} ms",
                self.primitive,
                self.timeout.as_millis()
            );
        }
        if !run.succeeded() {
            bail!(
                "{verb} of {} failed with exit code {}: {}",
                self.primitive,
                run.exit_code().map_or_else(|| "signal".to_string(), |code| code.to_string()),
                run.stderr.trim()
            );
        }
        Ok(())
    }
}

impl ProcessControl for CommandProcessControl {
    fn primitive(&self) -> &RestartPrimitive {
        &self.primitive
    }

    fn stop(&self) -> Result<()> {
        self.run_required("stop")
    }

    fn start(&self) -> Result<()> {
        self.run_required("start")
    }

    fn restart(&self) -> Result<RestartOutcome> {
        let run = self.run("restart")?;
        if run.timed_out() {
            let reason = format!("restart timed out after {} ms", self.timeout.as_millis());
            warn!(target = %self.primitive, %reason, "restart not confirmed");
            return Ok(RestartOutcome::Unconfirmed { reason });
        }
        if !run.succeeded() {
            bail!(
                "restart of {} failed with exit code {}: {}",
                self.primitive,
                run.exit_code().map_or_else(|| "signal".to_string(), |code| code.to_string()),
                run.stderr.trim()
            );
        }
        match self.is_active() {
            Ok(true) => {
                info!(target = %self.primitive, "restart confirmed");
                Ok(RestartOutcome::Confirmed)
            }
            Ok(false) => Ok(RestartOutcome::Unconfirmed {
                reason: "not active after restart".to_string(),
            }),
            Err(error) => Ok(RestartOutcome::Unconfirmed {
                reason: format!("activity check failed: {error}"),
            }),
        }
    }

    fn is_active(&self) -> Result<bool> {
        let run = self.run("is-active")?;
        if run.timed_out() {
            return Ok(false);
        }
        Ok(match &self.primitive {
            RestartPrimitive::ServiceUnit { .. } => run.succeeded(),
            RestartPrimitive::Container { .. } => run.succeeded() && run.stdout.trim() == "true",
        })
    }
}
