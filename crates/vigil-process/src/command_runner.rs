use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use wait_timeout::ChildExt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRun {
    /// `None` when the command was killed at the timeout.
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandRun {
    pub fn timed_out(&self) -> bool {
        self.status.is_none()
    }

    pub fn succeeded(&self) -> bool {
        self.status.is_some_and(|status| status.success())
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|status| status.code())
    }
}

/// Runs `program` once, killing it when `timeout` elapses.
///
/// Both pipes are drained on reader threads while waiting, so a chatty child
/// cannot stall on a full pipe buffer. Output is discarded on timeout.
pub fn run_with_timeout(program: &Path, args: &[String], timeout: Duration) -> Result<CommandRun> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn {}", program.display()))?;

    let stdout_reader = drain_pipe(child.stdout.take());
    let stderr_reader = drain_pipe(child.stderr.take());

    let status = match child
        .wait_timeout(timeout)
        .with_context(|| format!("failed while waiting for {}", program.display()))?
    {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            // Grandchildren may still hold the pipes open; the readers are left to finish on their own.
            return Ok(CommandRun {
                status: None,
                stdout: String::new(),
                stderr: String::new(),
            });
        }
    };

    Ok(CommandRun {
        status: Some(status),
        stdout: collect_pipe(stdout_reader),
        stderr: collect_pipe(stderr_reader),
    })
}

/// Reads `pipe` to its end on a background thread.
pub fn drain_pipe<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buffer);
        }
        buffer
    })
}

pub fn collect_pipe(reader: JoinHandle<Vec<u8>>) -> String {
    let bytes = reader.join().unwrap_or_default();
    String::from_utf8_lossy(&bytes).to_string()
}
