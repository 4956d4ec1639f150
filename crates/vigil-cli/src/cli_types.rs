use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
/// How the current invocation was triggered.
pub enum CliRunMode {
    /// Timer-driven cycle; liveness is checked.
    Scheduled,
    /// Gateway post-start hook; liveness is assumed.
    PostStart,
}

impl CliRunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CliRunMode::Scheduled => "scheduled",
            CliRunMode::PostStart => "post-start",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The single operation one invocation performs.
pub enum CliAction {
    Supervise,
    Status,
    Reset,
    Discover,
}

impl CliAction {
    pub fn as_str(self) -> &'static str {
        match self {
            CliAction::Supervise => "supervise",
            CliAction::Status => "status",
            CliAction::Reset => "reset",
            CliAction::Discover => "discover",
        }
    }
}
