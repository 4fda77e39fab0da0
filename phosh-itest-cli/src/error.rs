//! CLI-specific error types and exit code mapping

use phosh_itest_core::error::HarnessError;
use phosh_itest_session::{ScenarioError, SessionError};

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The nested session never became ready.
    #[error("startup failed: {0}")]
    Startup(String),

    /// The session ran but its teardown or logs were not acceptable.
    #[error("session failed: {0}")]
    SessionFailed(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from phosh-itest-core.
    #[error("{0}")]
    Core(#[from] HarnessError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                   |
    /// |------|-------------------------------------------|
    /// | 0    | Success                                   |
    /// | 1    | General / command error                   |
    /// | 2    | Configuration error                       |
    /// | 3    | Session did not start                     |
    /// | 4    | Abnormal exit or critical log lines       |
    /// | 10   | IO error                                  |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Startup(_) => 3,
            Self::SessionFailed(_) => 4,
            Self::Io(_) => 10,
            Self::Core(core) => match core {
                HarnessError::Config(_) => 2,
                HarnessError::CriticalLines { .. } | HarnessError::AbnormalExit(_) => 4,
                HarnessError::Io(_) => 10,
                HarnessError::Session(_) => 1,
            },
            Self::JsonSerialize(_) | Self::Command(_) => 1,
        }
    }
}

impl From<ScenarioError> for CliError {
    fn from(err: ScenarioError) -> Self {
        match err {
            ScenarioError::Setup(SessionError::Startup { .. }) => Self::Startup(err.to_string()),
            ScenarioError::Setup(SessionError::Config(e)) => Self::Config(e.to_string()),
            ScenarioError::Setup(SessionError::Io(e)) => Self::Io(e),
            ScenarioError::Setup(_) | ScenarioError::Body { .. } => Self::Command(err.to_string()),
            ScenarioError::AbnormalExit { .. } | ScenarioError::CriticalLines { .. } => {
                Self::SessionFailed(err.to_string())
            }
        }
    }
}
