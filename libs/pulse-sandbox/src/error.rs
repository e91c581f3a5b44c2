use pulse_common::types::{ExecutionStatus, UnknownLanguage};
use std::time::Duration;
use thiserror::Error;

/// Terminal failure of one pipeline stage. The first one hit ends the execution.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("image build failed: {0}")]
    Build(String),

    #[error("container run failed: {0}")]
    Run(String),

    #[error("execution exceeded the {}s deadline", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("could not parse program output: {0}")]
    OutputParse(String),
}

impl SandboxError {
    pub fn status(&self) -> ExecutionStatus {
        match self {
            SandboxError::UnsupportedLanguage(_) => ExecutionStatus::UnsupportedLanguage,
            SandboxError::Build(_) => ExecutionStatus::BuildError,
            SandboxError::Run(_) => ExecutionStatus::RunError,
            SandboxError::Timeout(_) => ExecutionStatus::Timeout,
            SandboxError::OutputParse(_) => ExecutionStatus::OutputParseError,
        }
    }
}

impl From<UnknownLanguage> for SandboxError {
    fn from(err: UnknownLanguage) -> Self {
        SandboxError::UnsupportedLanguage(err.0)
    }
}

/// Failure reported by the container runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Docker(#[from] bollard::errors::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Daemon(String),
}

/// A teardown step that did not succeed. Logged, never returned to the caller.
#[derive(Debug, Error)]
#[error("failed to remove {kind} {target}: {reason}")]
pub struct CleanupError {
    pub kind: &'static str,
    pub target: String,
    pub reason: String,
}
