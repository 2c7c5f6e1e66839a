//! Test runner port - executes one external test command.

use async_trait::async_trait;

use crate::domain::errors::RunnerError;

/// Captured result of a finished test process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    /// Combined stdout and stderr.
    pub output: String,
    /// True when the process exited with status zero.
    pub success: bool,
    /// Exit status, if the process exited normally.
    pub exit_code: Option<i32>,
}

impl RunOutput {
    pub fn passed(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
            exit_code: Some(0),
        }
    }

    pub fn failed(output: impl Into<String>, exit_code: i32) -> Self {
        Self {
            output: output.into(),
            success: false,
            exit_code: Some(exit_code),
        }
    }
}

/// Runs the toolchain's test command for one package.
///
/// `Ok` means the process ran to completion, whatever its exit status;
/// `Err` means it could not be run at all. Dropping the returned future
/// must terminate the child process.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(&self, package: &str, args: &[String]) -> Result<RunOutput, RunnerError>;
}
