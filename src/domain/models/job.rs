//! Job domain model.
//!
//! A job is one coverage-measured `go test` invocation for a single package.
//! Its state is driven solely by the scheduler.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult, JobError};
use crate::domain::models::profile::CoverMode;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Queued, not yet admitted
    #[default]
    Pending,
    /// Test process in flight
    Running,
    /// Coverage run exited zero
    Succeeded,
    /// Coverage run exited nonzero and was re-run without coverage
    FailedRetried,
    /// Harness-level failure (directory, launch or timeout)
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::FailedRetried => "failed_retried",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::FailedRetried | Self::Failed)
    }

    pub fn valid_transitions(&self) -> &'static [JobState] {
        match self {
            Self::Pending => &[Self::Running],
            Self::Running => &[Self::Succeeded, Self::FailedRetried, Self::Failed],
            Self::Succeeded | Self::FailedRetried | Self::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, new_state: Self) -> bool {
        self.valid_transitions().contains(&new_state)
    }
}

/// Outcome of the coverage-free rerun of a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryVerdict {
    /// Tests pass without instrumentation; the failure is tied to coverage.
    PassedWithoutCoverage,
    /// Tests fail without instrumentation too.
    FailedWithoutCoverage,
    /// The rerun could not be launched or timed out.
    Inconclusive,
}

/// Coverage flags shared by every job of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageSettings {
    /// Comma-joined packages whose coverage is recorded.
    pub cover_packages: String,
    pub mode: CoverMode,
}

/// One scheduled test-and-measure invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub package: String,
    pub output_path: PathBuf,
    pub coverage_args: Vec<String>,
    pub passthrough_args: Vec<String>,
    pub state: JobState,
}

impl Job {
    pub fn new(
        package: impl Into<String>,
        output_path: impl Into<PathBuf>,
        coverage: &CoverageSettings,
        passthrough_args: Vec<String>,
    ) -> Self {
        let output_path = output_path.into();
        let coverage_args = vec![
            format!("-coverprofile={}", output_path.display()),
            format!("-coverpkg={}", coverage.cover_packages),
            format!("-covermode={}", coverage.mode),
        ];
        Self {
            package: package.into(),
            output_path,
            coverage_args,
            passthrough_args,
            state: JobState::Pending,
        }
    }

    /// Path of the profile written for `package` under `dir`.
    ///
    /// Path separators in the package import path become dashes, so the
    /// file sits directly inside `dir`. The mapping is not injective:
    /// `a/b-c` and `a-b/c` share a file, and the run driver rejects such
    /// package sets before starting any job.
    pub fn profile_path(dir: &Path, package: &str) -> PathBuf {
        dir.join(format!("{}.coverprofile", package.replace('/', "-")))
    }

    /// Arguments for the measured run.
    pub fn coverage_command(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.coverage_args.len() + self.passthrough_args.len() + 2);
        args.push("test".to_string());
        args.extend(self.coverage_args.iter().cloned());
        args.extend(self.passthrough_args.iter().cloned());
        args.push(self.package.clone());
        args
    }

    /// Arguments for the diagnostic rerun with all coverage flags removed.
    pub fn plain_command(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.passthrough_args.len() + 2);
        args.push("test".to_string());
        args.extend(self.passthrough_args.iter().cloned());
        args.push(self.package.clone());
        args
    }

    pub fn transition_to(&mut self, new_state: JobState) -> DomainResult<()> {
        if !self.state.can_transition_to(new_state) {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.as_str().to_string(),
                to: new_state.as_str().to_string(),
            });
        }
        self.state = new_state;
        Ok(())
    }
}

/// What a worker reports for one job.
#[derive(Debug)]
pub struct JobResult {
    pub job: Job,
    /// Combined stdout and stderr of the authoritative run.
    pub output: String,
    pub error: Option<JobError>,
    pub retry: Option<RetryVerdict>,
    pub duration: Duration,
}

impl JobResult {
    pub fn package(&self) -> &str {
        &self.job.package
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
