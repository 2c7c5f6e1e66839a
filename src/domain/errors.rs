//! Domain errors for the engulf coverage runner.

use thiserror::Error;

use crate::domain::models::profile::{Block, CoverMode};

/// Render a block set on one line per block for diagnostics.
fn format_blocks(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(|b| format!("    {b}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Domain-level errors that can occur in the engulf system.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Block end {end} precedes its start {start}")]
    InvertedRange { start: String, end: String },

    #[error("Invalid job state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

pub type DomainResult<T> = Result<T, DomainError>;

/// Errors raised by the interval merge engine.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Too many overlaps split a block, which means the two profiles
    /// instrument the file differently.
    #[error(
        "Merging {} and {} blocks took {splits} splitting merges; \
         profiles are not compatible\n  left:\n{}\n  right:\n{}",
        .left.len(),
        .right.len(),
        format_blocks(.left),
        format_blocks(.right)
    )]
    Explosion {
        left: Vec<Block>,
        right: Vec<Block>,
        splits: usize,
    },
}

/// Why one (mode, file) could not be merged.
#[derive(Debug, Error)]
#[error("{mode} profile for {file_name}: {source}")]
pub struct MergeFailure {
    pub file_name: String,
    pub mode: CoverMode,
    #[source]
    pub source: MergeError,
}

/// Failure of the external package lister.
#[derive(Debug, Error)]
pub enum ListError {
    #[error("Failed to launch package lister: {0}")]
    Launch(#[source] std::io::Error),

    #[error("Package selector '{selector}' could not be resolved:\n{output}")]
    Unresolved { selector: String, output: String },
}

/// Failure to run an external test command at all.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while collecting output: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-job failure recorded in a `JobResult`.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Could not create profile directory {path}: {source}")]
    OutputDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not run tests: {0}")]
    Launch(#[from] RunnerError),

    #[error("Tests failed{}", .exit_code.map(|c| format!(" (exit status {c})")).unwrap_or_default())]
    TestsFailed { exit_code: Option<i32> },

    #[error("Timed out after {timeout_secs}s")]
    TimedOut { timeout_secs: u64 },

    #[error("Worker crashed: {0}")]
    WorkerCrashed(String),
}

impl JobError {
    /// True for failures that say nothing about the tests themselves.
    pub fn is_harness_failure(&self) -> bool {
        !matches!(self, Self::TestsFailed { .. })
    }
}

/// Fatal errors that abort a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    PackageListing(#[from] ListError),

    #[error("Invalid {kind} pattern '{pattern}': {source}")]
    InvalidPattern {
        kind: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Packages '{first}' and '{second}' would both write {path}")]
    ProfilePathCollision {
        first: String,
        second: String,
        path: String,
    },

    #[error("Failed to write merged profiles to {dir}: {source}")]
    WriteMerged {
        dir: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write test output: {0}")]
    Output(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::profile::Position;

    #[test]
    fn test_explosion_message_lists_both_inputs() {
        let left = vec![Block::new(Position::new(1, 0), Position::new(2, 0), 1, 1).unwrap()];
        let right = vec![Block::new(Position::new(1, 5), Position::new(3, 0), 2, 0).unwrap()];
        let err = MergeError::Explosion {
            left,
            right,
            splits: 40,
        };
        let msg = err.to_string();
        assert!(msg.contains("took 40 splitting merges"));
        assert!(msg.contains("1.0,2.0 1 1"));
        assert!(msg.contains("1.5,3.0 2 0"));
    }

    #[test]
    fn test_tests_failed_message() {
        let err = JobError::TestsFailed { exit_code: Some(1) };
        assert_eq!(err.to_string(), "Tests failed (exit status 1)");
        assert!(!err.is_harness_failure());
        assert!(JobError::TimedOut { timeout_secs: 5 }.is_harness_failure());
    }
}
