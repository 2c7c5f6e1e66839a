//! Common test utilities for integration tests
//!
//! Provides shared fixtures and helpers used across multiple integration
//! test files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use engulf::adapters::mock::{MockTestRunner, StaticPackageLister};
use engulf::{CoverMode, RunConfig, RunDriver};
use tempfile::TempDir;

/// Create a temporary directory for test isolation
///
/// Returns a TempDir that will be cleaned up when dropped.
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Run configuration writing into `dir` with small, test-friendly limits.
#[allow(dead_code)]
pub fn run_config(dir: &Path) -> RunConfig {
    RunConfig {
        selector: "./...".to_string(),
        coverdir: dir.to_path_buf(),
        covermode: CoverMode::Count,
        cover_packages: None,
        passthrough_args: vec![],
        max_jobs: 2,
        job_timeout: Some(Duration::from_secs(5)),
        exclude: vec!["vendor/".to_string()],
        exclude_files: vec![],
        merge_base: Some("all".to_string()),
        only_merge: false,
    }
}

/// Driver over mock adapters.
#[allow(dead_code)]
pub fn mock_driver(config: RunConfig, packages: &[&str], runner: Arc<MockTestRunner>) -> RunDriver {
    RunDriver::new(
        config,
        Arc::new(StaticPackageLister::new(packages.iter().copied())),
        runner,
    )
    .expect("valid run config")
}

/// Write a per-package profile the way the toolchain would have.
#[allow(dead_code)]
pub fn write_profile(dir: &Path, package: &str, text: &str) -> PathBuf {
    let path = engulf::Job::profile_path(dir, package);
    std::fs::write(&path, text).expect("Failed to write profile");
    path
}
