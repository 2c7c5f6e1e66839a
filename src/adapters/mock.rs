//! In-memory package lister and test runner for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::domain::errors::{ListError, RunnerError};
use crate::domain::ports::{PackageLister, RunOutput, TestRunner};

/// Scripted outcome of one mock test invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    Pass { output: String },
    Fail { output: String, exit_code: i32 },
    /// The program cannot be started.
    LaunchError,
    /// Never completes; only a timeout ends it.
    Hang,
}

impl Default for MockOutcome {
    fn default() -> Self {
        Self::pass("ok\n")
    }
}

impl MockOutcome {
    pub fn pass(output: impl Into<String>) -> Self {
        Self::Pass {
            output: output.into(),
        }
    }

    pub fn fail(output: impl Into<String>, exit_code: i32) -> Self {
        Self::Fail {
            output: output.into(),
            exit_code,
        }
    }

    pub fn launch_error() -> Self {
        Self::LaunchError
    }
}

/// Per-package plan for the coverage run and the plain rerun.
#[derive(Debug, Clone, Default)]
struct Plan {
    coverage: Option<MockOutcome>,
    plain: Option<MockOutcome>,
    /// Profile text written to `-coverprofile=` on a passing coverage run.
    profile: Option<String>,
}

/// Mock test runner that records every call.
pub struct MockTestRunner {
    default_outcome: MockOutcome,
    plans: HashMap<String, Plan>,
    delay: Duration,
    calls: Arc<RwLock<Vec<(String, Vec<String>)>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTestRunner {
    pub fn new() -> Self {
        Self {
            default_outcome: MockOutcome::default(),
            plans: HashMap::new(),
            delay: Duration::ZERO,
            calls: Arc::new(RwLock::new(Vec::new())),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_default_outcome(mut self, outcome: MockOutcome) -> Self {
        self.default_outcome = outcome;
        self
    }

    /// Simulated run time of every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_coverage_outcome(mut self, package: &str, outcome: MockOutcome) -> Self {
        self.plans.entry(package.to_string()).or_default().coverage = Some(outcome);
        self
    }

    pub fn with_plain_outcome(mut self, package: &str, outcome: MockOutcome) -> Self {
        self.plans.entry(package.to_string()).or_default().plain = Some(outcome);
        self
    }

    /// Write `profile` to the requested coverprofile path when the coverage
    /// run for `package` passes.
    pub fn with_profile(mut self, package: &str, profile: impl Into<String>) -> Self {
        self.plans.entry(package.to_string()).or_default().profile = Some(profile.into());
        self
    }

    /// Recorded `(package, args)` pairs in call order.
    pub async fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.read().await.clone()
    }

    /// Highest number of calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn outcome_for(&self, package: &str, coverage_run: bool) -> (MockOutcome, Option<&str>) {
        let plan = self.plans.get(package);
        let outcome = plan
            .and_then(|p| if coverage_run { p.coverage.clone() } else { p.plain.clone() })
            .unwrap_or_else(|| self.default_outcome.clone());
        let profile = plan.and_then(|p| p.profile.as_deref()).filter(|_| coverage_run);
        (outcome, profile)
    }
}

impl Default for MockTestRunner {
    fn default() -> Self {
        Self::new()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TestRunner for MockTestRunner {
    async fn run(&self, package: &str, args: &[String]) -> Result<RunOutput, RunnerError> {
        self.calls
            .write()
            .await
            .push((package.to_string(), args.to_vec()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let profile_arg = args.iter().find_map(|a| a.strip_prefix("-coverprofile="));
        let (outcome, profile) = self.outcome_for(package, profile_arg.is_some());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match outcome {
            MockOutcome::Pass { output } => {
                if let (Some(path), Some(text)) = (profile_arg, profile) {
                    tokio::fs::write(path, text).await?;
                }
                Ok(RunOutput::passed(output))
            }
            MockOutcome::Fail { output, exit_code } => Ok(RunOutput::failed(output, exit_code)),
            MockOutcome::LaunchError => Err(RunnerError::Launch {
                program: "go".to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "mock launch failure"),
            }),
            MockOutcome::Hang => std::future::pending().await,
        }
    }
}

/// Package lister with a fixed answer.
#[derive(Debug, Clone, Default)]
pub struct StaticPackageLister {
    packages: Vec<String>,
    fail: bool,
}

impl StaticPackageLister {
    pub fn new<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            packages: packages.into_iter().map(Into::into).collect(),
            fail: false,
        }
    }

    /// A lister whose every selector fails to resolve.
    pub fn failing() -> Self {
        Self {
            packages: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl PackageLister for StaticPackageLister {
    async fn list(&self, selector: &str) -> Result<Vec<String>, ListError> {
        if self.fail {
            return Err(ListError::Unresolved {
                selector: selector.to_string(),
                output: "mock: no matching packages".to_string(),
            });
        }
        Ok(self.packages.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plans_split_coverage_and_plain_runs() {
        let runner = MockTestRunner::new()
            .with_coverage_outcome("p", MockOutcome::fail("cover\n", 1))
            .with_plain_outcome("p", MockOutcome::pass("plain\n"));

        let cover = runner
            .run("p", &["test".into(), "-coverprofile=/dev/null".into(), "p".into()])
            .await
            .unwrap();
        assert!(!cover.success);
        assert_eq!(cover.exit_code, Some(1));

        let plain = runner.run("p", &["test".into(), "p".into()]).await.unwrap();
        assert!(plain.success);
        assert_eq!(plain.output, "plain\n");
        assert_eq!(runner.calls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_passing_coverage_run_writes_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.coverprofile");
        let runner = MockTestRunner::new().with_profile("p", "mode: set\n");

        let arg = format!("-coverprofile={}", path.display());
        runner.run("p", &["test".into(), arg, "p".into()]).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "mode: set\n");
    }

    #[test]
    fn test_static_lister() {
        let lister = StaticPackageLister::new(["a", "b"]);
        assert_eq!(tokio_test::block_on(lister.list("./...")).unwrap(), vec!["a", "b"]);
        assert!(tokio_test::block_on(StaticPackageLister::failing().list("./...")).is_err());
    }
}
