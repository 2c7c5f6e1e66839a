//! Job scheduler for concurrent per-package coverage runs.
//!
//! Jobs flow through a bounded queue to a dispatcher that admits at most
//! `max_jobs` of them at once through a semaphore. Each admitted job runs in
//! its own task and reports on a shared results channel; results come back in
//! completion order with the package carried inside each `JobResult`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::domain::errors::JobError;
use crate::domain::models::job::{Job, JobResult, JobState, RetryVerdict};
use crate::domain::ports::{RunOutput, TestRunner};

/// Configuration for the job scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of jobs in flight.
    pub max_jobs: usize,
    /// Wall-clock limit for each test process; `None` waits forever.
    pub job_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_jobs: 3,
            job_timeout: Some(Duration::from_secs(600)),
        }
    }
}

/// Event emitted while jobs run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// A job was admitted and its coverage run launched.
    JobStarted { package: String },
    /// A job reached a terminal state.
    JobFinished {
        package: String,
        state: JobState,
        duration: Duration,
    },
}

/// Runs coverage jobs under a fixed concurrency bound.
pub struct JobScheduler {
    runner: Arc<dyn TestRunner>,
    config: SchedulerConfig,
}

impl JobScheduler {
    pub fn new(runner: Arc<dyn TestRunner>, config: SchedulerConfig) -> Self {
        Self { runner, config }
    }

    /// Run every job and return exactly one result per job.
    pub async fn run(&self, jobs: Vec<Job>) -> Vec<JobResult> {
        self.run_with_events(jobs, None).await
    }

    /// Run every job, streaming progress events to `events`.
    pub async fn run_with_events(
        &self,
        jobs: Vec<Job>,
        events: Option<mpsc::Sender<SchedulerEvent>>,
    ) -> Vec<JobResult> {
        self.run_streaming(jobs, events, |_| {}).await
    }

    /// Run every job, handing each result to `on_result` as it completes.
    pub async fn run_streaming<F>(
        &self,
        jobs: Vec<Job>,
        events: Option<mpsc::Sender<SchedulerEvent>>,
        mut on_result: F,
    ) -> Vec<JobResult>
    where
        F: FnMut(&JobResult),
    {
        let total = jobs.len();
        if total == 0 {
            return Vec::new();
        }

        let capacity = self.config.max_jobs.max(1);
        let (job_tx, mut job_rx) = mpsc::channel::<Job>(capacity);
        let (result_tx, mut result_rx) = mpsc::channel::<JobResult>(capacity);

        info!(jobs = total, max_jobs = capacity, "scheduling coverage jobs");

        let generator = tokio::spawn(async move {
            for job in jobs {
                if job_tx.send(job).await.is_err() {
                    break;
                }
            }
        });

        let semaphore = Arc::new(Semaphore::new(capacity));
        let runner = Arc::clone(&self.runner);
        let timeout = self.config.job_timeout;

        let dispatcher = tokio::spawn(async move {
            while let Some(job) = job_rx.recv().await {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };

                let runner = Arc::clone(&runner);
                let result_tx = result_tx.clone();
                let events = events.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    let result = supervise_job(job, runner, timeout, events).await;
                    let _ = result_tx.send(result).await;
                });
            }
        });

        let mut results = Vec::with_capacity(total);
        while results.len() < total {
            match result_rx.recv().await {
                Some(result) => {
                    on_result(&result);
                    results.push(result);
                }
                None => break,
            }
        }

        let _ = generator.await;
        let _ = dispatcher.await;

        if results.len() < total {
            warn!(
                expected = total,
                received = results.len(),
                "result channel closed before every job reported"
            );
        }

        results
    }
}

/// Run one job in its own task so a panic still yields a result.
async fn supervise_job(
    job: Job,
    runner: Arc<dyn TestRunner>,
    timeout: Option<Duration>,
    events: Option<mpsc::Sender<SchedulerEvent>>,
) -> JobResult {
    let started = Instant::now();
    let mut fallback = job.clone();

    match tokio::spawn(execute_job(job, runner, timeout, events.clone())).await {
        Ok(result) => result,
        Err(join_err) => {
            warn!(package = %fallback.package, error = %join_err, "job worker crashed");
            fallback.state = JobState::Failed;
            let result = JobResult {
                job: fallback,
                output: String::new(),
                error: Some(JobError::WorkerCrashed(join_err.to_string())),
                retry: None,
                duration: started.elapsed(),
            };
            emit_finished(events.as_ref(), &result).await;
            result
        }
    }
}

/// Move `job` to `state`, logging a rejected transition and leaving the state as is.
fn advance(job: &mut Job, state: JobState) {
    if let Err(e) = job.transition_to(state) {
        error!(package = %job.package, error = %e, "job state transition rejected");
    }
}

/// Execute one job: measured run, then a plain rerun if the tests failed.
async fn execute_job(
    mut job: Job,
    runner: Arc<dyn TestRunner>,
    timeout: Option<Duration>,
    events: Option<mpsc::Sender<SchedulerEvent>>,
) -> JobResult {
    let started = Instant::now();
    advance(&mut job, JobState::Running);

    if let Some(tx) = &events {
        let _ = tx
            .send(SchedulerEvent::JobStarted {
                package: job.package.clone(),
            })
            .await;
    }

    let outcome = classify(&job, runner.as_ref(), timeout).await;

    advance(&mut job, outcome.state);
    let result = JobResult {
        job,
        output: outcome.output,
        error: outcome.error,
        retry: outcome.retry,
        duration: started.elapsed(),
    };

    info!(
        package = %result.job.package,
        state = result.job.state.as_str(),
        elapsed_ms = u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
        "job finished"
    );
    emit_finished(events.as_ref(), &result).await;
    result
}

struct Outcome {
    state: JobState,
    output: String,
    error: Option<JobError>,
    retry: Option<RetryVerdict>,
}

async fn classify(job: &Job, runner: &dyn TestRunner, timeout: Option<Duration>) -> Outcome {
    if let Some(dir) = job.output_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Err(source) = tokio::fs::create_dir_all(dir).await {
            return Outcome {
                state: JobState::Failed,
                output: String::new(),
                error: Some(JobError::OutputDir {
                    path: dir.display().to_string(),
                    source,
                }),
                retry: None,
            };
        }
    }

    let coverage_args = job.coverage_command();
    debug!(package = %job.package, args = ?coverage_args, "starting coverage run");

    let measured = match run_bounded(runner, &job.package, &coverage_args, timeout).await {
        Ok(measured) => measured,
        Err(error) => {
            return Outcome {
                state: JobState::Failed,
                output: String::new(),
                error: Some(error),
                retry: None,
            };
        }
    };

    if measured.success {
        return Outcome {
            state: JobState::Succeeded,
            output: measured.output,
            error: None,
            retry: None,
        };
    }

    let plain_args = job.plain_command();
    debug!(package = %job.package, args = ?plain_args, "coverage run failed, rerunning without coverage");

    let (output, error, verdict) = match run_bounded(runner, &job.package, &plain_args, timeout).await {
        // Tests pass uninstrumented: the coverage-run failure stays authoritative.
        Ok(plain) if plain.success => (
            measured.output,
            JobError::TestsFailed {
                exit_code: measured.exit_code,
            },
            RetryVerdict::PassedWithoutCoverage,
        ),
        Ok(plain) => (
            plain.output,
            JobError::TestsFailed {
                exit_code: plain.exit_code,
            },
            RetryVerdict::FailedWithoutCoverage,
        ),
        Err(error) => (measured.output, error, RetryVerdict::Inconclusive),
    };

    Outcome {
        state: JobState::FailedRetried,
        output,
        error: Some(error),
        retry: Some(verdict),
    }
}

async fn run_bounded(
    runner: &dyn TestRunner,
    package: &str,
    args: &[String],
    timeout: Option<Duration>,
) -> Result<RunOutput, JobError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, runner.run(package, args))
            .await
            .map_err(|_| JobError::TimedOut {
                timeout_secs: limit.as_secs(),
            })?
            .map_err(JobError::from),
        None => runner.run(package, args).await.map_err(JobError::from),
    }
}

async fn emit_finished(events: Option<&mpsc::Sender<SchedulerEvent>>, result: &JobResult) {
    if let Some(tx) = events {
        let _ = tx
            .send(SchedulerEvent::JobFinished {
                package: result.job.package.clone(),
                state: result.job.state,
                duration: result.duration,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockOutcome, MockTestRunner};
    use crate::domain::models::job::CoverageSettings;
    use crate::domain::models::profile::CoverMode;
    use std::collections::HashSet;

    fn jobs(dir: &std::path::Path, packages: &[&str]) -> Vec<Job> {
        let settings = CoverageSettings {
            cover_packages: packages.join(","),
            mode: CoverMode::Count,
        };
        packages
            .iter()
            .map(|p| Job::new(*p, Job::profile_path(dir, p), &settings, vec![]))
            .collect()
    }

    fn scheduler(runner: Arc<MockTestRunner>, max_jobs: usize) -> JobScheduler {
        JobScheduler::new(
            runner,
            SchedulerConfig {
                max_jobs,
                job_timeout: Some(Duration::from_secs(5)),
            },
        )
    }

    #[test]
    fn test_advance_keeps_state_on_rejected_transition() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = jobs(dir.path(), &["p/a"]).remove(0);

        advance(&mut job, JobState::Succeeded);
        assert_eq!(job.state, JobState::Pending);

        advance(&mut job, JobState::Running);
        advance(&mut job, JobState::Succeeded);
        assert_eq!(job.state, JobState::Succeeded);

        advance(&mut job, JobState::Running);
        assert_eq!(job.state, JobState::Succeeded);
    }

    #[tokio::test]
    async fn test_empty_job_list() {
        let runner = Arc::new(MockTestRunner::new());
        let results = scheduler(runner, 2).run(vec![]).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_bounded_concurrency_delivers_every_result() {
        let dir = tempfile::tempdir().unwrap();
        let packages = ["p/a", "p/b", "p/c", "p/d", "p/e"];
        let runner = Arc::new(MockTestRunner::new().with_delay(Duration::from_millis(20)));

        let results = scheduler(Arc::clone(&runner), 2)
            .run(jobs(dir.path(), &packages))
            .await;

        assert_eq!(results.len(), 5);
        let seen: HashSet<_> = results.iter().map(|r| r.package().to_string()).collect();
        assert_eq!(seen, packages.iter().map(ToString::to_string).collect());
        assert!(runner.max_in_flight() <= 2);
        assert!(runner.max_in_flight() >= 1);
        assert!(results.iter().all(|r| r.job.state == JobState::Succeeded));
    }

    #[tokio::test]
    async fn test_failed_coverage_run_is_retried_once() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(
            MockTestRunner::new()
                .with_coverage_outcome("p/flaky", MockOutcome::fail("--- FAIL: TestCover\n", 1))
                .with_plain_outcome("p/flaky", MockOutcome::pass("ok p/flaky\n")),
        );

        let results = scheduler(Arc::clone(&runner), 2)
            .run(jobs(dir.path(), &["p/flaky"]))
            .await;
        let result = &results[0];

        assert_eq!(result.job.state, JobState::FailedRetried);
        assert_eq!(result.retry, Some(RetryVerdict::PassedWithoutCoverage));
        assert_eq!(result.output, "--- FAIL: TestCover\n");
        assert!(matches!(
            result.error,
            Some(JobError::TestsFailed { exit_code: Some(1) })
        ));

        let calls = runner.calls().await;
        assert_eq!(calls.len(), 2);
        assert!(calls[0].1.iter().any(|a| a.starts_with("-coverprofile=")));
        assert!(calls[1].1.iter().all(|a| !a.starts_with("-cover")));
    }

    #[tokio::test]
    async fn test_failing_retry_supersedes_original() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(
            MockTestRunner::new()
                .with_coverage_outcome("p/broken", MockOutcome::fail("cover output\n", 1))
                .with_plain_outcome("p/broken", MockOutcome::fail("plain output\n", 2)),
        );

        let results = scheduler(runner, 1).run(jobs(dir.path(), &["p/broken"])).await;

        assert_eq!(results[0].output, "plain output\n");
        assert_eq!(results[0].retry, Some(RetryVerdict::FailedWithoutCoverage));
        assert!(matches!(
            results[0].error,
            Some(JobError::TestsFailed { exit_code: Some(2) })
        ));
    }

    #[tokio::test]
    async fn test_launch_failure_is_not_retried_and_spares_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(
            MockTestRunner::new().with_coverage_outcome("p/missing", MockOutcome::launch_error()),
        );

        let results = scheduler(Arc::clone(&runner), 2)
            .run(jobs(dir.path(), &["p/missing", "p/fine"]))
            .await;

        assert_eq!(results.len(), 2);
        let missing = results.iter().find(|r| r.package() == "p/missing").unwrap();
        assert_eq!(missing.job.state, JobState::Failed);
        assert!(matches!(missing.error, Some(JobError::Launch(_))));
        assert!(missing.retry.is_none());

        let fine = results.iter().find(|r| r.package() == "p/fine").unwrap();
        assert!(fine.is_success());
        assert_eq!(runner.calls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_hung_job_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(MockTestRunner::new().with_coverage_outcome("p/hang", MockOutcome::Hang));
        let scheduler = JobScheduler::new(
            runner,
            SchedulerConfig {
                max_jobs: 2,
                job_timeout: Some(Duration::from_millis(50)),
            },
        );

        let results = scheduler.run(jobs(dir.path(), &["p/hang", "p/ok"])).await;
        let hung = results.iter().find(|r| r.package() == "p/hang").unwrap();
        assert_eq!(hung.job.state, JobState::Failed);
        assert!(matches!(hung.error, Some(JobError::TimedOut { .. })));
        assert!(results.iter().any(|r| r.package() == "p/ok" && r.is_success()));
    }

    #[tokio::test]
    async fn test_output_dir_failure_is_reported_per_job() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let runner = Arc::new(MockTestRunner::new());
        let results = scheduler(Arc::clone(&runner), 1)
            .run(jobs(&blocker, &["p/a"]))
            .await;

        assert!(matches!(results[0].error, Some(JobError::OutputDir { .. })));
        assert!(runner.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_events_are_emitted_per_job() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(MockTestRunner::new());
        let (tx, mut rx) = mpsc::channel(16);

        let results = scheduler(runner, 2)
            .run_with_events(jobs(dir.path(), &["p/a", "p/b"]), Some(tx))
            .await;
        assert_eq!(results.len(), 2);

        let mut started = 0;
        let mut finished = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                SchedulerEvent::JobStarted { .. } => started += 1,
                SchedulerEvent::JobFinished { state, .. } => {
                    assert_eq!(state, JobState::Succeeded);
                    finished += 1;
                }
            }
        }
        assert_eq!((started, finished), (2, 2));
    }
}
