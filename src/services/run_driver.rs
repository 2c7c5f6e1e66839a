//! Run driver: resolves packages, runs the scheduler, then merges profiles.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{MergeFailure, RunError};
use crate::domain::models::config::Config;
use crate::domain::models::job::{CoverageSettings, Job, JobResult, JobState};
use crate::domain::models::profile::CoverMode;
use crate::domain::ports::{PackageLister, TestRunner};
use crate::infrastructure::profile_format;
use crate::services::job_scheduler::{JobScheduler, SchedulerConfig, SchedulerEvent};
use crate::services::output_filter::OutputFilter;
use crate::services::profile_aggregator::ProfileAggregator;

/// Base name used for merged output when only merging and none was given.
pub const DEFAULT_MERGE_BASE: &str = "merged";

/// Extra wall-clock time a job gets beyond the toolchain's own `-timeout`,
/// so the toolchain can report its timeout before the process is killed.
pub const TIMEOUT_GRACE: Duration = Duration::from_secs(30);

/// Everything one run needs, resolved from configuration and flags.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub selector: String,
    pub coverdir: PathBuf,
    pub covermode: CoverMode,
    /// Comma-joined packages to record coverage for; defaults to every
    /// resolved package.
    pub cover_packages: Option<String>,
    /// Flags passed to every test invocation, with and without coverage.
    pub passthrough_args: Vec<String>,
    pub max_jobs: usize,
    pub job_timeout: Option<Duration>,
    /// Regular expressions; matching packages are not run.
    pub exclude: Vec<String>,
    /// Regular expressions; matching source files are dropped from merged output.
    pub exclude_files: Vec<String>,
    pub merge_base: Option<String>,
    pub only_merge: bool,
}

impl RunConfig {
    /// Build a run configuration for `selector` from loaded settings.
    pub fn from_config(config: &Config, selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            coverdir: PathBuf::from(&config.coverdir),
            covermode: config.covermode,
            cover_packages: None,
            passthrough_args: vec![format!("-timeout={}s", config.timeout_secs)],
            max_jobs: config.max_jobs,
            job_timeout: Some(Duration::from_secs(config.timeout_secs) + TIMEOUT_GRACE),
            exclude: config.exclude.clone(),
            exclude_files: config.exclude_files.clone(),
            merge_base: config.merge_base.clone(),
            only_merge: false,
        }
    }

    /// Base name for merged output, if merging is requested.
    pub fn effective_merge_base(&self) -> Option<&str> {
        match (&self.merge_base, self.only_merge) {
            (Some(base), _) => Some(base.as_str()),
            (None, true) => Some(DEFAULT_MERGE_BASE),
            (None, false) => None,
        }
    }
}

/// A per-package profile left out of the merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedProfile {
    pub package: String,
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Packages selected after exclusion, in lister order.
    pub packages: Vec<String>,
    /// One result per job, in completion order.
    pub results: Vec<JobResult>,
    pub merged_files: Vec<PathBuf>,
    pub merge_failures: Vec<MergeFailure>,
    pub skipped_profiles: Vec<SkippedProfile>,
}

impl RunReport {
    /// False if any job ended in error or any merge failed.
    pub fn success(&self) -> bool {
        self.results.iter().all(JobResult::is_success) && self.merge_failures.is_empty()
    }

    pub fn failed_jobs(&self) -> impl Iterator<Item = &JobResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }
}

/// Coordinates one run from selector to merged profiles.
pub struct RunDriver {
    config: RunConfig,
    lister: Arc<dyn PackageLister>,
    runner: Arc<dyn TestRunner>,
    exclude: Vec<Regex>,
    file_excludes: Vec<Regex>,
    filter: OutputFilter,
}

impl RunDriver {
    pub fn new(
        config: RunConfig,
        lister: Arc<dyn PackageLister>,
        runner: Arc<dyn TestRunner>,
    ) -> Result<Self, RunError> {
        let exclude = compile_patterns("package exclusion", &config.exclude)?;
        let file_excludes = compile_patterns("file exclusion", &config.exclude_files)?;
        Ok(Self {
            config,
            lister,
            runner,
            exclude,
            file_excludes,
            filter: OutputFilter::new(),
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run with job output going to stdout.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        let mut stdout = std::io::stdout();
        self.run_with(&mut stdout, None).await
    }

    /// Run, writing formatted job output to `sink` as each job finishes.
    #[instrument(skip(self, sink, events), fields(selector = %self.config.selector))]
    pub async fn run_with<W: Write>(
        &self,
        sink: &mut W,
        events: Option<mpsc::Sender<SchedulerEvent>>,
    ) -> Result<RunReport, RunError> {
        let packages = self.resolve_packages().await?;
        self.run_selected(packages, sink, events).await
    }

    /// Run already-resolved packages, then merge their profiles.
    pub async fn run_selected<W: Write>(
        &self,
        packages: Vec<String>,
        sink: &mut W,
        events: Option<mpsc::Sender<SchedulerEvent>>,
    ) -> Result<RunReport, RunError> {
        self.check_profile_paths(&packages)?;
        let mut report = RunReport {
            packages: packages.clone(),
            ..RunReport::default()
        };

        if self.config.only_merge {
            info!(packages = packages.len(), "skipping tests, merging existing profiles");
        } else {
            report.results = self.run_jobs(&packages, sink, events).await?;
        }

        if let Some(base) = self.config.effective_merge_base() {
            // A failed coverage run may leave a partial profile behind.
            let mergeable: Vec<String> = if self.config.only_merge {
                packages
            } else {
                report
                    .results
                    .iter()
                    .filter(|r| r.job.state == JobState::Succeeded)
                    .map(|r| r.package().to_string())
                    .collect()
            };
            self.merge_profiles(&mergeable, base, &mut report)?;
        }

        info!(
            passed = report.passed_count(),
            failed = report.failed_jobs().count(),
            merged = report.merged_files.len(),
            "run complete"
        );
        Ok(report)
    }

    /// Resolve the selector and drop excluded and duplicate packages.
    pub async fn resolve_packages(&self) -> Result<Vec<String>, RunError> {
        let listed = self.lister.list(&self.config.selector).await?;
        let mut seen = HashSet::new();
        let packages: Vec<String> = listed
            .into_iter()
            .filter(|p| {
                let excluded = self.exclude.iter().any(|re| re.is_match(p));
                if excluded {
                    debug!(package = %p, "excluded");
                }
                !excluded
            })
            .filter(|p| seen.insert(p.clone()))
            .collect();
        info!(count = packages.len(), "selected packages");
        Ok(packages)
    }

    /// Fail when two packages flatten to the same profile file.
    fn check_profile_paths(&self, packages: &[String]) -> Result<(), RunError> {
        let mut owners: HashMap<PathBuf, &str> = HashMap::with_capacity(packages.len());
        for package in packages {
            let path = Job::profile_path(&self.config.coverdir, package);
            if let Some(first) = owners.get(&path) {
                return Err(RunError::ProfilePathCollision {
                    first: (*first).to_string(),
                    second: package.clone(),
                    path: path.display().to_string(),
                });
            }
            owners.insert(path, package);
        }
        Ok(())
    }

    /// One job per package, all sharing the run's coverage settings.
    pub fn build_jobs(&self, packages: &[String]) -> Vec<Job> {
        let settings = CoverageSettings {
            cover_packages: self
                .config
                .cover_packages
                .clone()
                .unwrap_or_else(|| packages.join(",")),
            mode: self.config.covermode,
        };
        packages
            .iter()
            .map(|p| {
                Job::new(
                    p.as_str(),
                    Job::profile_path(&self.config.coverdir, p),
                    &settings,
                    self.config.passthrough_args.clone(),
                )
            })
            .collect()
    }

    async fn run_jobs<W: Write>(
        &self,
        packages: &[String],
        sink: &mut W,
        events: Option<mpsc::Sender<SchedulerEvent>>,
    ) -> Result<Vec<JobResult>, RunError> {
        let scheduler = JobScheduler::new(
            Arc::clone(&self.runner),
            SchedulerConfig {
                max_jobs: self.config.max_jobs,
                job_timeout: self.config.job_timeout,
            },
        );

        let mut write_error = None;
        let results = scheduler
            .run_streaming(self.build_jobs(packages), events, |result| {
                if write_error.is_some() {
                    return;
                }
                let text = self.filter.format_result(result);
                let written = sink.write_all(text.as_bytes()).and_then(|()| sink.flush());
                if let Err(e) = written {
                    write_error = Some(e);
                }
            })
            .await;

        match write_error {
            Some(e) => Err(RunError::Output(e)),
            None => Ok(results),
        }
    }

    /// Fold the profiles of `packages` and write one merged file per mode.
    fn merge_profiles(
        &self,
        packages: &[String],
        base: &str,
        report: &mut RunReport,
    ) -> Result<(), RunError> {
        let mut aggregator = ProfileAggregator::new(self.file_excludes.clone());

        for package in packages {
            let path = Job::profile_path(&self.config.coverdir, package);
            match profile_format::read_file(&path) {
                Ok(profiles) => {
                    report.merge_failures.extend(aggregator.add_all(profiles));
                }
                Err(e) => {
                    warn!(package = %package, path = %path.display(), error = %e, "skipping unreadable profile");
                    report.skipped_profiles.push(SkippedProfile {
                        package: package.clone(),
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        report.merged_files = aggregator
            .write_all(&self.config.coverdir, base)
            .map_err(|source| RunError::WriteMerged {
                dir: self.config.coverdir.display().to_string(),
                source,
            })?;
        Ok(())
    }
}

fn compile_patterns(kind: &'static str, patterns: &[String]) -> Result<Vec<Regex>, RunError> {
    patterns
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| {
            Regex::new(p).map_err(|source| RunError::InvalidPattern {
                kind,
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}
