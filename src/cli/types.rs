//! CLI type definitions
//!
//! The clap argument surface. Every option is optional so configuration
//! files and environment variables supply anything not given explicitly.

use clap::Parser;
use std::path::PathBuf;

use crate::domain::models::config::Config;
use crate::domain::models::profile::CoverMode;

#[derive(Parser, Debug, Clone)]
#[command(name = "engulf")]
#[command(about = "Multiple-package coverage runner for Go", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Package selector resolved with `go list` (for example ./...)
    #[arg(value_name = "PACKAGE_SELECTOR")]
    pub package_selector: String,

    /// Passed through to go test
    #[arg(short, long)]
    pub verbose: bool,

    /// Passed through to go test
    #[arg(short, long)]
    pub short: bool,

    /// Passed through to go test as -parallel=<N>
    #[arg(short, long, value_name = "N")]
    pub parallel: Option<u32>,

    /// Per-package timeout in seconds, passed through to go test
    #[arg(short, long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Coverage mode: set, count or atomic
    #[arg(long, value_name = "MODE", value_parser = parse_covermode)]
    pub covermode: Option<CoverMode>,

    /// Packages to record coverage for; defaults to every selected package
    #[arg(long, value_name = "PKGS")]
    pub coverpkg: Option<String>,

    /// Run at most <N> test processes at once
    #[arg(short = 'j', long, value_name = "N")]
    pub max_jobs: Option<usize>,

    /// Storage directory for cover profiles
    #[arg(long, value_name = "DIR")]
    pub coverdir: Option<PathBuf>,

    /// Comma separated package patterns to exclude from the run
    #[arg(short = 'x', long, value_name = "PATTERNS", value_delimiter = ',')]
    pub exclude: Option<Vec<String>>,

    /// Comma separated file patterns to exclude from merged profiles
    #[arg(long, value_name = "PATTERNS", value_delimiter = ',')]
    pub exclude_files: Option<Vec<String>>,

    /// Base name for merged profiles (<coverdir>/<name>-<mode>.coverprofile)
    #[arg(long, value_name = "NAME")]
    pub merge_base: Option<String>,

    /// Don't run tests, just merge existing profiles
    #[arg(long)]
    pub only_merge: bool,

    /// Configuration file (defaults to ./.engulf.yaml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print a JSON summary instead of streaming test output
    #[arg(long)]
    pub json: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

fn parse_covermode(value: &str) -> Result<CoverMode, String> {
    CoverMode::from_str(value)
        .ok_or_else(|| format!("unknown coverage mode '{value}' (expected set, count or atomic)"))
}

impl Cli {
    /// Overlay explicitly given flags onto loaded configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(mode) = self.covermode {
            config.covermode = mode;
        }
        if let Some(max_jobs) = self.max_jobs {
            config.max_jobs = max_jobs;
        }
        if let Some(dir) = &self.coverdir {
            config.coverdir = dir.display().to_string();
        }
        if let Some(exclude) = &self.exclude {
            config.exclude = non_empty(exclude);
        }
        if let Some(exclude_files) = &self.exclude_files {
            config.exclude_files = non_empty(exclude_files);
        }
        if let Some(base) = &self.merge_base {
            config.merge_base = Some(base.clone());
        }
    }

    /// Flags forwarded verbatim to every `go test` invocation.
    pub fn passthrough_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.verbose {
            args.push("-v".to_string());
        }
        if self.short {
            args.push("-short".to_string());
        }
        if let Some(n) = self.parallel {
            args.push(format!("-parallel={n}"));
        }
        args
    }
}

fn non_empty(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}
