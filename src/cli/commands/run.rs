//! The run command: load configuration, run every package, merge, summarize.

use anyhow::{Context, Result};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::adapters::go_tool::{GoPackageLister, GoTestRunner, GoToolConfig};
use crate::cli::output::{self, create_progress_bar, track_events, RunSummary, SuspendingWriter};
use crate::cli::types::Cli;
use crate::domain::models::config::Config;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging::{LogConfig, LoggerImpl};
use crate::services::output_filter::OutputFilter;
use crate::services::run_driver::{RunConfig, RunDriver, RunReport};

/// Load layered configuration and overlay the command line.
pub fn resolve_config(cli: &Cli) -> Result<Config> {
    ConfigLoader::load_with(cli.config.as_deref(), |config| cli.apply_to(config))
}

/// Translate configuration and flags into a driver configuration.
pub fn run_config(cli: &Cli, config: &Config) -> RunConfig {
    let mut run = RunConfig::from_config(config, cli.package_selector.clone());
    run.cover_packages = cli.coverpkg.clone();
    run.passthrough_args.extend(cli.passthrough_args());
    run.only_merge = cli.only_merge;
    run
}

/// Execute a full run. Returns whether every job and merge succeeded.
pub async fn execute(cli: Cli) -> Result<bool> {
    let config = resolve_config(&cli)?;
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))?;
    debug!(?config, "configuration resolved");

    let tool = GoToolConfig::new(config.go_binary.clone());
    let driver = RunDriver::new(
        run_config(&cli, &config),
        Arc::new(GoPackageLister::new(tool.clone())),
        Arc::new(GoTestRunner::new(tool)),
    )?;

    let coverdir = PathBuf::from(&config.coverdir);
    std::fs::create_dir_all(&coverdir)
        .with_context(|| format!("Failed to create coverdir {}", coverdir.display()))?;

    let report = run_driver(&driver, &cli).await?;

    let summary = RunSummary::from_report(&report, &OutputFilter::new());
    output::output(&summary, cli.json);
    Ok(report.success())
}

async fn run_driver(driver: &RunDriver, cli: &Cli) -> Result<RunReport> {
    let packages = driver.resolve_packages().await?;

    if cli.json {
        // Job output is carried in the JSON summary instead.
        return Ok(driver.run_selected(packages, &mut io::sink(), None).await?);
    }

    let show_progress = !cli.no_progress && !cli.only_merge && console::Term::stderr().is_term();
    if !show_progress {
        let mut stdout = io::stdout();
        return Ok(driver.run_selected(packages, &mut stdout, None).await?);
    }

    let pb = create_progress_bar(packages.len() as u64);
    let (tx, rx) = mpsc::channel(packages.len().max(1) * 2);
    let tracker = track_events(pb.clone(), rx);

    let mut sink = SuspendingWriter::new(pb, io::stdout());
    let report = driver.run_selected(packages, &mut sink, Some(tx)).await;
    tracker.await.context("Progress tracker failed")?;
    Ok(report?)
}
