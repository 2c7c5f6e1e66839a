//! End-of-run summary, as a comfy-table for humans or JSON for tools.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::style;
use serde::Serialize;
use std::env;

use crate::domain::errors::JobError;
use crate::domain::models::job::{JobResult, JobState, RetryVerdict};
use crate::services::output_filter::OutputFilter;
use crate::services::run_driver::RunReport;

use super::CommandOutput;

#[derive(Debug, Clone, Serialize)]
pub struct PackageSummary {
    pub package: String,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The failure came from the harness (directory, launch, timeout), not
    /// from the tests.
    pub harness_failure: bool,
    pub duration_ms: u64,
    /// Captured output with toolchain warnings removed.
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedSummary {
    pub package: String,
    pub path: String,
    pub reason: String,
}

/// Serializable view of a `RunReport`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub success: bool,
    pub packages: Vec<PackageSummary>,
    pub merged_files: Vec<String>,
    pub merge_failures: Vec<String>,
    pub skipped_profiles: Vec<SkippedSummary>,
    #[serde(skip)]
    use_colors: bool,
}

impl RunSummary {
    pub fn from_report(report: &RunReport, filter: &OutputFilter) -> Self {
        let mut packages: Vec<PackageSummary> = report
            .results
            .iter()
            .map(|r| package_summary(r, filter))
            .collect();
        packages.sort_by(|a, b| a.package.cmp(&b.package));

        Self {
            success: report.success(),
            packages,
            merged_files: report
                .merged_files
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            merge_failures: report.merge_failures.iter().map(ToString::to_string).collect(),
            skipped_profiles: report
                .skipped_profiles
                .iter()
                .map(|s| SkippedSummary {
                    package: s.package.clone(),
                    path: s.path.display().to_string(),
                    reason: s.reason.clone(),
                })
                .collect(),
            use_colors: supports_color(),
        }
    }

    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    fn table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        table.set_header(vec![
            Cell::new("Package").add_attribute(Attribute::Bold),
            Cell::new("Result").add_attribute(Attribute::Bold),
            Cell::new("Retry").add_attribute(Attribute::Bold),
            Cell::new("Time").add_attribute(Attribute::Bold),
        ]);

        for p in &self.packages {
            let label = state_label(p.state);
            let result_cell = if self.use_colors {
                Cell::new(label).fg(state_color(p.state))
            } else {
                Cell::new(format!("{} {label}", state_icon(p.state)))
            };
            table.add_row(vec![
                Cell::new(&p.package),
                result_cell,
                Cell::new(p.retry.map_or("-", retry_label)),
                Cell::new(format!("{:.1}s", p.duration_ms as f64 / 1000.0)),
            ]);
        }
        table
    }
}

impl CommandOutput for RunSummary {
    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if !self.packages.is_empty() {
            lines.push(self.table().to_string());
        }

        for path in &self.merged_files {
            lines.push(format!("merged profile: {path}"));
        }
        for s in &self.skipped_profiles {
            lines.push(format!("skipped profile {} ({}): {}", s.path, s.package, s.reason));
        }
        for failure in &self.merge_failures {
            lines.push(format!("merge failed: {failure}"));
        }

        let failed = self.packages.iter().filter(|p| p.error.is_some()).count();
        let harness = self.packages.iter().filter(|p| p.harness_failure).count();
        let mut verdict = format!(
            "{} of {} packages passed",
            self.packages.len() - failed,
            self.packages.len()
        );
        if harness > 0 {
            verdict.push_str(&format!(" ({harness} could not be tested)"));
        }
        lines.push(match (self.use_colors, self.success) {
            (true, true) => style(verdict).green().bold().to_string(),
            (true, false) => style(verdict).red().bold().to_string(),
            (false, _) => verdict,
        });
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

fn package_summary(result: &JobResult, filter: &OutputFilter) -> PackageSummary {
    PackageSummary {
        package: result.package().to_string(),
        state: result.job.state,
        retry: result.retry,
        error: result.error.as_ref().map(ToString::to_string),
        harness_failure: result.error.as_ref().is_some_and(JobError::is_harness_failure),
        duration_ms: u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
        output: filter.strip_warnings(&result.output),
    }
}

fn state_label(state: JobState) -> &'static str {
    match state {
        JobState::Succeeded => "passed",
        JobState::FailedRetried => "failed",
        JobState::Failed => "error",
        JobState::Pending | JobState::Running => state.as_str(),
    }
}

fn state_color(state: JobState) -> Color {
    match state {
        JobState::Succeeded => Color::Green,
        JobState::FailedRetried => Color::Red,
        JobState::Failed => Color::Magenta,
        JobState::Pending | JobState::Running => Color::Yellow,
    }
}

fn state_icon(state: JobState) -> &'static str {
    match state {
        JobState::Succeeded => "✓",
        JobState::FailedRetried | JobState::Failed => "✗",
        JobState::Pending | JobState::Running => "…",
    }
}

fn retry_label(verdict: RetryVerdict) -> &'static str {
    match verdict {
        RetryVerdict::PassedWithoutCoverage => "passes without coverage",
        RetryVerdict::FailedWithoutCoverage => "fails without coverage",
        RetryVerdict::Inconclusive => "inconclusive",
    }
}

/// Check if color output is supported
fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    console::colors_enabled_stderr()
}
