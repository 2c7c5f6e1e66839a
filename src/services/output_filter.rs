//! Cleans and frames captured test output for the combined console stream.

use regex::Regex;

use crate::domain::models::job::JobResult;

/// Noise `go test -coverpkg` prints for every covered package that the
/// tested package does not import.
const NO_DEPENDENTS_WARNING: &str = r"(?m)^warning: no packages being tested depend on \S+$\n?";

/// Strips toolchain noise and frames failed job output.
#[derive(Debug, Clone)]
pub struct OutputFilter {
    warning: Regex,
}

impl Default for OutputFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFilter {
    pub fn new() -> Self {
        Self {
            warning: Regex::new(NO_DEPENDENTS_WARNING).expect("warning pattern is valid"),
        }
    }

    pub fn strip_warnings(&self, output: &str) -> String {
        self.warning.replace_all(output, "").into_owned()
    }

    /// Text printed for one finished job.
    ///
    /// Failures start with a `BEGIN <package>` line so several failures stay
    /// delimitable in one stream.
    pub fn format_result(&self, result: &JobResult) -> String {
        let body = self.strip_warnings(&result.output);
        if result.is_success() {
            body
        } else {
            format!("BEGIN {}\n{body}", result.package())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::JobError;
    use crate::domain::models::job::{CoverageSettings, Job};
    use crate::domain::models::profile::CoverMode;
    use std::time::Duration;

    fn result(output: &str, error: Option<JobError>) -> JobResult {
        let settings = CoverageSettings {
            cover_packages: "example.com/x".to_string(),
            mode: CoverMode::Set,
        };
        JobResult {
            job: Job::new("example.com/x", "/tmp/x.coverprofile", &settings, vec![]),
            output: output.to_string(),
            error,
            retry: None,
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_strip_warnings_removes_only_warning_lines() {
        let filter = OutputFilter::new();
        let raw = "warning: no packages being tested depend on example.com/y\n\
                   ok  \texample.com/x\t0.01s\n\
                   warning: no packages being tested depend on example.com/z\n";
        assert_eq!(filter.strip_warnings(raw), "ok  \texample.com/x\t0.01s\n");
    }

    #[test]
    fn test_strip_warnings_handles_missing_trailing_newline() {
        let filter = OutputFilter::new();
        assert_eq!(
            filter.strip_warnings("PASS\nwarning: no packages being tested depend on a/b"),
            "PASS\n"
        );
    }

    #[test]
    fn test_failures_are_framed() {
        let filter = OutputFilter::new();
        let failed = result("--- FAIL: TestX\n", Some(JobError::TestsFailed { exit_code: Some(1) }));
        assert_eq!(filter.format_result(&failed), "BEGIN example.com/x\n--- FAIL: TestX\n");

        let passed = result("ok\n", None);
        assert_eq!(filter.format_result(&passed), "ok\n");
    }
}
