//! Go toolchain adapters.
//!
//! `go list` resolves package selectors and `go test` runs each job. Both
//! shell out through `tokio::process` with piped output.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::domain::errors::{ListError, RunnerError};
use crate::domain::ports::{PackageLister, RunOutput, TestRunner};

/// Location of the toolchain binary and the directory it runs in.
#[derive(Debug, Clone)]
pub struct GoToolConfig {
    pub binary_path: String,
    pub working_dir: Option<PathBuf>,
}

impl Default for GoToolConfig {
    fn default() -> Self {
        Self {
            binary_path: "go".to_string(),
            working_dir: None,
        }
    }
}

impl GoToolConfig {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            working_dir: None,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary_path);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Resolves selectors with `go list`.
#[derive(Debug, Clone, Default)]
pub struct GoPackageLister {
    config: GoToolConfig,
}

impl GoPackageLister {
    pub fn new(config: GoToolConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PackageLister for GoPackageLister {
    #[instrument(skip(self))]
    async fn list(&self, selector: &str) -> Result<Vec<String>, ListError> {
        let output = self
            .config
            .command()
            .arg("list")
            .arg(selector)
            .output()
            .await
            .map_err(ListError::Launch)?;

        if !output.status.success() {
            return Err(ListError::Unresolved {
                selector: selector.to_string(),
                output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let packages: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(ToString::to_string)
            .collect();
        debug!(count = packages.len(), "resolved packages");
        Ok(packages)
    }
}

/// Runs `go test` for one package.
#[derive(Debug, Clone, Default)]
pub struct GoTestRunner {
    config: GoToolConfig,
}

impl GoTestRunner {
    pub fn new(config: GoToolConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TestRunner for GoTestRunner {
    async fn run(&self, package: &str, args: &[String]) -> Result<RunOutput, RunnerError> {
        debug!(package, binary = %self.config.binary_path, args = ?args, "spawning test process");

        let output = self
            .config
            .command()
            .args(args)
            .output()
            .await
            .map_err(|source| RunnerError::Launch {
                program: self.config.binary_path.clone(),
                source,
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(RunOutput {
            output: text,
            success: output.status.success(),
            exit_code: output.status.code(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runner_captures_output_and_status() {
        let runner = GoTestRunner::new(GoToolConfig::new("sh"));
        let args = vec!["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()];

        let run = runner.run("p", &args).await.unwrap();
        assert!(!run.success);
        assert_eq!(run.exit_code, Some(3));
        assert_eq!(run.output, "out\nerr\n");
    }

    #[tokio::test]
    async fn test_runner_reports_launch_failure() {
        let runner = GoTestRunner::new(GoToolConfig::new("/nonexistent/go-binary"));
        let err = runner.run("p", &[]).await.unwrap_err();
        assert!(matches!(err, RunnerError::Launch { .. }));
    }

    #[tokio::test]
    async fn test_lister_splits_lines() {
        let lister = GoPackageLister::new(GoToolConfig::new("echo"));
        let packages = lister.list("example.com/a").await.unwrap();
        assert_eq!(packages, vec!["list example.com/a"]);
    }

    #[tokio::test]
    async fn test_lister_failure_is_unresolved() {
        let lister = GoPackageLister::new(GoToolConfig::new("false"));
        assert!(matches!(
            lister.list("./...").await,
            Err(ListError::Unresolved { .. })
        ));

        let missing = GoPackageLister::new(GoToolConfig::new("/nonexistent/go-binary"));
        assert!(matches!(missing.list("./...").await, Err(ListError::Launch(_))));
    }
}
