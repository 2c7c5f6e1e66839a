use serde::{Deserialize, Serialize};

use super::profile::CoverMode;

/// Main configuration structure for engulf
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Go toolchain executable used for `go list` and `go test`
    #[serde(default = "default_go_binary")]
    pub go_binary: String,

    /// Maximum number of test processes run at once (1-256)
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,

    /// Directory that receives per-package and merged profiles
    #[serde(default = "default_coverdir")]
    pub coverdir: String,

    /// Instrumentation mode passed to `go test -covermode`
    #[serde(default)]
    pub covermode: CoverMode,

    /// Per-job timeout in seconds, also passed to `go test -timeout`
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Package patterns (regular expressions) excluded from the run
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Source file patterns (regular expressions) dropped from merged profiles
    #[serde(default)]
    pub exclude_files: Vec<String>,

    /// Base name for merged profiles; no merge happens when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_base: Option<String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_go_binary() -> String {
    "go".to_string()
}

const fn default_max_jobs() -> usize {
    3
}

fn default_coverdir() -> String {
    "/tmp".to_string()
}

const fn default_timeout_secs() -> u64 {
    600
}

fn default_exclude() -> Vec<String> {
    vec!["vendor/".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            go_binary: default_go_binary(),
            max_jobs: default_max_jobs(),
            coverdir: default_coverdir(),
            covermode: CoverMode::default(),
            timeout_secs: default_timeout_secs(),
            exclude: default_exclude(),
            exclude_files: vec![],
            merge_base: None,
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Log file rotation: daily, hourly or never
    #[serde(default = "default_log_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_log_rotation(),
        }
    }
}
