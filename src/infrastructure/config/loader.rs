use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use regex::Regex;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".engulf.yaml";

/// Prefix of environment overrides; `__` separates nested keys.
pub const ENV_PREFIX: &str = "ENGULF_";

const MAX_JOBS_LIMIT: usize = 256;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_jobs: {0}. Must be between 1 and 256")]
    InvalidMaxJobs(usize),

    #[error("go_binary cannot be empty")]
    EmptyGoBinary,

    #[error("coverdir cannot be empty")]
    EmptyCoverdir,

    #[error("Invalid timeout_secs: 0. Must be positive")]
    ZeroTimeout,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Invalid {field} pattern '{pattern}': {reason}")]
    InvalidPattern {
        field: &'static str,
        pattern: String,
        reason: String,
    },

    #[error("merge_base cannot be empty or contain a path separator: '{0}'")]
    InvalidMergeBase(String),

    #[error("Configuration file not found: {0}")]
    MissingFile(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. `file`, or .engulf.yaml in the working directory (optional)
    /// 3. Environment variables (ENGULF_* prefix)
    /// 4. `overrides`, typically command-line flags
    ///
    /// Validation runs once on the final result, so an override can replace
    /// an invalid file or environment value. An explicit `file` must exist.
    pub fn load_with(file: Option<&Path>, overrides: impl FnOnce(&mut Config)) -> Result<Config> {
        let mut config = match file {
            Some(path) => Self::extract_from_file(path)?,
            None => Self::extract()?,
        };
        overrides(&mut config);
        Self::validate(&config)?;
        Ok(config)
    }

    /// Layered configuration without validation.
    pub fn extract() -> Result<Config> {
        Self::figment(Path::new(CONFIG_FILE_NAME))
            .extract()
            .context("Failed to extract configuration from figment")
    }

    /// `extract` with an explicit file, which must exist.
    pub fn extract_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::MissingFile(path.display().to_string()).into());
        }

        Self::figment(path)
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))
    }

    fn figment(file: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.max_jobs == 0 || config.max_jobs > MAX_JOBS_LIMIT {
            return Err(ConfigError::InvalidMaxJobs(config.max_jobs));
        }

        if config.go_binary.trim().is_empty() {
            return Err(ConfigError::EmptyGoBinary);
        }

        if config.coverdir.trim().is_empty() {
            return Err(ConfigError::EmptyCoverdir);
        }

        if config.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        if let Some(base) = &config.merge_base {
            if base.is_empty() || base.contains(['/', '\\']) {
                return Err(ConfigError::InvalidMergeBase(base.clone()));
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(config.logging.rotation.clone()));
        }

        check_patterns("exclude", &config.exclude)?;
        check_patterns("exclude_files", &config.exclude_files)?;

        Ok(())
    }
}

fn check_patterns(field: &'static str, patterns: &[String]) -> Result<(), ConfigError> {
    for pattern in patterns {
        if let Err(e) = Regex::new(pattern) {
            return Err(ConfigError::InvalidPattern {
                field,
                pattern: pattern.clone(),
                reason: e.to_string(),
            });
        }
    }
    Ok(())
}
