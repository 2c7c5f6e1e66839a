//! Domain models

pub mod config;
pub mod job;
pub mod profile;

pub use config::{Config, LoggingConfig};
pub use job::{CoverageSettings, Job, JobResult, JobState, RetryVerdict};
pub use profile::{Block, CoverMode, Position, Profile};
