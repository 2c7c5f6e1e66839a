//! engulf - multiple-package coverage runner for Go
//!
//! Runs `go test` with coverage for every package a selector resolves to,
//! with bounded concurrency, reruns failures without coverage to tell
//! instrumentation problems from real failures, and merges the resulting
//! coverprofiles into one profile per coverage mode.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and port traits
//! - **Service Layer** (`services`): scheduler, merge engine, aggregator, run driver
//! - **Adapters** (`adapters`): Go toolchain and in-memory implementations of the ports
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging, profile format
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{Block, Config, CoverMode, Job, JobResult, JobState, Position, Profile};
pub use domain::ports::{PackageLister, TestRunner};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    merge_blocks, JobScheduler, ProfileAggregator, RunConfig, RunDriver, RunReport,
};
