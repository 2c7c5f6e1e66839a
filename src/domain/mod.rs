//! Domain layer for the engulf coverage runner
//!
//! This module contains the core data model and the port traits for
//! external collaborators.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{
    DomainError, DomainResult, JobError, ListError, MergeError, MergeFailure, RunError, RunnerError,
};
