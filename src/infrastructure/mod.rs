//! Infrastructure layer module
//!
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)
//! - Coverprofile text format

pub mod config;
pub mod logging;
pub mod profile_format;
