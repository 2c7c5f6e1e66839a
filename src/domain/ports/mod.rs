//! Port trait definitions (Hexagonal Architecture)
//!
//! Interfaces to the external collaborators the core depends on:
//! - PackageLister: resolves a package selector into import paths
//! - TestRunner: runs one test command and captures its output

pub mod package_lister;
pub mod test_runner;

pub use package_lister::PackageLister;
pub use test_runner::{RunOutput, TestRunner};
