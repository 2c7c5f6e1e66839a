//! Infrastructure adapters for external systems.

pub mod go_tool;
pub mod mock;

pub use go_tool::{GoPackageLister, GoTestRunner, GoToolConfig};
pub use mock::{MockOutcome, MockTestRunner, StaticPackageLister};
