//! Package lister port - resolves a selector into package import paths.

use async_trait::async_trait;

use crate::domain::errors::ListError;

/// Resolves a package selector (such as `./...`) into distinct package
/// identifiers, in the order the toolchain reports them.
#[async_trait]
pub trait PackageLister: Send + Sync {
    async fn list(&self, selector: &str) -> Result<Vec<String>, ListError>;
}
