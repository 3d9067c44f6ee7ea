//! Graph generator seam.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// External graph generator consumed by the pipeline.
///
/// Produces a list of rendered image paths from whatever data source the
/// host wires in. An empty list is a valid outcome, not an error.
#[async_trait]
pub trait GraphGenerator: Send + Sync {
    async fn generate_all(&self, max_retries: u32, timeout: Duration) -> Result<Vec<PathBuf>>;
}
