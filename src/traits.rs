use crate::model::HarvestBatch;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Snapshot serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Persists `batch` and returns where it was written.
    async fn save(&self, batch: &HarvestBatch) -> Result<String, StorageError>;

    /// Returns the most recently saved batch, or `None` if nothing was saved yet.
    async fn load_latest(&self) -> Result<Option<HarvestBatch>, StorageError>;
}
