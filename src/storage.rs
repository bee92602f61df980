//! Snapshot persistence for harvest batches.
//!
//! ## Layout
//!
//! ```text
//! {data_dir}/
//! ├── data_2024_01_01_10.00.05.123.json
//! └── data_2024_01_02_10.00.07.456.json
//! ```
//!
//! Each file holds one [`HarvestBatch`] as `{"date": ..., "events": [...]}`.
//! File names sort chronologically, so the latest snapshot is the greatest
//! name.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::model::HarvestBatch;
use crate::traits::{BatchStore, StorageError};

const PREFIX: &str = "data_";
const EXTENSION: &str = ".json";

/// Filesystem store writing one JSON file per batch.
#[derive(Debug, Clone)]
pub struct LocalBatchStore {
    data_dir: PathBuf,
}

impl LocalBatchStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn file_name(batch: &HarvestBatch) -> String {
        format!(
            "{PREFIX}{}{EXTENSION}",
            batch.created_at.format("%Y_%m_%d_%H.%M.%S%.3f")
        )
    }

    /// Write to a temp file, then rename over the target.
    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.data_dir).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn latest_file(&self) -> Result<Option<PathBuf>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.data_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut latest: Option<String> = None;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(PREFIX) || !name.ends_with(EXTENSION) {
                continue;
            }
            if latest.as_ref().map_or(true, |current| name > *current) {
                latest = Some(name);
            }
        }
        Ok(latest.map(|name| self.data_dir.join(name)))
    }
}

#[async_trait]
impl BatchStore for LocalBatchStore {
    async fn save(&self, batch: &HarvestBatch) -> Result<String, StorageError> {
        let path = self.data_dir.join(Self::file_name(batch));
        let bytes = serde_json::to_vec_pretty(batch)?;
        self.write_atomic(&path, &bytes).await?;

        info!(
            path = %path.display(),
            events = batch.len(),
            "Saved harvest snapshot"
        );
        Ok(path.display().to_string())
    }

    async fn load_latest(&self) -> Result<Option<HarvestBatch>, StorageError> {
        let Some(path) = self.latest_file().await? else {
            debug!(data_dir = %self.data_dir.display(), "No snapshots found");
            return Ok(None);
        };

        let bytes = tokio::fs::read(&path).await?;
        let batch = serde_json::from_slice(&bytes)?;
        info!(path = %path.display(), "Loaded latest snapshot");
        Ok(Some(batch))
    }
}

/// In-process store, mainly for tests.
#[derive(Debug, Default)]
pub struct MemoryBatchStore {
    batches: Mutex<Vec<HarvestBatch>>,
}

impl MemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.batches.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.batches.lock().await.is_empty()
    }
}

#[async_trait]
impl BatchStore for MemoryBatchStore {
    async fn save(&self, batch: &HarvestBatch) -> Result<String, StorageError> {
        let mut batches = self.batches.lock().await;
        batches.push(batch.clone());
        Ok(format!("memory:{}", batches.len() - 1))
    }

    async fn load_latest(&self) -> Result<Option<HarvestBatch>, StorageError> {
        Ok(self.batches.lock().await.last().cloned())
    }
}
