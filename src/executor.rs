use crate::config::HarvestParams;
use crate::harvest::strategies::{SourceHarvest, SourceHarvester};
use crate::harvest::traits::{EventSource, HarvestError};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{info, instrument};

/// Bounds how many sources are harvested at once.
#[derive(Debug, Clone)]
pub struct HarvesterExecutor {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl HarvesterExecutor {
    pub fn new(concurrency_limit: usize) -> Self {
        let limit = concurrency_limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    #[instrument(skip(self, source, params), fields(source = %source.name()))]
    pub async fn execute(
        &self,
        source: Arc<dyn EventSource>,
        params: Arc<HarvestParams>,
    ) -> Result<SourceHarvest, HarvestError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| HarvestError::Executor(format!("Semaphore error: {}", e)))?;

        info!(
            strategy = source.pagination().strategy_name(),
            "Starting harvest"
        );
        let started = Instant::now();

        let result = SourceHarvester::new(source.as_ref(), &params).harvest().await;

        if let Ok(harvest) = &result {
            info!(
                records = harvest.records.len(),
                pages = harvest.pages_fetched,
                duration_ms = started.elapsed().as_millis() as u64,
                "Finished harvest"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::replay::ReplaySource;
    use crate::harvest::traits::{Page, Pagination};
    use serde_json::json;

    #[test]
    fn test_limit_is_at_least_one() {
        assert_eq!(HarvesterExecutor::new(0).limit(), 1);
        assert_eq!(HarvesterExecutor::new(4).limit(), 4);
    }

    #[tokio::test]
    async fn test_execute_runs_source() {
        let executor = HarvesterExecutor::new(2);
        let source: Arc<dyn EventSource> = Arc::new(
            ReplaySource::new("ConfTech", Pagination::Single)
                .then_page(Page::new(vec![json!({"id": 1})])),
        );

        let harvest = executor
            .execute(source, Arc::new(HarvestParams::default()))
            .await
            .unwrap();

        assert_eq!(harvest.records.len(), 1);
        assert_eq!(harvest.pages_fetched, 1);
    }
}
