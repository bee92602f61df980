//! Multi-source harvest coordinator.
//!
//! This module provides the [`HarvestCoordinator`] that harvests a list of
//! sources and normalizes everything into one [`HarvestBatch`] with:
//! - Per-source fail-fast harvesting via [`SourceHarvester`](crate::harvest::strategies::SourceHarvester)
//! - Per-source deduplication on the source's identity key
//! - A configurable [`FailurePolicy`] for sources that fail
//! - Optional bounded concurrency across independent sources
//! - Structured logging via `tracing`

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{FailurePolicy, HarvestConfig, HarvestParams};
use crate::executor::HarvesterExecutor;
use crate::harvest::dedup::dedupe;
use crate::harvest::lock::RunLock;
use crate::harvest::strategies::SourceHarvest;
use crate::harvest::traits::{EventSource, HarvestError};
use crate::model::{HarvestBatch, UnifiedEvent};
use crate::schema::mapper::{Schema, SchemaMapper};
use crate::schema::path::PathError;
use crate::traits::{BatchStore, StorageError};

// ============================================================================
// Result Types
// ============================================================================

/// Complete run result with the batch and statistics.
#[derive(Debug)]
pub struct HarvestResult {
    /// Normalized events from every source that succeeded
    pub batch: HarvestBatch,

    /// Per-source processing statistics
    pub stats: HarvestStats,
}

/// Statistics about one harvest run.
#[derive(Debug, Default, Clone)]
pub struct HarvestStats {
    /// Total time spent on the entire run (milliseconds)
    pub total_duration_ms: u64,

    /// One report per attempted source, in source order
    pub sources: Vec<SourceReport>,
}

impl HarvestStats {
    /// Sources that failed and contributed no events.
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|report| report.error.is_some())
    }
}

/// Outcome of harvesting a single source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub name: String,

    /// Pages fetched across all geo-scopes
    pub pages_fetched: u32,

    /// Records kept after deduplication
    pub records: usize,

    pub duplicates_removed: usize,

    pub duration_ms: u64,

    /// Failure message when the source was skipped
    pub error: Option<String>,
}

// ============================================================================
// Pipeline Errors
// ============================================================================

/// Errors that end a harvest run without a batch.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// A source failed under [`FailurePolicy::AbortRun`]
    #[error("Source '{source_name}' failed: {error}")]
    SourceFailed {
        source_name: String,
        #[source]
        error: HarvestError,
    },

    /// Another run holds the run lock
    #[error("A harvest run is already in progress")]
    AlreadyRunning,

    /// A concurrent source task panicked or was cancelled
    #[error("Harvest task failed: {0}")]
    Join(String),

    /// The batch could not be persisted
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

// ============================================================================
// Coordinator
// ============================================================================

/// Harvests sources and builds one [`HarvestBatch`].
///
/// # Failure Policy
///
/// With [`FailurePolicy::AbortRun`] (the default) the first failing source
/// ends the run with [`PipelineError::SourceFailed`]. With
/// [`FailurePolicy::SkipSource`] the failure is logged, the source contributes
/// nothing and the run continues. Either way a failed source never
/// contributes partial records.
///
/// # Concurrency
///
/// By default sources are harvested one at a time, in order. With
/// [`with_concurrency`](Self::with_concurrency) above 1 independent sources
/// run on separate tasks; their results are still absorbed in source order,
/// so the batch is identical to a sequential run.
///
/// # Example
///
/// ```ignore
/// let coordinator = HarvestCoordinator::new(SchemaMapper::new(Schema::unified()?))
///     .with_policy(FailurePolicy::SkipSource);
///
/// let result = coordinator.run(&sources, &config.params(Utc::now())).await?;
/// println!("Harvested {} events", result.batch.len());
/// ```
pub struct HarvestCoordinator {
    mapper: SchemaMapper,
    policy: FailurePolicy,
    executor: HarvesterExecutor,
}

impl HarvestCoordinator {
    /// Creates a coordinator with the given mapper.
    ///
    /// Default configuration:
    /// - Policy: abort the run on the first source failure
    /// - Concurrency: 1 (strictly sequential)
    pub fn new(mapper: SchemaMapper) -> Self {
        Self {
            mapper,
            policy: FailurePolicy::AbortRun,
            executor: HarvesterExecutor::new(1),
        }
    }

    /// Builds a coordinator over the unified schema with settings from
    /// `config`.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] if the unified schema fails to build.
    pub fn from_config(config: &HarvestConfig) -> Result<Self, PathError> {
        let mapper = SchemaMapper::new(Schema::unified()?)
            .with_ambiguity_detection(config.harvest.detect_ambiguity);
        Ok(Self::new(mapper)
            .with_policy(config.harvest.failure_policy)
            .with_concurrency(config.harvest.max_concurrent_sources))
    }

    /// Sets the failure policy.
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets how many sources may be harvested at once.
    ///
    /// # Arguments
    ///
    /// * `limit` - Maximum concurrent sources; values below 1 mean 1
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.executor = HarvesterExecutor::new(limit);
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn mapper(&self) -> &SchemaMapper {
        &self.mapper
    }

    /// Harvests every source and normalizes the records into one batch.
    ///
    /// Each source's records are deduplicated on its identity key, mapped
    /// through the unified schema and tagged with the source name. Events
    /// appear in source order, then in harvest order within a source.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SourceFailed`] under
    /// [`FailurePolicy::AbortRun`] when any source fails, and
    /// [`PipelineError::Join`] if a concurrent source task panics.
    pub async fn run(
        &self,
        sources: &[Arc<dyn EventSource>],
        params: &HarvestParams,
    ) -> Result<HarvestResult, PipelineError> {
        let start = Instant::now();
        let params = Arc::new(params.clone());
        let mut events = Vec::new();
        let mut stats = HarvestStats::default();

        info!(
            sources = sources.len(),
            policy = ?self.policy,
            concurrency = self.executor.limit(),
            "Starting harvest run"
        );

        if self.executor.limit() <= 1 || sources.len() <= 1 {
            for source in sources {
                let source_start = Instant::now();
                let outcome = self
                    .executor
                    .execute(Arc::clone(source), Arc::clone(&params))
                    .await;
                self.absorb(
                    source.as_ref(),
                    outcome,
                    elapsed_ms(source_start),
                    &mut events,
                    &mut stats,
                )?;
            }
        } else {
            let outcomes = self.run_concurrent(sources, &params).await?;
            for (source, slot) in sources.iter().zip(outcomes) {
                if let Some((outcome, duration_ms)) = slot {
                    self.absorb(source.as_ref(), outcome, duration_ms, &mut events, &mut stats)?;
                }
            }
        }

        stats.total_duration_ms = elapsed_ms(start);
        let batch = HarvestBatch::new(events);

        info!(
            events = batch.len(),
            failed = stats.failed_sources().count(),
            duration_ms = stats.total_duration_ms,
            "Harvest run completed"
        );

        Ok(HarvestResult { batch, stats })
    }

    /// Runs every source on its own task and returns outcomes indexed by
    /// source position.
    async fn run_concurrent(
        &self,
        sources: &[Arc<dyn EventSource>],
        params: &Arc<HarvestParams>,
    ) -> Result<Vec<Option<SourceOutcome>>, PipelineError> {
        let mut tasks = JoinSet::new();
        for (index, source) in sources.iter().enumerate() {
            let executor = self.executor.clone();
            let source = Arc::clone(source);
            let params = Arc::clone(params);
            tasks.spawn(async move {
                let source_start = Instant::now();
                let outcome = executor.execute(source, params).await;
                (index, outcome, elapsed_ms(source_start))
            });
        }

        let mut outcomes: Vec<Option<SourceOutcome>> = sources.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (index, outcome, duration_ms) =
                joined.map_err(|e| PipelineError::Join(e.to_string()))?;
            outcomes[index] = Some((outcome, duration_ms));
        }
        Ok(outcomes)
    }

    /// Folds one source's outcome into the run, applying the failure policy.
    fn absorb(
        &self,
        source: &dyn EventSource,
        outcome: Result<SourceHarvest, HarvestError>,
        duration_ms: u64,
        events: &mut Vec<UnifiedEvent>,
        stats: &mut HarvestStats,
    ) -> Result<(), PipelineError> {
        let name = source.name();

        let harvest = match outcome {
            Ok(harvest) => harvest,
            Err(error) => {
                stats.sources.push(SourceReport {
                    name: name.to_string(),
                    pages_fetched: 0,
                    records: 0,
                    duplicates_removed: 0,
                    duration_ms,
                    error: Some(error.to_string()),
                });

                return match self.policy {
                    FailurePolicy::AbortRun => {
                        error!(source = name, error = %error, "Source failed, aborting run");
                        Err(PipelineError::SourceFailed {
                            source_name: name.to_string(),
                            error,
                        })
                    }
                    FailurePolicy::SkipSource => {
                        warn!(source = name, error = %error, "Source failed, skipping");
                        Ok(())
                    }
                };
            }
        };

        let fetched = harvest.records.len();
        let records = match source.identity_key() {
            Some(key) => dedupe(harvest.records, key),
            None => harvest.records,
        };
        let duplicates_removed = fetched - records.len();
        if duplicates_removed > 0 {
            debug!(source = name, duplicates_removed, "Dropped repeated records");
        }

        events.extend(self.mapper.map_all(&records, name));
        stats.sources.push(SourceReport {
            name: name.to_string(),
            pages_fetched: harvest.pages_fetched,
            records: records.len(),
            duplicates_removed,
            duration_ms,
            error: None,
        });
        Ok(())
    }
}

type SourceOutcome = (Result<SourceHarvest, HarvestError>, u64);

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Runs a harvest under `lock` and persists the batch to `store`.
///
/// # Errors
///
/// Returns [`PipelineError::AlreadyRunning`] if `lock` is held, otherwise any
/// error from the run or from saving the batch. The lock is released on every
/// path.
pub async fn harvest_and_store(
    coordinator: &HarvestCoordinator,
    sources: &[Arc<dyn EventSource>],
    params: &HarvestParams,
    store: &dyn BatchStore,
    lock: &RunLock,
) -> Result<HarvestResult, PipelineError> {
    let _guard = lock.try_acquire().ok_or(PipelineError::AlreadyRunning)?;

    let result = coordinator.run(sources, params).await?;
    let location = store.save(&result.batch).await?;

    info!(location = %location, events = result.batch.len(), "Harvest stored");
    Ok(result)
}

// ============================================================================
// Tests
// ============================================================================
