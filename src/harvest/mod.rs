//! Harvest module - multi-source event harvesting pipeline.
//!
//! This module provides the core abstractions for the event harvester:
//! - **Traits**: [`EventSource`] and [`Pagination`] describe a source and how it pages
//! - **Strategies**: [`SourceHarvester`] drives page-count, cursor and date-threshold loops
//! - **Dedup**: [`dedupe`] drops repeated records within one source
//! - **Pipeline**: [`HarvestCoordinator`] runs all sources into one batch

pub mod dedup;
pub mod envelope;
pub mod lock;
pub mod pipeline;
pub mod replay;
pub mod strategies;
pub mod traits;

// Re-export commonly used types
pub use traits::{
    CursorInfo, EventSource, FetchError, HarvestError, Page, PageRequest, Pagination,
    DEFAULT_PAGE_CEILING,
};

pub use dedup::{dedupe, dedupe_by};
pub use envelope::PageEnvelope;
pub use lock::{RunGuard, RunLock};
pub use pipeline::{
    harvest_and_store, HarvestCoordinator, HarvestResult, HarvestStats, PipelineError,
    SourceReport,
};
pub use replay::ReplaySource;
pub use strategies::{parse_event_date, SourceHarvest, SourceHarvester};
