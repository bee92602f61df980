//! Core traits and types for multi-source harvesting.
//!
//! This module defines the contract between the harvester and the outside world:
//! - Source abstraction via [`EventSource`] (the fetch collaborator)
//! - Pagination policy via [`Pagination`]
//! - Page exchange types [`PageRequest`], [`Page`], [`CursorInfo`]
//! - Standardized error handling for fetches and source loops

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Location, RawRecord};
use crate::schema::path::PathError;

// ============================================================================
// Source Trait
// ============================================================================

/// One independent origin of event records.
///
/// Implementations own all transport and site-specific parsing: they turn a
/// [`PageRequest`] into a [`Page`] of raw records. The harvester only drives
/// the loop according to [`EventSource::pagination`].
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so independent sources can be
/// harvested on separate tasks.
///
/// # Examples
///
/// ```ignore
/// struct ConfTech { client: HttpClient }
///
/// #[async_trait]
/// impl EventSource for ConfTech {
///     fn name(&self) -> &str {
///         "ConfTech"
///     }
///
///     fn pagination(&self) -> Pagination {
///         Pagination::Single
///     }
///
///     async fn fetch_page(&self, _request: &PageRequest) -> Result<Page, FetchError> {
///         let body = self.client.search().await?;
///         Ok(Page::new(body["results"][0]["hits"].as_array().cloned().unwrap_or_default()))
///     }
/// }
/// ```
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Source name, copied into every unified event's `source` field.
    fn name(&self) -> &str;

    /// Pagination and termination policy for this source.
    fn pagination(&self) -> Pagination;

    /// Path of the identity field used to drop repeated records.
    ///
    /// Default: `None` (no deduplication).
    fn identity_key(&self) -> Option<&str> {
        None
    }

    /// Whether the whole loop repeats once per configured [`Location`].
    fn is_geo_scoped(&self) -> bool {
        false
    }

    /// Fetches one page.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on transport failure, non-success status or a
    /// malformed body. The harvester aborts this source's loop on any error.
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError>;
}

// ============================================================================
// Pagination
// ============================================================================

/// Default exclusive ceiling on the page index for page-count sources.
pub const DEFAULT_PAGE_CEILING: u32 = 15;

/// How a source's page loop advances and when it stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Pagination {
    /// One request, no continuation
    Single,

    /// Page index loop bounded by the `page_count` the source reports.
    ///
    /// The page index never reaches `ceiling`, so at most `ceiling - 1`
    /// pages are fetched.
    PageCount { ceiling: u32 },

    /// Opaque cursor loop driven by `has_next_page` and `end_cursor`
    Cursor,

    /// Page index loop for sources without pagination metadata. Stops at the
    /// first record dated after the look-ahead horizon day; fails on a record
    /// with no readable date.
    DateThreshold {
        /// Path expression locating the record's start date
        date_path: String,

        /// Per-source horizon in days; falls back to the run's look-ahead.
        /// Must lie within `0..=MAX_LOOK_AHEAD_DAYS`.
        look_ahead_days: Option<i64>,
    },
}

impl Pagination {
    pub fn page_count() -> Self {
        Pagination::PageCount {
            ceiling: DEFAULT_PAGE_CEILING,
        }
    }

    pub fn date_threshold(date_path: impl Into<String>) -> Self {
        Pagination::DateThreshold {
            date_path: date_path.into(),
            look_ahead_days: None,
        }
    }

    /// Short name used in logs.
    pub fn strategy_name(&self) -> &'static str {
        match self {
            Pagination::Single => "single",
            Pagination::PageCount { .. } => "page_count",
            Pagination::Cursor => "cursor",
            Pagination::DateThreshold { .. } => "date_threshold",
        }
    }
}

// ============================================================================
// Page Exchange
// ============================================================================

/// Continuation state handed to [`EventSource::fetch_page`].
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    /// 1-based page index
    pub page: u32,

    /// Cursor returned by the previous page, `None` on the first request
    pub cursor: Option<String>,

    /// Geo-scope for geo-scoped sources
    pub location: Option<Location>,
}

impl PageRequest {
    pub fn first(location: Option<Location>) -> Self {
        Self {
            page: 1,
            cursor: None,
            location,
        }
    }
}

/// Cursor continuation metadata reported by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

impl CursorInfo {
    /// The cursor to request next, if the loop should continue.
    ///
    /// An empty cursor ends the loop even when `has_next_page` is set.
    pub fn next_cursor(&self) -> Option<&str> {
        if !self.has_next_page {
            return None;
        }
        self.end_cursor.as_deref().filter(|c| !c.is_empty())
    }
}

/// One fetched page of raw records plus optional continuation metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<RawRecord>,

    /// Total pages reported by page-count sources
    pub page_count: Option<u32>,

    /// Continuation reported by cursor sources
    pub cursor: Option<CursorInfo>,
}

impl Page {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn with_page_count(mut self, page_count: u32) -> Self {
        self.page_count = Some(page_count);
        self
    }

    pub fn with_cursor(mut self, has_next_page: bool, end_cursor: impl Into<String>) -> Self {
        self.cursor = Some(CursorInfo {
            has_next_page,
            end_cursor: Some(end_cursor.into()),
        });
        self
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Failures raised by the fetch collaborator.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Connection, DNS, TLS or similar transport failure
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Body could not be interpreted
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// JSON decoding failed
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that abort one source's harvesting loop.
///
/// Records accumulated before the error are discarded for the whole source.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// Page fetch failed
    #[error("Source '{source_name}' failed on page {page}: {error}")]
    Fetch {
        source_name: String,
        page: u32,
        #[source]
        error: FetchError,
    },

    /// Page fetch exceeded the per-page timeout
    #[error("Source '{source_name}' timed out on page {page} after {timeout_secs}s")]
    Timeout {
        source_name: String,
        page: u32,
        timeout_secs: u64,
    },

    /// Page lacks the metadata its pagination strategy depends on
    #[error("Source '{source_name}' page {page} is missing {expected}")]
    MissingContinuation {
        source_name: String,
        page: u32,
        expected: &'static str,
    },

    /// Look-ahead outside `0..=MAX_LOOK_AHEAD_DAYS` or past the calendar range
    #[error("Source '{source_name}' has an invalid look-ahead of {days} days")]
    InvalidLookAhead { source_name: String, days: i64 },

    /// A date-threshold record has a missing or unreadable start date
    #[error("Source '{source_name}' page {page} has a record without a readable date at '{date_path}'")]
    UnreadableDate {
        source_name: String,
        page: u32,
        date_path: String,
    },

    /// Strategy configuration holds an unparsable path
    #[error("Invalid path in pagination config: {0}")]
    InvalidPath(#[from] PathError),

    /// Executor could not schedule the source
    #[error("Executor unavailable: {0}")]
    Executor(String),
}

// ============================================================================
// Tests
// ============================================================================
