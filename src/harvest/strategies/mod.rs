//! Per-source harvesting loops.
//!
//! [`SourceHarvester`] drives one [`EventSource`] through its [`Pagination`]
//! strategy, once per geo-scope when the source is geo-scoped. Every page
//! fetch is wrapped in the run's fetch timeout.
//!
//! A source harvest is all-or-nothing: any error aborts the loop and the
//! records gathered so far are dropped with it.

mod cursor;
mod date_threshold;
mod page_count;

pub use date_threshold::parse_event_date;

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::HarvestParams;
use crate::harvest::traits::{EventSource, HarvestError, Page, PageRequest, Pagination};
use crate::model::{Location, RawRecord};
use crate::schema::path::PathExpr;

/// Records collected from one source, in harvest order, before deduplication.
#[derive(Debug, Default)]
pub struct SourceHarvest {
    pub records: Vec<RawRecord>,
    pub pages_fetched: u32,
}

/// Runs one source's pagination loop.
pub struct SourceHarvester<'a> {
    source: &'a dyn EventSource,
    params: &'a HarvestParams,
}

impl<'a> SourceHarvester<'a> {
    pub fn new(source: &'a dyn EventSource, params: &'a HarvestParams) -> Self {
        Self { source, params }
    }

    /// Harvests every page of the source.
    ///
    /// Geo-scoped sources repeat the whole loop for each configured location
    /// and concatenate the results in location order.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError`] on the first failed or timed-out fetch, on a
    /// page missing the continuation metadata its strategy needs, on an
    /// out-of-range look-ahead, on a record without a readable date, or on an
    /// unparsable date path. No partial records are returned.
    pub async fn harvest(&self) -> Result<SourceHarvest, HarvestError> {
        let pagination = self.source.pagination();
        let mut harvest = SourceHarvest::default();

        if !self.source.is_geo_scoped() {
            self.harvest_scope(&pagination, None, &mut harvest).await?;
            return Ok(harvest);
        }

        let locations = &self.params.locations;
        if locations.is_empty() {
            warn!(
                source = self.source.name(),
                "Geo-scoped source has no locations configured"
            );
        }
        for (i, location) in locations.iter().enumerate() {
            info!(
                source = self.source.name(),
                location = %location.name,
                progress = %format!("{}/{}", i + 1, locations.len()),
                "Harvesting location"
            );
            self.harvest_scope(&pagination, Some(location), &mut harvest)
                .await?;
        }
        Ok(harvest)
    }

    async fn harvest_scope(
        &self,
        pagination: &Pagination,
        location: Option<&Location>,
        harvest: &mut SourceHarvest,
    ) -> Result<(), HarvestError> {
        let mut driver = PageDriver::new(self.source, location, self.params.fetch_timeout);

        let records = match pagination {
            Pagination::Single => driver.fetch(1, None).await?.records,
            Pagination::PageCount { ceiling } => page_count::run(&mut driver, *ceiling).await?,
            Pagination::Cursor => cursor::run(&mut driver, self.params.max_pages).await?,
            Pagination::DateThreshold {
                date_path,
                look_ahead_days,
            } => {
                let date_path = PathExpr::parse(date_path)?;
                let horizon = self.params.horizon(*look_ahead_days).ok_or_else(|| {
                    HarvestError::InvalidLookAhead {
                        source_name: self.source.name().to_string(),
                        days: look_ahead_days.unwrap_or(self.params.look_ahead_days),
                    }
                })?;
                date_threshold::run(&mut driver, &date_path, horizon, self.params.max_pages)
                    .await?
            }
        };

        debug!(
            source = self.source.name(),
            strategy = pagination.strategy_name(),
            records = records.len(),
            pages = driver.pages_fetched,
            "Scope harvested"
        );
        harvest.records.extend(records);
        harvest.pages_fetched += driver.pages_fetched;
        Ok(())
    }
}

// ============================================================================
// Page Driver
// ============================================================================

/// Issues page requests for one scope and converts failures into
/// [`HarvestError`]s carrying the source name and page index.
pub(crate) struct PageDriver<'a> {
    source: &'a dyn EventSource,
    location: Option<&'a Location>,
    fetch_timeout: Duration,
    pages_fetched: u32,
}

impl<'a> PageDriver<'a> {
    fn new(
        source: &'a dyn EventSource,
        location: Option<&'a Location>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            source,
            location,
            fetch_timeout,
            pages_fetched: 0,
        }
    }

    fn source_name(&self) -> &str {
        self.source.name()
    }

    async fn fetch(&mut self, page: u32, cursor: Option<String>) -> Result<Page, HarvestError> {
        let request = PageRequest {
            page,
            cursor,
            location: self.location.cloned(),
        };
        debug!(
            source = self.source.name(),
            page,
            cursor = request.cursor.as_deref().unwrap_or(""),
            "Fetching page"
        );

        let fetched = timeout(self.fetch_timeout, self.source.fetch_page(&request))
            .await
            .map_err(|_| HarvestError::Timeout {
                source_name: self.source.name().to_string(),
                page,
                timeout_secs: self.fetch_timeout.as_secs(),
            })?
            .map_err(|error| HarvestError::Fetch {
                source_name: self.source.name().to_string(),
                page,
                error,
            })?;

        self.pages_fetched += 1;
        Ok(fetched)
    }

    fn missing(&self, page: u32, expected: &'static str) -> HarvestError {
        HarvestError::MissingContinuation {
            source_name: self.source.name().to_string(),
            page,
            expected,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::replay::ReplaySource;
    use crate::harvest::traits::FetchError;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn params() -> HarvestParams {
        HarvestParams {
            reference_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            look_ahead_days: 3,
            locations: vec![
                Location::new("Ukraine", 50.45, 30.52, 300),
                Location::new("Poland", 52.23, 21.01, 200),
            ],
            fetch_timeout: Duration::from_secs(5),
            max_pages: 20,
        }
    }

    fn records(ids: &[i64]) -> Vec<RawRecord> {
        ids.iter().map(|id| json!({ "id": id })).collect()
    }

    #[tokio::test]
    async fn test_single_fetches_once() {
        let source = ReplaySource::new("ConfTech", Pagination::Single)
            .then_page(Page::new(records(&[1, 2])))
            .then_page(Page::new(records(&[3])));

        let harvest = SourceHarvester::new(&source, &params()).harvest().await.unwrap();

        assert_eq!(harvest.records, records(&[1, 2]));
        assert_eq!(harvest.pages_fetched, 1);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_geo_scoped_repeats_per_location() {
        let source = ReplaySource::new("Meetup", Pagination::Single)
            .geo_scoped()
            .then_page(Page::new(records(&[1])))
            .then_page(Page::new(records(&[2])));

        let harvest = SourceHarvester::new(&source, &params()).harvest().await.unwrap();

        assert_eq!(harvest.records, records(&[1, 2]));
        let requests = source.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].location.as_ref().unwrap().name, "Ukraine");
        assert_eq!(requests[1].location.as_ref().unwrap().name, "Poland");
    }

    #[tokio::test]
    async fn test_geo_scoped_without_locations_fetches_nothing() {
        let source = ReplaySource::new("Meetup", Pagination::Single)
            .geo_scoped()
            .then_page(Page::new(records(&[1])));
        let mut params = params();
        params.locations.clear();

        let harvest = SourceHarvester::new(&source, &params).harvest().await.unwrap();

        assert!(harvest.records.is_empty());
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_geo_scoped_cursor_restarts_per_location() {
        let source = ReplaySource::new("Meetup", Pagination::Cursor)
            .geo_scoped()
            .then_page(Page::new(records(&[1])).with_cursor(true, "ua-1"))
            .then_page(Page::new(records(&[2])).with_cursor(false, ""))
            .then_page(Page::new(records(&[3])).with_cursor(true, "pl-1"))
            .then_page(Page::new(records(&[4])).with_cursor(false, ""));

        let harvest = SourceHarvester::new(&source, &params()).harvest().await.unwrap();

        assert_eq!(harvest.records, records(&[1, 2, 3, 4]));
        assert_eq!(harvest.pages_fetched, 4);
        let requests: Vec<(String, u32, Option<String>)> = source
            .requests()
            .into_iter()
            .map(|r| (r.location.unwrap().name, r.page, r.cursor))
            .collect();
        assert_eq!(
            requests,
            vec![
                ("Ukraine".to_string(), 1, None),
                ("Ukraine".to_string(), 2, Some("ua-1".to_string())),
                ("Poland".to_string(), 1, None),
                ("Poland".to_string(), 2, Some("pl-1".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_out_of_range_look_ahead_fails_source() {
        for days in [-1, 200_000_000, i64::MAX] {
            let pagination = Pagination::DateThreshold {
                date_path: "startDate".to_string(),
                look_ahead_days: Some(days),
            };
            let source = ReplaySource::new("Eventyco", pagination)
                .then_page(Page::new(vec![json!({"startDate": "2024-01-01"})]));

            let err = SourceHarvester::new(&source, &params())
                .harvest()
                .await
                .unwrap_err();

            assert!(
                matches!(err, HarvestError::InvalidLookAhead { days: d, .. } if d == days),
                "days {days}: {err}"
            );
            assert_eq!(source.calls(), 0);
        }
    }

    #[tokio::test]
    async fn test_failure_discards_partial_records() {
        let source = ReplaySource::new("Eventbrite", Pagination::page_count())
            .then_page(Page::new(records(&[1])).with_page_count(3))
            .then_fail(FetchError::Status {
                status: 500,
                url: "https://example.test/p2".to_string(),
            });

        let err = SourceHarvester::new(&source, &params())
            .harvest()
            .await
            .unwrap_err();

        assert!(matches!(err, HarvestError::Fetch { page: 2, .. }));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let source = ReplaySource::new("Slow", Pagination::Single)
            .with_delay(Duration::from_millis(200))
            .then_page(Page::new(records(&[1])));
        let mut params = params();
        params.fetch_timeout = Duration::from_millis(20);

        let err = SourceHarvester::new(&source, &params)
            .harvest()
            .await
            .unwrap_err();

        assert!(matches!(err, HarvestError::Timeout { page: 1, .. }));
    }

    #[tokio::test]
    async fn test_invalid_date_path() {
        let source = ReplaySource::new("Eventyco", Pagination::date_threshold("dates[x]"));

        let err = SourceHarvester::new(&source, &params())
            .harvest()
            .await
            .unwrap_err();

        assert!(matches!(err, HarvestError::InvalidPath(_)));
        assert_eq!(source.calls(), 0);
    }
}
