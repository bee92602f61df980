//! Offline [`EventSource`] that replays scripted responses.
//!
//! Used for tests and for re-running a harvest against captured responses
//! without network access. Each `fetch_page` call consumes the next scripted
//! entry; once the script is exhausted every call returns an empty page.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::harvest::envelope::PageEnvelope;
use crate::harvest::traits::{EventSource, FetchError, Page, PageRequest, Pagination};

pub struct ReplaySource {
    name: String,
    pagination: Pagination,
    identity_key: Option<String>,
    geo_scoped: bool,
    delay: Option<Duration>,
    script: Mutex<VecDeque<Result<Page, FetchError>>>,
    requests: Mutex<Vec<PageRequest>>,
}

impl ReplaySource {
    pub fn new(name: impl Into<String>, pagination: Pagination) -> Self {
        Self {
            name: name.into(),
            pagination,
            identity_key: None,
            geo_scoped: false,
            delay: None,
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Builds a source whose pages are extracted from raw response bodies.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Malformed`] if any body does not fit `envelope`.
    pub fn from_responses(
        name: impl Into<String>,
        pagination: Pagination,
        envelope: &PageEnvelope,
        responses: &[Value],
    ) -> Result<Self, FetchError> {
        let mut source = Self::new(name, pagination);
        for body in responses {
            source = source.then_page(envelope.extract(body)?);
        }
        Ok(source)
    }

    /// Loads captured response bodies from a JSON file holding an array.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the file cannot be read, is not a JSON array,
    /// or a body does not fit `envelope`.
    pub async fn from_fixture(
        name: impl Into<String>,
        pagination: Pagination,
        envelope: &PageEnvelope,
        path: &Path,
    ) -> Result<Self, FetchError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| FetchError::Transport(format!("{}: {e}", path.display())))?;
        let responses: Vec<Value> = serde_json::from_str(&raw)?;
        Self::from_responses(name, pagination, envelope, &responses)
    }

    pub fn with_identity_key(mut self, key: impl Into<String>) -> Self {
        self.identity_key = Some(key.into());
        self
    }

    pub fn geo_scoped(mut self) -> Self {
        self.geo_scoped = true;
        self
    }

    /// Delays every response, for timeout and concurrency scenarios.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn then_page(self, page: Page) -> Self {
        self.push(Ok(page));
        self
    }

    pub fn then_fail(self, error: FetchError) -> Self {
        self.push(Err(error));
        self
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn push(&self, entry: Result<Page, FetchError>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(entry);
    }
}

#[async_trait]
impl EventSource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn pagination(&self) -> Pagination {
        self.pagination.clone()
    }

    fn identity_key(&self) -> Option<&str> {
        self.identity_key.as_deref()
    }

    fn is_geo_scoped(&self) -> bool {
        self.geo_scoped
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        next.unwrap_or_else(|| Ok(Page::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_replays_in_order_then_empty() {
        let source = ReplaySource::new("ConfTech", Pagination::Single)
            .then_page(Page::new(vec![json!({"id": 1})]))
            .then_fail(FetchError::Transport("reset".to_string()));

        let first = source.fetch_page(&PageRequest::first(None)).await.unwrap();
        assert_eq!(first.records.len(), 1);
        assert!(source.fetch_page(&PageRequest::first(None)).await.is_err());
        let after = source.fetch_page(&PageRequest::first(None)).await.unwrap();
        assert!(after.records.is_empty());
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_from_fixture_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meetup.json");
        let bodies = json!([
            {"edges": [{"node": {"id": "1"}}], "pageInfo": {"hasNextPage": true, "endCursor": "c"}},
            {"edges": [{"node": {"id": "2"}}], "pageInfo": {"hasNextPage": false, "endCursor": null}}
        ]);
        tokio::fs::write(&path, bodies.to_string()).await.unwrap();
        let envelope = PageEnvelope::records_at("edges")
            .with_record_inner("node")
            .with_cursor("pageInfo.hasNextPage", "pageInfo.endCursor");

        let source = ReplaySource::from_fixture("Meetup", Pagination::Cursor, &envelope, &path)
            .await
            .unwrap();

        let page = source.fetch_page(&PageRequest::first(None)).await.unwrap();
        assert_eq!(page.records, vec![json!({"id": "1"})]);
        assert_eq!(page.cursor.unwrap().next_cursor(), Some("c"));
    }
}
