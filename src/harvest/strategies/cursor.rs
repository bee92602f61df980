use tracing::warn;

use super::PageDriver;
use crate::harvest::traits::HarvestError;
use crate::model::RawRecord;

/// Follows `end_cursor` while the source reports more pages and hands back a
/// non-empty cursor.
pub(super) async fn run(
    driver: &mut PageDriver<'_>,
    max_pages: u32,
) -> Result<Vec<RawRecord>, HarvestError> {
    let mut records = Vec::new();
    let mut cursor: Option<String> = None;

    for page in 1..=max_pages {
        let fetched = driver.fetch(page, cursor.take()).await?;
        let info = fetched
            .cursor
            .ok_or_else(|| driver.missing(page, "cursor page info"))?;
        records.extend(fetched.records);

        match info.next_cursor() {
            Some(next) => cursor = Some(next.to_string()),
            None => return Ok(records),
        }
    }

    warn!(
        source = driver.source_name(),
        max_pages, "Page limit reached while the source still reports more pages"
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use crate::config::HarvestParams;
    use crate::harvest::replay::ReplaySource;
    use crate::harvest::strategies::SourceHarvester;
    use crate::harvest::traits::{HarvestError, Page, Pagination};
    use serde_json::json;

    #[tokio::test]
    async fn test_follows_cursor_until_exhausted() {
        let source = ReplaySource::new("Meetup", Pagination::Cursor)
            .then_page(Page::new(vec![json!({"id": 1})]).with_cursor(true, "c1"))
            .then_page(Page::new(vec![json!({"id": 2})]).with_cursor(true, "c2"))
            .then_page(Page::new(vec![json!({"id": 3})]).with_cursor(false, ""));

        let harvest = SourceHarvester::new(&source, &HarvestParams::default())
            .harvest()
            .await
            .unwrap();

        assert_eq!(harvest.records.len(), 3);
        let cursors: Vec<Option<String>> =
            source.requests().into_iter().map(|r| r.cursor).collect();
        assert_eq!(
            cursors,
            vec![None, Some("c1".to_string()), Some("c2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_empty_cursor_stops_despite_has_next() {
        let source = ReplaySource::new("Meetup", Pagination::Cursor)
            .then_page(Page::new(vec![json!({"id": 1})]).with_cursor(true, ""))
            .then_page(Page::new(vec![json!({"id": 2})]).with_cursor(false, ""));

        let harvest = SourceHarvester::new(&source, &HarvestParams::default())
            .harvest()
            .await
            .unwrap();

        assert_eq!(source.calls(), 1);
        assert_eq!(harvest.records, vec![json!({"id": 1})]);
    }

    #[tokio::test]
    async fn test_max_pages_bounds_loop() {
        let mut source = ReplaySource::new("Meetup", Pagination::Cursor);
        for i in 0..10 {
            source = source
                .then_page(Page::new(vec![json!({ "id": i })]).with_cursor(true, format!("c{i}")));
        }
        let params = HarvestParams {
            max_pages: 4,
            ..HarvestParams::default()
        };

        let harvest = SourceHarvester::new(&source, &params)
            .harvest()
            .await
            .unwrap();

        assert_eq!(source.calls(), 4);
        assert_eq!(harvest.records.len(), 4);
    }

    #[tokio::test]
    async fn test_missing_page_info_fails() {
        let source = ReplaySource::new("Meetup", Pagination::Cursor)
            .then_page(Page::new(vec![json!({"id": 1})]));

        let err = SourceHarvester::new(&source, &HarvestParams::default())
            .harvest()
            .await
            .unwrap_err();

        assert!(matches!(err, HarvestError::MissingContinuation { page: 1, .. }));
    }
}
