use tracing::warn;

use super::PageDriver;
use crate::harvest::traits::HarvestError;
use crate::model::RawRecord;

/// Requests pages 1, 2, ... until the reported page count is reached or the
/// page index hits `ceiling`.
pub(super) async fn run(
    driver: &mut PageDriver<'_>,
    ceiling: u32,
) -> Result<Vec<RawRecord>, HarvestError> {
    let mut records = Vec::new();
    let mut page = 1;

    while page < ceiling {
        let fetched = driver.fetch(page, None).await?;
        let page_count = fetched
            .page_count
            .ok_or_else(|| driver.missing(page, "page_count"))?;
        records.extend(fetched.records);

        if page_count <= page {
            return Ok(records);
        }
        page += 1;
    }

    warn!(
        source = driver.source_name(),
        ceiling, "Page ceiling reached before the last reported page"
    );
    Ok(records)
}
