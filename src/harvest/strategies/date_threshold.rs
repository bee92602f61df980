use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::PageDriver;
use crate::harvest::traits::HarvestError;
use crate::model::RawRecord;
use crate::schema::path::PathExpr;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Requests pages 1, 2, ... and keeps records until one starts on a UTC day
/// after `horizon`. That record and everything after it are excluded. An empty
/// page also ends the loop.
///
/// # Errors
///
/// Returns [`HarvestError::UnreadableDate`] when a record has no start date
/// at `date_path` or it cannot be parsed, plus any fetch error.
pub(super) async fn run(
    driver: &mut PageDriver<'_>,
    date_path: &PathExpr,
    horizon: NaiveDate,
    max_pages: u32,
) -> Result<Vec<RawRecord>, HarvestError> {
    let mut records = Vec::new();

    for page in 1..=max_pages {
        let fetched = driver.fetch(page, None).await?;
        if fetched.records.is_empty() {
            debug!(source = driver.source_name(), page, "Empty page, stopping");
            return Ok(records);
        }

        for record in fetched.records {
            match record_date(&record, date_path) {
                Some(date) if date.date_naive() <= horizon => records.push(record),
                Some(date) => {
                    info!(
                        source = driver.source_name(),
                        page,
                        %date,
                        %horizon,
                        "Reached look-ahead horizon"
                    );
                    return Ok(records);
                }
                None => {
                    return Err(HarvestError::UnreadableDate {
                        source_name: driver.source_name().to_string(),
                        page,
                        date_path: date_path.to_string(),
                    });
                }
            }
        }
    }

    warn!(
        source = driver.source_name(),
        max_pages, "Page limit reached before the look-ahead horizon"
    );
    Ok(records)
}

fn record_date(record: &RawRecord, date_path: &PathExpr) -> Option<DateTime<Utc>> {
    match date_path.evaluate(record)? {
        Value::String(text) => parse_event_date(&text),
        Value::Number(n) => Utc.timestamp_opt(n.as_i64()?, 0).single(),
        _ => None,
    }
}

/// Parses the date formats event sources publish.
///
/// Accepts RFC 3339, offset timestamps without seconds, naive date-times with
/// `T` or space separators and bare dates. Naive values are taken as UTC.
pub fn parse_event_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(date) = DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M%:z") {
        return Some(date.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}
