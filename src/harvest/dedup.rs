//! Per-source duplicate removal.
//!
//! The first occurrence of an identity value wins and relative order of the
//! survivors is preserved. Records without an identity value cannot be
//! compared and are always kept.

use std::collections::HashSet;
use std::hash::Hash;

use tracing::warn;

use crate::model::RawRecord;
use crate::schema::path::PathExpr;

/// Drops records whose value at `identity_key` was already seen.
///
/// Identity values are compared by their JSON text, so `1` and `"1"` are
/// distinct. An unparsable `identity_key` leaves the records untouched.
pub fn dedupe(records: Vec<RawRecord>, identity_key: &str) -> Vec<RawRecord> {
    match PathExpr::parse(identity_key) {
        Ok(expr) => dedupe_by(records, |record| {
            expr.evaluate(record).map(|value| value.to_string())
        }),
        Err(e) => {
            warn!(identity_key, error = %e, "Invalid identity key, skipping deduplication");
            records
        }
    }
}

/// Keeps the first item for each key. Items whose key is `None` are kept.
pub fn dedupe_by<T, K, F>(items: Vec<T>, mut key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: FnMut(&T) -> Option<K>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| match key(item) {
            Some(k) => seen.insert(k),
            None => true,
        })
        .collect()
}
