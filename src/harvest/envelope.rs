//! Declarative extraction of records and continuation metadata from a raw
//! response body.
//!
//! Sources that receive JSON can describe where their records live instead of
//! hand-writing the unwrapping, e.g. a GraphQL connection:
//!
//! ```ignore
//! let envelope = PageEnvelope::records_at("data.keywordSearch.edges")
//!     .with_record_inner("node")
//!     .with_cursor(
//!         "data.keywordSearch.pageInfo.hasNextPage",
//!         "data.keywordSearch.pageInfo.endCursor",
//!     );
//! let page = envelope.extract(&body)?;
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::harvest::traits::{CursorInfo, FetchError, Page};
use crate::schema::path::PathExpr;

/// Paths locating a page's parts inside a response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageEnvelope {
    /// Path to the list of records
    pub records: String,

    /// Path applied to each list item to reach the record itself
    #[serde(default)]
    pub record_inner: Option<String>,

    /// Path to the total page count
    #[serde(default)]
    pub page_count: Option<String>,

    /// Path to the "more pages" flag
    #[serde(default)]
    pub has_next_page: Option<String>,

    /// Path to the continuation cursor
    #[serde(default)]
    pub end_cursor: Option<String>,
}

impl PageEnvelope {
    pub fn records_at(path: impl Into<String>) -> Self {
        Self {
            records: path.into(),
            record_inner: None,
            page_count: None,
            has_next_page: None,
            end_cursor: None,
        }
    }

    pub fn with_record_inner(mut self, path: impl Into<String>) -> Self {
        self.record_inner = Some(path.into());
        self
    }

    pub fn with_page_count(mut self, path: impl Into<String>) -> Self {
        self.page_count = Some(path.into());
        self
    }

    pub fn with_cursor(
        mut self,
        has_next_page: impl Into<String>,
        end_cursor: impl Into<String>,
    ) -> Self {
        self.has_next_page = Some(has_next_page.into());
        self.end_cursor = Some(end_cursor.into());
        self
    }

    /// Builds a [`Page`] from `body`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Malformed`] when a configured path is unparsable,
    /// the record list is missing or not a list, a list item lacks the inner
    /// record, or configured continuation metadata is absent. A `null`
    /// end cursor is not an error.
    pub fn extract(&self, body: &Value) -> Result<Page, FetchError> {
        let items = match evaluate(&self.records, body)? {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(FetchError::Malformed(format!(
                    "no record list at '{}'",
                    self.records
                )))
            }
        };

        let records = match &self.record_inner {
            None => items,
            Some(inner) => items
                .iter()
                .map(|item| {
                    evaluate(inner, item)?.ok_or_else(|| {
                        FetchError::Malformed(format!("list item without '{inner}'"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        let page_count = match &self.page_count {
            None => None,
            Some(path) => {
                let count = evaluate(path, body)?
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| {
                        FetchError::Malformed(format!("no page count at '{path}'"))
                    })?;
                Some(u32::try_from(count).unwrap_or(u32::MAX))
            }
        };

        let cursor = match &self.has_next_page {
            None => None,
            Some(path) => {
                let has_next_page = evaluate(path, body)?
                    .and_then(|v| v.as_bool())
                    .ok_or_else(|| {
                        FetchError::Malformed(format!("no has-next flag at '{path}'"))
                    })?;
                let end_cursor = match &self.end_cursor {
                    Some(path) => evaluate(path, body)?.map(|v| match v {
                        Value::String(text) => text,
                        other => other.to_string(),
                    }),
                    None => None,
                };
                Some(CursorInfo {
                    has_next_page,
                    end_cursor,
                })
            }
        };

        Ok(Page {
            records,
            page_count,
            cursor,
        })
    }
}

fn evaluate(expression: &str, value: &Value) -> Result<Option<Value>, FetchError> {
    let expr = PathExpr::parse(expression)
        .map_err(|e| FetchError::Malformed(format!("bad envelope path: {e}")))?;
    Ok(expr.evaluate(value))
}
