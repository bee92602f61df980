//! Path expressions over nested records.
//!
//! Grammar:
//! - **Path**: dot-separated keys with optional fixed indices,
//!   e.g. `group.groupPhoto.source` or `dates[0].date`. Negative indices count
//!   from the end of the sequence.
//! - **Literal**: text in single or double quotes, returned verbatim without
//!   the quotes.
//! - **Concatenation**: paths and literals joined by unescaped `+`. A `+`
//!   inside quotes or written as `\+` does not split.
//!
//! Resolution never fails: a missing key, a non-container intermediate, an
//! out-of-range index or a `null` leaf all resolve to `None`. A concatenation
//! resolves to `None` as soon as any of its path segments does.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors raised while parsing a path expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Expression is empty or whitespace
    #[error("Empty path expression")]
    Empty,

    /// A `+` or `.` separator with nothing on one side
    #[error("Empty segment in expression '{expression}'")]
    EmptySegment { expression: String },

    /// Quote opened but never closed
    #[error("Unterminated literal in expression '{expression}'")]
    UnterminatedLiteral { expression: String },

    /// Bracket index that is not an integer or not closed
    #[error("Invalid index '{segment}'")]
    InvalidIndex { segment: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Key(String),
    Index(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Path(Vec<Step>),
}

/// A parsed path or concatenation expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    text: String,
    segments: Vec<Segment>,
}

impl PathExpr {
    /// Parses `expression`.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] for empty expressions or segments, unterminated
    /// quotes and malformed indices.
    pub fn parse(expression: &str) -> Result<Self, PathError> {
        if expression.trim().is_empty() {
            return Err(PathError::Empty);
        }

        let segments = split_concatenation(expression)?
            .iter()
            .map(|part| parse_segment(part, expression))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            text: expression.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_concatenation(&self) -> bool {
        self.segments.len() > 1
    }

    /// Evaluates the expression against `record`.
    ///
    /// A single path returns the addressed value as-is (any JSON type). A
    /// single literal returns itself as a string. A concatenation returns the
    /// joined string, or `None` if any path segment is unresolvable.
    pub fn evaluate(&self, record: &Value) -> Option<Value> {
        if let [single] = self.segments.as_slice() {
            return match single {
                Segment::Literal(text) => Some(Value::String(text.clone())),
                Segment::Path(steps) => lookup(record, steps).cloned(),
            };
        }

        let mut joined = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => joined.push_str(text),
                Segment::Path(steps) => joined.push_str(&render(lookup(record, steps)?)),
            }
        }
        Some(Value::String(joined))
    }
}

impl FromStr for PathExpr {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Resolves `expression` against `record`, treating unparsable expressions as
/// unresolvable.
pub fn resolve(record: &Value, expression: &str) -> Option<Value> {
    match PathExpr::parse(expression) {
        Ok(expr) => expr.evaluate(record),
        Err(e) => {
            debug!(expression, error = %e, "Ignoring unparsable path expression");
            None
        }
    }
}

fn lookup<'a>(record: &'a Value, steps: &[Step]) -> Option<&'a Value> {
    let mut current = record;
    for step in steps {
        current = match (step, current) {
            (Step::Key(key), Value::Object(map)) => map.get(key)?,
            (Step::Index(index), Value::Array(items)) => {
                let position = if *index < 0 {
                    items.len() as i64 + index
                } else {
                    *index
                };
                if position < 0 {
                    return None;
                }
                items.get(position as usize)?
            }
            _ => return None,
        };
    }

    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Splits on `+` outside quotes. `\+` outside quotes becomes a literal `+`.
fn split_concatenation(expression: &str) -> Result<Vec<String>, PathError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = expression.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\\' if chars.peek() == Some(&'+') => {
                chars.next();
                current.push('+');
            }
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            '+' => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }

    if quote.is_some() {
        return Err(PathError::UnterminatedLiteral {
            expression: expression.to_string(),
        });
    }
    parts.push(current);
    Ok(parts)
}

fn parse_segment(part: &str, expression: &str) -> Result<Segment, PathError> {
    let trimmed = part.trim();
    if trimmed.is_empty() {
        return Err(PathError::EmptySegment {
            expression: expression.to_string(),
        });
    }

    for quote in ['\'', '"'] {
        if trimmed.starts_with(quote) {
            if trimmed.len() >= 2 && trimmed.ends_with(quote) {
                return Ok(Segment::Literal(trimmed[1..trimmed.len() - 1].to_string()));
            }
            return Err(PathError::UnterminatedLiteral {
                expression: expression.to_string(),
            });
        }
    }

    parse_steps(trimmed, expression).map(Segment::Path)
}

fn parse_steps(path: &str, expression: &str) -> Result<Vec<Step>, PathError> {
    let mut steps = Vec::new();

    for part in path.split('.') {
        let part = part.trim();
        if part.is_empty() {
            return Err(PathError::EmptySegment {
                expression: expression.to_string(),
            });
        }

        let (key, mut rest) = match part.find('[') {
            Some(i) => (&part[..i], &part[i..]),
            None => (part, ""),
        };
        if !key.is_empty() {
            steps.push(Step::Key(key.to_string()));
        }

        while !rest.is_empty() {
            let invalid = || PathError::InvalidIndex {
                segment: part.to_string(),
            };
            let close = rest.find(']').ok_or_else(invalid)?;
            if !rest.starts_with('[') {
                return Err(invalid());
            }
            let index = rest[1..close].trim().parse::<i64>().map_err(|_| invalid())?;
            steps.push(Step::Index(index));
            rest = &rest[close + 1..];
        }
    }

    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dotted_path() {
        let record = json!({"group": {"groupPhoto": {"source": "https://img/1.png"}}});
        assert_eq!(
            resolve(&record, "group.groupPhoto.source"),
            Some(json!("https://img/1.png"))
        );
    }

    #[test]
    fn test_missing_and_non_mapping_intermediate() {
        let record = json!({"group": "not-a-map", "a": {"b": null}});
        assert_eq!(resolve(&record, "group.groupPhoto.source"), None);
        assert_eq!(resolve(&record, "missing"), None);
        assert_eq!(resolve(&record, "a.b"), None);
    }

    #[test]
    fn test_indexed_path() {
        let record = json!({"dates": [{"date": "2024-05-01"}, {"date": "2024-05-02"}]});
        assert_eq!(resolve(&record, "dates[0].date"), Some(json!("2024-05-01")));
        assert_eq!(resolve(&record, "dates[-1].date"), Some(json!("2024-05-02")));
        assert_eq!(resolve(&record, "dates[5].date"), None);
        assert_eq!(resolve(&record, "dates[-3].date"), None);
        assert_eq!(resolve(&json!({"dates": {"0": 1}}), "dates[0]"), None);
    }

    #[test]
    fn test_non_scalar_value_is_returned() {
        let record = json!({"onlineVenue": {"type": "ONLINE"}});
        assert_eq!(resolve(&record, "onlineVenue"), Some(json!({"type": "ONLINE"})));
    }

    #[test]
    fn test_concatenation_joins_in_order() {
        let record = json!({"start_date": "2024-01-01", "start_time": "10:00", "end_time": "11:00"});
        assert_eq!(
            resolve(&record, "start_date+'T'+start_time"),
            Some(json!("2024-01-01T10:00"))
        );
        assert_eq!(
            resolve(&record, "start_date + \"T\" + start_time"),
            Some(json!("2024-01-01T10:00"))
        );
    }

    #[test]
    fn test_concatenation_is_all_or_nothing() {
        let record = json!({"start_date": "2024-01-01"});
        assert_eq!(resolve(&record, "start_date+'T'+start_time"), None);
        assert_eq!(resolve(&record, "start_time+'T'"), None);
    }

    #[test]
    fn test_concatenation_renders_numbers() {
        let record = json!({"rsvps": {"totalCount": 12}});
        assert_eq!(
            resolve(&record, "'going: '+rsvps.totalCount"),
            Some(json!("going: 12"))
        );
    }

    #[test]
    fn test_literal_protects_plus_and_escape() {
        let record = json!({"a+b": "x", "c": "y"});
        assert_eq!(resolve(&record, "'1+1'+c"), Some(json!("1+1y")));
        assert_eq!(resolve(&record, "a\\+b"), Some(json!("x")));
        assert_eq!(resolve(&record, "'online'"), Some(json!("online")));
    }

    #[test]
    fn test_newline_literal_is_verbatim() {
        let record = json!({"event_type_title": "Workshop", "chapter": {"description": "GDG Kyiv"}});
        assert_eq!(
            resolve(&record, "event_type_title+'\n'+chapter.description"),
            Some(json!("Workshop\nGDG Kyiv"))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(PathExpr::parse("  "), Err(PathError::Empty));
        assert!(matches!(
            PathExpr::parse("a+"),
            Err(PathError::EmptySegment { .. })
        ));
        assert!(matches!(
            PathExpr::parse("a..b"),
            Err(PathError::EmptySegment { .. })
        ));
        assert!(matches!(
            PathExpr::parse("a+'T"),
            Err(PathError::UnterminatedLiteral { .. })
        ));
        assert!(matches!(
            PathExpr::parse("dates[x].date"),
            Err(PathError::InvalidIndex { .. })
        ));
        assert!(matches!(
            PathExpr::parse("dates[0"),
            Err(PathError::InvalidIndex { .. })
        ));
        // Resolution swallows parse errors.
        assert_eq!(resolve(&json!({"a": 1}), "a+"), None);
    }

    #[test]
    fn test_display_round_trips_text() {
        let expr: PathExpr = "dates[0].date+'T'+dates[0].start".parse().unwrap();
        assert!(expr.is_concatenation());
        assert_eq!(expr.to_string(), "dates[0].date+'T'+dates[0].start");
    }
}
