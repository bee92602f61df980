//! Rule chains and the schema mapper.
//!
//! Every unified field owns an ordered [`FieldRuleSet`]. The mapper walks the
//! rules in order and keeps the first one that produces a usable value: not
//! `null`, and not the `"T"` sentinel that composed date rules leave behind.
//! Later rules are not evaluated once a value is found.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::model::{RawRecord, UnifiedEvent, UnifiedField};
use crate::schema::path::{PathError, PathExpr};

/// Rule output that means "no value". Some sources encode a flag as a bare
/// `"T"`, which must not leak into text fields sharing the same rule slot.
pub const SENTINEL: &str = "T";

/// Computed rule over the whole raw record.
pub type Predicate = Arc<dyn Fn(&RawRecord) -> Option<Value> + Send + Sync>;

/// One extraction attempt for a unified field.
#[derive(Clone)]
pub enum Rule {
    /// Path or concatenation expression
    Path(PathExpr),

    /// Function for conditions a path cannot express, such as key presence
    Predicate(Predicate),
}

impl Rule {
    /// Parses `expression` into a path rule.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] if the expression does not parse.
    pub fn path(expression: &str) -> Result<Self, PathError> {
        PathExpr::parse(expression).map(Rule::Path)
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&RawRecord) -> Option<Value> + Send + Sync + 'static,
    {
        Rule::Predicate(Arc::new(f))
    }

    /// Rule that evaluates `expression` only when `key` is absent from the
    /// top level of the record. Presence counts, not value: a key mapped to
    /// `null` still suppresses the rule.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] if `expression` does not parse.
    pub fn unless_key_present(key: &str, expression: &str) -> Result<Self, PathError> {
        let key = key.to_string();
        let expr = PathExpr::parse(expression)?;
        Ok(Rule::predicate(move |record| {
            if has_key(record, &key) {
                None
            } else {
                expr.evaluate(record)
            }
        }))
    }

    /// Rule yielding `true` when `key` holds any non-null value.
    pub fn present_as_true(key: &str) -> Self {
        let key = key.to_string();
        Rule::predicate(move |record| {
            record
                .get(&key)
                .filter(|value| !value.is_null())
                .map(|_| Value::Bool(true))
        })
    }

    /// Raw evaluation, before sentinel filtering.
    pub fn evaluate(&self, record: &RawRecord) -> Option<Value> {
        match self {
            Rule::Path(expr) => expr.evaluate(record),
            Rule::Predicate(f) => f(record),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Path(expr) => f.debug_tuple("Path").field(&expr.as_str()).finish(),
            Rule::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

fn has_key(record: &RawRecord, key: &str) -> bool {
    record
        .as_object()
        .map(|map| map.contains_key(key))
        .unwrap_or(false)
}

fn usable(value: Option<Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) if text == SENTINEL => None,
        Some(value) => Some(value),
    }
}

/// Nested results are stored as compact JSON text so unified values stay scalar.
fn flatten(value: Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
        scalar => scalar,
    }
}

/// Ordered fallback chain for one unified field.
#[derive(Debug, Clone, Default)]
pub struct FieldRuleSet {
    rules: Vec<Rule>,
}

impl FieldRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a path rule.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] if `expression` does not parse.
    pub fn path(mut self, expression: &str) -> Result<Self, PathError> {
        self.rules.push(Rule::path(expression)?);
        Ok(self)
    }

    pub fn predicate<F>(mut self, f: F) -> Self
    where
        F: Fn(&RawRecord) -> Option<Value> + Send + Sync + 'static,
    {
        self.rules.push(Rule::predicate(f));
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Builds a set from path expressions only.
    ///
    /// # Errors
    ///
    /// Returns the first [`PathError`] among `expressions`.
    pub fn from_paths(expressions: &[&str]) -> Result<Self, PathError> {
        expressions
            .iter()
            .try_fold(Self::new(), |set, expression| set.path(expression))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Returns the index and value of the first rule yielding a usable value.
    pub fn first_match(&self, record: &RawRecord) -> Option<(usize, Value)> {
        self.rules
            .iter()
            .enumerate()
            .find_map(|(i, rule)| usable(rule.evaluate(record)).map(|v| (i, v)))
    }
}

/// Rule sets for the unified fields. Fields without a set map to `null`.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(UnifiedField, FieldRuleSet)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rule chain for `field`, replacing any previous one.
    pub fn with_field(mut self, field: UnifiedField, rules: FieldRuleSet) -> Self {
        match self.fields.iter_mut().find(|(f, _)| *f == field) {
            Some(slot) => slot.1 = rules,
            None => self.fields.push((field, rules)),
        }
        self
    }

    pub fn get(&self, field: UnifiedField) -> Option<&FieldRuleSet> {
        self.fields
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, rules)| rules)
    }

    pub fn fields(&self) -> impl Iterator<Item = &(UnifiedField, FieldRuleSet)> {
        self.fields.iter()
    }

    /// The production schema covering every harvested source shape.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] only if a built-in expression fails to parse.
    pub fn unified() -> Result<Self, PathError> {
        let start_time = FieldRuleSet::from_paths(&["dateTime", "dateTimeStart"])?
            .rule(Rule::unless_key_present("start_time", "start_date")?)
            .path("start_date+'T'+start_time")?
            .path("start_time")?
            .path("startDate")?
            .path("fieldDateTimeTimezone[0].startDate")?
            .path("dates[0].date+'T'+dates[0].start")?
            .path("start.date+'T'+start.time")?
            .path("start")?;

        let end_time = FieldRuleSet::from_paths(&["endTime", "dateTimeEnd"])?
            .rule(Rule::unless_key_present("end_time", "end_date")?)
            .path("end_date+'T'+end_time")?
            .path("end_time")?
            .path("fieldDateTimeTimezone[0].endDate")?
            .path("dates[0].date+'T'+dates[0].end")?
            .path("end.date+'T'+end.time")?
            .path("end")?;

        let is_online = FieldRuleSet::new()
            .rule(Rule::present_as_true("onlineVenue"))
            .path("is_online_event")?
            .path("online")?
            .path("event_type")?;

        Ok(Self::new()
            .with_field(
                UnifiedField::Id,
                FieldRuleSet::from_paths(&["id", "uuid", "type._id", "_id"])?,
            )
            .with_field(UnifiedField::Title, FieldRuleSet::from_paths(&["title", "name"])?)
            .with_field(UnifiedField::StartTime, start_time)
            .with_field(UnifiedField::EndTime, end_time)
            .with_field(
                UnifiedField::Timezone,
                FieldRuleSet::from_paths(&[
                    "timezone",
                    "fieldDateTimeTimezone[0].timezone",
                    "dates[0].dstimezone",
                    "timeZone",
                ])?,
            )
            .with_field(
                UnifiedField::Going,
                FieldRuleSet::from_paths(&["going", "rsvps.totalCount"])?,
            )
            .with_field(
                UnifiedField::Description,
                FieldRuleSet::from_paths(&[
                    "description",
                    "summary",
                    "event_type_title+'\n'+chapter.description",
                ])?,
            )
            .with_field(
                UnifiedField::EventUrl,
                FieldRuleSet::from_paths(&[
                    "event_url",
                    "eventUrl",
                    "url",
                    "fieldEventUrl.url.path",
                    "buttonLink.rawValue",
                ])?,
            )
            .with_field(
                UnifiedField::ImageUrl,
                FieldRuleSet::from_paths(&["group.groupPhoto.source", "image.original.url"])?,
            )
            .with_field(UnifiedField::IsOnlineEvent, is_online))
    }
}

/// Maps one raw record onto the unified schema.
pub fn map_record(record: &RawRecord, source_name: &str, schema: &Schema) -> UnifiedEvent {
    let mut event = UnifiedEvent::empty(source_name);
    for (field, rules) in schema.fields() {
        event.set(*field, rules.first_match(record).map(|(_, v)| flatten(v)));
    }
    event
}

/// Applies a [`Schema`] to raw records, optionally reporting ambiguous matches.
#[derive(Debug, Clone)]
pub struct SchemaMapper {
    schema: Schema,
    detect_ambiguity: bool,
}

impl SchemaMapper {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            detect_ambiguity: false,
        }
    }

    /// When enabled, rules after the winner are also evaluated and a debug
    /// event is logged for each one producing a different value. This gives up
    /// the short-circuit guarantee, so it is meant for diagnostics only.
    pub fn with_ambiguity_detection(mut self, enabled: bool) -> Self {
        self.detect_ambiguity = enabled;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn map_record(&self, record: &RawRecord, source_name: &str) -> UnifiedEvent {
        if !self.detect_ambiguity {
            return map_record(record, source_name, &self.schema);
        }

        let mut event = UnifiedEvent::empty(source_name);
        for (field, rules) in self.schema.fields() {
            let Some((winner, value)) = rules.first_match(record) else {
                continue;
            };
            for (offset, rule) in rules.rules()[winner + 1..].iter().enumerate() {
                if let Some(other) = usable(rule.evaluate(record)) {
                    if other != value {
                        debug!(
                            source = source_name,
                            field = field.as_str(),
                            winner_rule = winner,
                            other_rule = winner + 1 + offset,
                            winner = %value,
                            other = %other,
                            "Multiple rules matched with different values"
                        );
                    }
                }
            }
            event.set(*field, Some(flatten(value)));
        }
        event
    }

    pub fn map_all(&self, records: &[RawRecord], source_name: &str) -> Vec<UnifiedEvent> {
        records
            .iter()
            .map(|record| self.map_record(record, source_name))
            .collect()
    }
}
