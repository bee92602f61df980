//! Schema mapping - path expressions and first-match field rules.
//!
//! - **Paths**: [`PathExpr`] and [`resolve`] pull values out of nested records
//! - **Rules**: [`Rule`] and [`FieldRuleSet`] describe per-field fallbacks
//! - **Mapping**: [`SchemaMapper`] turns raw records into [`UnifiedEvent`](crate::model::UnifiedEvent)s

pub mod mapper;
pub mod path;

pub use mapper::{map_record, FieldRuleSet, Predicate, Rule, Schema, SchemaMapper, SENTINEL};
pub use path::{resolve, PathError, PathExpr};
