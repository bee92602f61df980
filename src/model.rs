//! Record shapes shared by the schema mapper, the harvesters and storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// As-fetched record from a source. Shape is source-defined and never validated.
pub type RawRecord = Value;

/// The fields of the unified schema, excluding `source` which is always set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnifiedField {
    Id,
    Title,
    StartTime,
    EndTime,
    Timezone,
    Going,
    Description,
    EventUrl,
    ImageUrl,
    IsOnlineEvent,
}

impl UnifiedField {
    /// Every mappable field, in output order.
    pub const ALL: [UnifiedField; 10] = [
        UnifiedField::Id,
        UnifiedField::Title,
        UnifiedField::StartTime,
        UnifiedField::EndTime,
        UnifiedField::Timezone,
        UnifiedField::Going,
        UnifiedField::Description,
        UnifiedField::EventUrl,
        UnifiedField::ImageUrl,
        UnifiedField::IsOnlineEvent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UnifiedField::Id => "id",
            UnifiedField::Title => "title",
            UnifiedField::StartTime => "start_time",
            UnifiedField::EndTime => "end_time",
            UnifiedField::Timezone => "timezone",
            UnifiedField::Going => "going",
            UnifiedField::Description => "description",
            UnifiedField::EventUrl => "event_url",
            UnifiedField::ImageUrl => "image_url",
            UnifiedField::IsOnlineEvent => "is_online_event",
        }
    }
}

impl std::fmt::Display for UnifiedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized event record.
///
/// The struct carries the fixed key set, so a serialized event always has all
/// eleven keys. Missing data serializes as `null`, never as an absent key.
/// Values are scalars (string, number, boolean) when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedEvent {
    /// Name of the harvesting source
    pub source: String,
    pub id: Option<Value>,
    pub title: Option<Value>,
    pub start_time: Option<Value>,
    pub end_time: Option<Value>,
    pub timezone: Option<Value>,
    pub going: Option<Value>,
    pub description: Option<Value>,
    pub event_url: Option<Value>,
    pub image_url: Option<Value>,
    pub is_online_event: Option<Value>,
}

impl UnifiedEvent {
    /// Creates an event tagged with `source` and every other field null.
    pub fn empty(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            id: None,
            title: None,
            start_time: None,
            end_time: None,
            timezone: None,
            going: None,
            description: None,
            event_url: None,
            image_url: None,
            is_online_event: None,
        }
    }

    pub fn get(&self, field: UnifiedField) -> Option<&Value> {
        self.slot(field).as_ref()
    }

    pub fn set(&mut self, field: UnifiedField, value: Option<Value>) {
        *self.slot_mut(field) = value;
    }

    fn slot(&self, field: UnifiedField) -> &Option<Value> {
        match field {
            UnifiedField::Id => &self.id,
            UnifiedField::Title => &self.title,
            UnifiedField::StartTime => &self.start_time,
            UnifiedField::EndTime => &self.end_time,
            UnifiedField::Timezone => &self.timezone,
            UnifiedField::Going => &self.going,
            UnifiedField::Description => &self.description,
            UnifiedField::EventUrl => &self.event_url,
            UnifiedField::ImageUrl => &self.image_url,
            UnifiedField::IsOnlineEvent => &self.is_online_event,
        }
    }

    fn slot_mut(&mut self, field: UnifiedField) -> &mut Option<Value> {
        match field {
            UnifiedField::Id => &mut self.id,
            UnifiedField::Title => &mut self.title,
            UnifiedField::StartTime => &mut self.start_time,
            UnifiedField::EndTime => &mut self.end_time,
            UnifiedField::Timezone => &mut self.timezone,
            UnifiedField::Going => &mut self.going,
            UnifiedField::Description => &mut self.description,
            UnifiedField::EventUrl => &mut self.event_url,
            UnifiedField::ImageUrl => &mut self.image_url,
            UnifiedField::IsOnlineEvent => &mut self.is_online_event,
        }
    }
}

/// One run's complete output. Immutable once built; persisted as a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestBatch {
    /// Construction time of the batch
    #[serde(rename = "date")]
    pub created_at: DateTime<Utc>,

    pub events: Vec<UnifiedEvent>,
}

impl HarvestBatch {
    /// Builds a batch timestamped now.
    pub fn new(events: Vec<UnifiedEvent>) -> Self {
        Self {
            created_at: Utc::now(),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Geo-scope used by location-aware sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// Search radius in the source's unit (miles for most APIs)
    pub radius: u32,
}

impl Location {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64, radius: u32) -> Self {
        Self {
            name: name.into(),
            lat,
            lon,
            radius,
        }
    }
}

/// Built-in geo-scopes used when the configuration does not list any.
pub fn default_locations() -> Vec<Location> {
    [
        ("USA", 37.0902, -95.7129, 1200),
        ("Canada", 43.6532, -79.3832, 200),
        ("Austria", 48.2082, 16.3738, 50),
        ("Australia", -37.8136, 144.9631, 1000),
        ("United Kingdom", 51.5072, 0.1276, 100),
        ("Italy", 45.4642, 9.19, 50),
        ("Finland", 60.1699, 24.9384, 250),
        ("Denmark", 55.6761, 12.5683, 75),
        ("Brazil", -23.5558, -46.6396, 1000),
        ("Netherlands", 52.103207, 5.608742, 50),
        ("Singapore", 1.355184, 103.819524, 20),
        ("Israel", 32.0853, 34.7818, 200),
        ("Ireland", 53.3498, -6.2603, 200),
        ("Hong Kong", 22.3193, 114.1694, 20),
        ("Greece", 37.9838, 23.7275, 150),
        ("Germany", 52.52, 13.405, 100),
        ("France", 48.8566, 2.3522, 250),
        ("Switzerland", 47.3769, 8.5417, 50),
        ("Sweden", 63.441294, 16.578449, 400),
        ("Spain", 41.3874, 2.1686, 200),
        ("South Africa", -29.792839, 24.76505, 400),
        ("Norway", 61.02041, 8.784942, 500),
        ("New Zealand", -42.288765, 173.190186, 300),
    ]
    .into_iter()
    .map(|(name, lat, lon, radius)| Location::new(name, lat, lon, radius))
    .collect()
}
