use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use utoipa::ToSchema;

use crate::predict::ElementSet;

/// Anything a [`Table`](super::Table) can hold: keyed by id, ordered by an
/// integer key (Unix seconds).
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn order_key(&self) -> i64;
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Visibility {
    Daylight,
    Eclipsed,
    Orbiting,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PositionSample {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_km: f64,
    pub velocity_kmh: f64,
    /// Unix seconds.
    pub timestamp: i64,
    pub visibility: Visibility,
}

impl PositionSample {
    pub fn live_id(timestamp: i64) -> String {
        format!("pos-{}", timestamp)
    }

    /// Distinct from live ids so a backfill never replaces a measured sample.
    pub fn synthetic_id(timestamp: i64) -> String {
        format!("syn-{}", timestamp)
    }
}

impl Record for PositionSample {
    fn id(&self) -> &str {
        &self.id
    }

    fn order_key(&self) -> i64 {
        self.timestamp
    }
}

impl Record for ElementSet {
    fn id(&self) -> &str {
        &self.id
    }

    fn order_key(&self) -> i64 {
        self.fetched_at.timestamp()
    }
}

/// Someone currently aboard, from the enrichment feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CrewRecord {
    pub id: String,
    pub name: String,
    pub craft: String,
    pub fetched_at: DateTime<Utc>,
}

impl CrewRecord {
    pub fn new(name: &str, craft: &str, fetched_at: DateTime<Utc>) -> Self {
        let slug: String = name
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        Self {
            id: format!("crew-{}", slug),
            name: name.trim().to_string(),
            craft: craft.trim().to_string(),
            fetched_at,
        }
    }
}

impl Record for CrewRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn order_key(&self) -> i64 {
        self.fetched_at.timestamp()
    }
}
