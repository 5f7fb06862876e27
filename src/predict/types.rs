use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Where an element set came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TleSource {
    Primary,
    Backup,
    Fallback,
}

/// One propagated sample in geodetic coordinates.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GeodeticPoint {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_km: f64,
    pub velocity_kmh: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PathPoint {
    pub lat: f64,
    pub lng: f64,
    pub alt: f64,
}

/// A predicted visibility window above the minimum elevation
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PassPrediction {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub max_elevation_deg: f64,
    pub duration_minutes: f64,
    pub path: Vec<PathPoint>,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct OrbitalParameters {
    pub inclination_deg: f64,
    pub eccentricity: f64,
    pub mean_motion_rev_per_day: f64,
    pub period_minutes: f64,
    pub apogee_km: f64,
    pub perigee_km: f64,
}
