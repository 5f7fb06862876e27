use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::predict::element_set::ElementSet;
use crate::predict::observer::ObserverLocation;
use crate::predict::propagation::{
    ecf_to_geodetic, ecf_to_look_angles, eci_to_ecf, Orbit, Propagator,
};
use crate::predict::types::{PassPrediction, PathPoint};

pub const STEP_SECONDS: i64 = 20;
pub const SEARCH_HORIZON_HOURS: i64 = 24;
/// A pass still above the threshold when the horizon runs out is dropped;
/// only passes with both ends observed are reported.
pub const KEEP_TRUNCATED_PASS: bool = false;
/// Gap between the end of one pass and the start of the next search.
pub const CURSOR_ADVANCE_MINUTES: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PassSearch {
    #[serde(default = "default_max_passes")]
    pub max_passes: usize,
    #[serde(default = "default_max_days")]
    pub max_days_horizon: i64,
    #[serde(default = "default_min_elevation")]
    pub min_elevation_deg: f64,
}

fn default_max_passes() -> usize {
    5
}

fn default_max_days() -> i64 {
    7
}

fn default_min_elevation() -> f64 {
    10.0
}

impl Default for PassSearch {
    fn default() -> Self {
        Self {
            max_passes: default_max_passes(),
            max_days_horizon: default_max_days(),
            min_elevation_deg: default_min_elevation(),
        }
    }
}

enum SearchState {
    Searching,
    InPass {
        start: DateTime<Utc>,
        max_elevation: f64,
        path: Vec<PathPoint>,
    },
}

/// Find the first pass above `min_elevation_deg` within the search horizon.
pub fn predict_next_pass_from(
    propagator: &dyn Propagator,
    elements: &ElementSet,
    observer: &ObserverLocation,
    search_start: DateTime<Utc>,
    min_elevation_deg: f64,
) -> Option<PassPrediction> {
    let orbit = match propagator.prepare(elements) {
        Ok(orbit) => orbit,
        Err(e) => {
            log::warn!("Pass search aborted for {}: {}", elements.id, e);
            return None;
        }
    };
    scan(
        propagator,
        orbit.as_ref(),
        observer,
        search_start,
        min_elevation_deg,
    )
}

fn scan(
    propagator: &dyn Propagator,
    orbit: &dyn Orbit,
    observer: &ObserverLocation,
    search_start: DateTime<Utc>,
    min_elevation_deg: f64,
) -> Option<PassPrediction> {
    let step = Duration::seconds(STEP_SECONDS);
    let horizon = search_start + Duration::hours(SEARCH_HORIZON_HOURS);
    let mut state = SearchState::Searching;
    let mut cursor = search_start;

    while cursor <= horizon {
        let (elevation, point) = match observe(propagator, orbit, observer, cursor) {
            Some(observation) => observation,
            None => {
                cursor += step;
                continue;
            }
        };

        state = match state {
            SearchState::Searching if elevation > min_elevation_deg => SearchState::InPass {
                start: cursor,
                max_elevation: elevation,
                path: vec![point],
            },
            SearchState::Searching => SearchState::Searching,
            SearchState::InPass {
                start,
                max_elevation,
                mut path,
            } => {
                if elevation <= min_elevation_deg {
                    return Some(build_pass(start, cursor, max_elevation, path));
                }
                path.push(point);
                SearchState::InPass {
                    start,
                    max_elevation: max_elevation.max(elevation),
                    path,
                }
            }
        };

        cursor += step;
    }

    match state {
        SearchState::InPass {
            start,
            max_elevation,
            path,
        } if KEEP_TRUNCATED_PASS => Some(build_pass(start, horizon, max_elevation, path)),
        SearchState::InPass { start, .. } => {
            log::debug!("Dropping pass starting {} truncated by search horizon", start);
            None
        }
        SearchState::Searching => None,
    }
}

fn observe(
    propagator: &dyn Propagator,
    orbit: &dyn Orbit,
    observer: &ObserverLocation,
    at: DateTime<Utc>,
) -> Option<(f64, PathPoint)> {
    let state = match orbit.propagate(at) {
        Ok(state) => state,
        Err(e) => {
            log::debug!("Skipping pass search step at {}: {}", at, e);
            return None;
        }
    };
    let ecf = eci_to_ecf(state.position, propagator.sidereal_time(at));
    let look = ecf_to_look_angles(observer, ecf);
    let geodetic = ecf_to_geodetic(ecf);
    Some((
        look.elevation_deg,
        PathPoint {
            lat: geodetic.latitude_deg,
            lng: geodetic.longitude_deg,
            alt: geodetic.altitude_km,
        },
    ))
}

fn build_pass(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    max_elevation: f64,
    path: Vec<PathPoint>,
) -> PassPrediction {
    PassPrediction {
        id: format!("pass-{}", start.timestamp()),
        start_time: start,
        end_time: end,
        max_elevation_deg: round2(max_elevation),
        duration_minutes: (end - start).num_seconds() as f64 / 60.0,
        path,
    }
}

/// Upcoming passes counted from now.
pub fn predict_passes(
    propagator: &dyn Propagator,
    elements: &ElementSet,
    observer: &ObserverLocation,
    search: &PassSearch,
) -> Vec<PassPrediction> {
    predict_passes_from(propagator, elements, observer, search, Utc::now())
}

/// Chain single-pass searches forward from `now`.
///
/// Passes starting later than `now + max_days_horizon` end the search even
/// when fewer than `max_passes` were found.
pub fn predict_passes_from(
    propagator: &dyn Propagator,
    elements: &ElementSet,
    observer: &ObserverLocation,
    search: &PassSearch,
    now: DateTime<Utc>,
) -> Vec<PassPrediction> {
    let orbit = match propagator.prepare(elements) {
        Ok(orbit) => orbit,
        Err(e) => {
            log::warn!("Pass search aborted for {}: {}", elements.id, e);
            return Vec::new();
        }
    };

    let limit = now + Duration::days(search.max_days_horizon);
    let mut passes: Vec<PassPrediction> = Vec::new();
    let mut cursor = now;

    while passes.len() < search.max_passes {
        let Some(pass) = scan(
            propagator,
            orbit.as_ref(),
            observer,
            cursor,
            search.min_elevation_deg,
        ) else {
            break;
        };
        if pass.start_time > limit {
            break;
        }
        cursor = pass.end_time + Duration::minutes(CURSOR_ADVANCE_MINUTES);
        passes.push(pass);
    }

    passes
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
