use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::predict::{
    calculate_orbit_path, calculate_orbital_parameters, predict_next_pass_from, predict_passes,
    GeodeticPoint, OrbitalParameters, PassPrediction, PassSearch,
};
use crate::util::deserialize_option_datetime;
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::state::AppState;

const MAX_PASSES: usize = 50;
const MAX_DAYS: i64 = 30;
const MAX_PATH_POINTS: f64 = 10_000.0;
/// Path window bounds, minutes either side of now.
const MAX_PATH_OFFSET_MIN: f64 = 30.0 * 1440.0;

#[derive(Debug, Deserialize, ToSchema)]
pub struct PassesQuery {
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub days: Option<i64>,
    #[serde(default)]
    pub min_elevation: Option<f64>,
}

impl PassesQuery {
    fn search(&self, defaults: &PassSearch) -> ApiResult<PassSearch> {
        let search = PassSearch {
            max_passes: self.count.unwrap_or(defaults.max_passes),
            max_days_horizon: self.days.unwrap_or(defaults.max_days_horizon),
            min_elevation_deg: self.min_elevation.unwrap_or(defaults.min_elevation_deg),
        };
        if !(1..=MAX_PASSES).contains(&search.max_passes) {
            return Err(ApiError::Validation(format!(
                "count must be between 1 and {}",
                MAX_PASSES
            )));
        }
        if !(1..=MAX_DAYS).contains(&search.max_days_horizon) {
            return Err(ApiError::Validation(format!(
                "days must be between 1 and {}",
                MAX_DAYS
            )));
        }
        validate_elevation(search.min_elevation_deg)?;
        Ok(search)
    }
}

fn validate_elevation(deg: f64) -> ApiResult<()> {
    if (0.0..90.0).contains(&deg) {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "min_elevation must be in [0, 90)".into(),
        ))
    }
}

#[utoipa::path(
    get,
    path = "/api/passes",
    tag = "predict",
    params(
        ("count" = Option<usize>, Query, description = "Maximum number of passes"),
        ("days" = Option<i64>, Query, description = "Search horizon in days"),
        ("min_elevation" = Option<f64>, Query, description = "Minimum elevation (degrees)")
    ),
    responses(
        (status = 200, description = "Upcoming passes in chronological order", body = Vec<PassPrediction>),
        (status = 400, description = "Invalid parameters", body = ErrorResponse),
        (status = 503, description = "No element set available", body = ErrorResponse)
    )
)]
pub async fn list_passes(
    State(state): State<AppState>,
    Query(query): Query<PassesQuery>,
) -> ApiResult<Json<Vec<PassPrediction>>> {
    let search = query.search(&state.config.prediction)?;
    let elements = state.element_set().await?;
    let propagator = state.propagator.clone();
    let observer = state.observer;

    let passes = tokio::task::spawn_blocking(move || {
        predict_passes(propagator.as_ref(), &elements, &observer, &search)
    })
    .await?;
    Ok(Json(passes))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NextPassQuery {
    #[serde(default, deserialize_with = "deserialize_option_datetime")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub min_elevation: Option<f64>,
}

#[utoipa::path(
    get,
    path = "/api/passes/next",
    tag = "predict",
    params(
        ("from" = Option<String>, Query, description = "Search start (RFC3339), defaults to now"),
        ("min_elevation" = Option<f64>, Query, description = "Minimum elevation (degrees)")
    ),
    responses(
        (status = 200, description = "First pass within 24 hours", body = PassPrediction),
        (status = 404, description = "No pass within 24 hours", body = ErrorResponse),
        (status = 503, description = "No element set available", body = ErrorResponse)
    )
)]
pub async fn next_pass(
    State(state): State<AppState>,
    Query(query): Query<NextPassQuery>,
) -> ApiResult<Json<PassPrediction>> {
    let min_elevation = query
        .min_elevation
        .unwrap_or(state.config.prediction.min_elevation_deg);
    validate_elevation(min_elevation)?;
    let from = query.from.unwrap_or_else(Utc::now);
    let elements = state.element_set().await?;
    let propagator = state.propagator.clone();
    let observer = state.observer;

    tokio::task::spawn_blocking(move || {
        predict_next_pass_from(propagator.as_ref(), &elements, &observer, from, min_elevation)
    })
    .await?
    .map(Json)
    .ok_or(ApiError::NotFound("no_pass_found"))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrbitPathQuery {
    /// Minutes relative to now.
    #[serde(default = "default_path_start")]
    pub start: f64,
    #[serde(default = "default_path_end")]
    pub end: f64,
    #[serde(default = "default_path_step")]
    pub step: f64,
}

fn default_path_start() -> f64 {
    -45.0
}

fn default_path_end() -> f64 {
    45.0
}

fn default_path_step() -> f64 {
    1.0
}

#[utoipa::path(
    get,
    path = "/api/orbit/path",
    tag = "predict",
    params(
        ("start" = Option<f64>, Query, description = "Window start, minutes from now"),
        ("end" = Option<f64>, Query, description = "Window end, minutes from now"),
        ("step" = Option<f64>, Query, description = "Sample spacing in minutes")
    ),
    responses(
        (status = 200, description = "Ground track samples", body = Vec<GeodeticPoint>),
        (status = 400, description = "Invalid window", body = ErrorResponse),
        (status = 503, description = "No element set available", body = ErrorResponse)
    )
)]
pub async fn orbit_path(
    State(state): State<AppState>,
    Query(query): Query<OrbitPathQuery>,
) -> ApiResult<Json<Vec<GeodeticPoint>>> {
    let in_range = |minutes: f64| minutes.abs() <= MAX_PATH_OFFSET_MIN;
    if !in_range(query.start) || !in_range(query.end) {
        return Err(ApiError::Validation(format!(
            "start and end must be within {} minutes of now",
            MAX_PATH_OFFSET_MIN
        )));
    }
    if !(query.step > 0.0) || !(query.end >= query.start) {
        return Err(ApiError::Validation(
            "step must be positive and end must not precede start".into(),
        ));
    }
    if (query.end - query.start) / query.step > MAX_PATH_POINTS {
        return Err(ApiError::Validation("window has too many samples".into()));
    }

    let elements = state.element_set().await?;
    let propagator = state.propagator.clone();
    let points = tokio::task::spawn_blocking(move || {
        calculate_orbit_path(
            propagator.as_ref(),
            &elements,
            query.start,
            query.end,
            query.step,
        )
    })
    .await?;
    Ok(Json(points))
}

#[utoipa::path(
    get,
    path = "/api/orbit/parameters",
    tag = "predict",
    responses(
        (status = 200, description = "Keplerian parameters of the current element set", body = OrbitalParameters),
        (status = 404, description = "Parameters could not be derived", body = ErrorResponse),
        (status = 503, description = "No element set available", body = ErrorResponse)
    )
)]
pub async fn orbit_parameters(State(state): State<AppState>) -> ApiResult<Json<OrbitalParameters>> {
    let elements = state.element_set().await?;
    calculate_orbital_parameters(state.propagator.as_ref(), &elements)
        .map(Json)
        .ok_or(ApiError::NotFound("orbital_parameters_unavailable"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::testing::iss;
    use crate::store::Store;
    use crate::web::state::tests::test_state;

    async fn state_with_iss() -> AppState {
        let store = Store::in_memory();
        store.element_sets.upsert(iss()).await.unwrap();
        test_state(store)
    }

    #[tokio::test]
    async fn parameters_come_from_latest_element_set() {
        let Json(params) = orbit_parameters(State(state_with_iss().await)).await.unwrap();
        assert!((params.inclination_deg - 51.6416).abs() < 1e-9);
    }

    #[tokio::test]
    async fn next_pass_from_explicit_start() {
        let set = iss();
        let query = NextPassQuery {
            from: Some(set.epoch),
            min_elevation: None,
        };
        let Json(pass) = next_pass(State(state_with_iss().await), Query(query))
            .await
            .unwrap();
        assert!(pass.start_time >= set.epoch);
        assert!(pass.max_elevation_deg > 10.0);
    }

    #[tokio::test]
    async fn out_of_range_search_is_rejected() {
        let query = PassesQuery {
            count: Some(0),
            days: None,
            min_elevation: None,
        };
        let result = list_passes(State(state_with_iss().await), Query(query)).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));

        let query = PassesQuery {
            count: None,
            days: None,
            min_elevation: Some(95.0),
        };
        let result = list_passes(State(state_with_iss().await), Query(query)).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn reversed_path_window_is_rejected() {
        let query = OrbitPathQuery {
            start: 10.0,
            end: -10.0,
            step: 1.0,
        };
        let result = orbit_path(State(state_with_iss().await), Query(query)).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn far_or_non_finite_path_window_is_rejected() {
        for (start, end) in [(1e12, 1e12), (f64::NAN, 0.0), (0.0, f64::INFINITY)] {
            let query = OrbitPathQuery {
                start,
                end,
                step: 1.0,
            };
            let result = orbit_path(State(state_with_iss().await), Query(query)).await;
            assert!(matches!(result, Err(ApiError::Validation(_))), "{} {}", start, end);
        }
    }

    #[tokio::test]
    async fn predictions_need_an_element_set() {
        let result = orbit_parameters(State(test_state(Store::in_memory()))).await;
        assert!(matches!(result, Err(ApiError::Unavailable(_))));
    }
}
