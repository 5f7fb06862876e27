use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::predict::ElementSet;
use crate::store::{CrewRecord, PositionSample};
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::state::AppState;

const DEFAULT_LIMIT: usize = 1000;
const MAX_LIMIT: usize = 50_000;

#[derive(Debug, Deserialize, ToSchema)]
pub struct PositionsQuery {
    /// Unix seconds, inclusive.
    #[serde(default)]
    pub from: Option<i64>,
    #[serde(default)]
    pub to: Option<i64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/api/positions",
    tag = "store",
    params(
        ("from" = Option<i64>, Query, description = "Range start, Unix seconds"),
        ("to" = Option<i64>, Query, description = "Range end, Unix seconds"),
        ("limit" = Option<usize>, Query, description = "Maximum number of samples")
    ),
    responses(
        (status = 200, description = "Stored samples in ascending time order", body = Vec<PositionSample>),
        (status = 400, description = "Invalid range", body = ErrorResponse)
    )
)]
pub async fn list_positions(
    State(state): State<AppState>,
    Query(query): Query<PositionsQuery>,
) -> ApiResult<Json<Vec<PositionSample>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);

    let samples = if query.from.is_none() && query.to.is_none() {
        // Most recent `limit` samples, oldest first.
        let mut latest = state.store.positions.descending(limit).await?;
        latest.reverse();
        latest
    } else {
        let from = query.from.unwrap_or(i64::MIN);
        let to = query.to.unwrap_or(i64::MAX);
        if from > to {
            return Err(ApiError::Validation("from must not be after to".into()));
        }
        let mut range = state.store.positions.between(from, to).await?;
        range.truncate(limit);
        range
    };
    Ok(Json(samples))
}

#[utoipa::path(
    get,
    path = "/api/crew",
    tag = "store",
    responses(
        (status = 200, description = "People currently aboard", body = Vec<CrewRecord>)
    )
)]
pub async fn list_crew(State(state): State<AppState>) -> ApiResult<Json<Vec<CrewRecord>>> {
    Ok(Json(state.store.crew.ascending(usize::MAX).await?))
}

#[utoipa::path(
    get,
    path = "/api/element-sets/latest",
    tag = "store",
    responses(
        (status = 200, description = "Most recently fetched element set", body = ElementSet),
        (status = 404, description = "Nothing stored yet", body = ErrorResponse)
    )
)]
pub async fn latest_element_set(State(state): State<AppState>) -> ApiResult<Json<ElementSet>> {
    state
        .store
        .latest_element_set()
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("no_element_set"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Store, Visibility};
    use crate::web::state::tests::test_state;

    async fn populated() -> AppState {
        let store = Store::in_memory();
        let samples = (0..20)
            .map(|i| {
                let timestamp = 1_700_000_000 + i * 5;
                PositionSample {
                    id: PositionSample::live_id(timestamp),
                    latitude: 0.0,
                    longitude: 0.0,
                    altitude_km: 410.0,
                    velocity_kmh: 27_600.0,
                    timestamp,
                    visibility: Visibility::Daylight,
                }
            })
            .collect();
        store.positions.bulk_upsert(samples).await.unwrap();
        test_state(store)
    }

    #[tokio::test]
    async fn without_range_returns_latest_ascending() {
        let query = PositionsQuery {
            from: None,
            to: None,
            limit: Some(3),
        };
        let Json(samples) = list_positions(State(populated().await), Query(query))
            .await
            .unwrap();
        let timestamps: Vec<_> = samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![1_700_000_085, 1_700_000_090, 1_700_000_095]);
    }

    #[tokio::test]
    async fn range_is_inclusive() {
        let query = PositionsQuery {
            from: Some(1_700_000_010),
            to: Some(1_700_000_020),
            limit: None,
        };
        let Json(samples) = list_positions(State(populated().await), Query(query))
            .await
            .unwrap();
        assert_eq!(samples.len(), 3);
    }

    #[tokio::test]
    async fn inverted_range_is_rejected() {
        let query = PositionsQuery {
            from: Some(10),
            to: Some(5),
            limit: None,
        };
        let result = list_positions(State(populated().await), Query(query)).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }
}
