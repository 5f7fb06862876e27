use axum::{extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::store::retention::{run_retention, RetentionReport};
use crate::store::validator::{validate_store, CorruptionReport};
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct BackfillRequest {
    /// Unix seconds, inclusive.
    pub from: i64,
    pub to: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BackfillResponse {
    pub added: usize,
}

#[utoipa::path(
    post,
    path = "/api/maintenance/backfill",
    tag = "maintenance",
    request_body = BackfillRequest,
    responses(
        (status = 200, description = "Synthetic samples written", body = BackfillResponse),
        (status = 400, description = "Invalid range", body = ErrorResponse),
        (status = 503, description = "No element set available", body = ErrorResponse)
    )
)]
pub async fn backfill(
    State(state): State<AppState>,
    Json(request): Json<BackfillRequest>,
) -> ApiResult<Json<BackfillResponse>> {
    if request.from > request.to {
        return Err(ApiError::Validation("from must not be after to".into()));
    }
    let elements = state.element_set().await?;
    let added = state
        .backfiller
        .fill_gaps_in_range(&state.store, request.from, request.to, &elements)
        .await?;
    Ok(Json(BackfillResponse { added }))
}

#[utoipa::path(
    post,
    path = "/api/maintenance/validate",
    tag = "maintenance",
    responses(
        (status = 200, description = "Records checked and removed per dataset", body = CorruptionReport)
    )
)]
pub async fn validate(State(state): State<AppState>) -> ApiResult<Json<CorruptionReport>> {
    Ok(Json(validate_store(&state.store).await?))
}

#[utoipa::path(
    post,
    path = "/api/maintenance/retention",
    tag = "maintenance",
    responses(
        (status = 200, description = "Records evicted by this run", body = RetentionReport)
    )
)]
pub async fn retention(State(state): State<AppState>) -> ApiResult<Json<RetentionReport>> {
    let report = run_retention(&state.store, &state.config.retention, Utc::now()).await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::testing::iss;
    use crate::store::{PositionSample, Store, Visibility};
    use crate::web::state::tests::test_state;

    #[tokio::test]
    async fn backfill_without_element_set_is_unavailable() {
        let request = BackfillRequest { from: 0, to: 10 };
        let result = backfill(State(test_state(Store::in_memory())), Json(request)).await;
        assert!(matches!(result, Err(ApiError::Unavailable(_))));
    }

    #[tokio::test]
    async fn backfill_with_nothing_to_fill() {
        let store = Store::in_memory();
        store.element_sets.upsert(iss()).await.unwrap();
        let request = BackfillRequest { from: 0, to: 10 };
        let Json(response) = backfill(State(test_state(store)), Json(request))
            .await
            .unwrap();
        assert_eq!(response.added, 0);
    }

    #[tokio::test]
    async fn validate_reports_removed_records() {
        let store = Store::in_memory();
        store
            .positions
            .upsert(PositionSample {
                id: PositionSample::live_id(1_700_000_000),
                latitude: 200.0,
                longitude: 0.0,
                altitude_km: 410.0,
                velocity_kmh: 27_600.0,
                timestamp: 1_700_000_000,
                visibility: Visibility::Daylight,
            })
            .await
            .unwrap();
        let Json(report) = validate(State(test_state(store))).await.unwrap();
        assert_eq!(report.positions.removed, 1);
        assert!(report.needs_refetch);
    }
}
