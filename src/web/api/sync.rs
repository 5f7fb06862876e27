use axum::{extract::State, Json};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::sync::{AppVisibility, SyncStatus};
use crate::web::api::error::ApiResult;
use crate::web::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct VisibilityRequest {
    pub visible: bool,
}

#[utoipa::path(
    get,
    path = "/api/sync/status",
    tag = "sync",
    responses(
        (status = 200, description = "Coordinator and per-handler state", body = SyncStatus)
    )
)]
pub async fn status(State(state): State<AppState>) -> ApiResult<Json<SyncStatus>> {
    Ok(Json(state.sync.status().await))
}

/// Hosts report foreground/background here; hidden pauses all timers.
#[utoipa::path(
    post,
    path = "/api/sync/visibility",
    tag = "sync",
    request_body = VisibilityRequest,
    responses(
        (status = 200, description = "Visibility recorded", body = AppVisibility)
    )
)]
pub async fn set_visibility(
    State(state): State<AppState>,
    Json(request): Json<VisibilityRequest>,
) -> ApiResult<Json<AppVisibility>> {
    let visibility = if request.visible {
        AppVisibility::Visible
    } else {
        AppVisibility::Hidden
    };
    state.visibility.send_if_modified(|current| {
        let changed = *current != visibility;
        *current = visibility;
        changed
    });
    log::info!("App visibility set to {:?}", visibility);
    Ok(Json(visibility))
}
