use utoipa::OpenApi;

use super::api::error::ErrorResponse;
use super::api::maintenance::{BackfillRequest, BackfillResponse};
use super::api::sync::VisibilityRequest;

#[derive(OpenApi)]
#[openapi(
    paths(
        super::api::predict::list_passes,
        super::api::predict::next_pass,
        super::api::predict::orbit_path,
        super::api::predict::orbit_parameters,
        super::api::positions::list_positions,
        super::api::positions::list_crew,
        super::api::positions::latest_element_set,
        super::api::sync::status,
        super::api::sync::set_visibility,
        super::api::maintenance::backfill,
        super::api::maintenance::validate,
        super::api::maintenance::retention,
    ),
    components(
        schemas(
            ErrorResponse,
            BackfillRequest,
            BackfillResponse,
            VisibilityRequest,
            crate::predict::PassPrediction,
            crate::predict::PathPoint,
            crate::predict::GeodeticPoint,
            crate::predict::OrbitalParameters,
            crate::predict::ElementSet,
            crate::predict::TleSource,
            crate::store::PositionSample,
            crate::store::CrewRecord,
            crate::store::Visibility,
            crate::store::retention::RetentionReport,
            crate::store::validator::CorruptionReport,
            crate::store::validator::DatasetReport,
            crate::sync::SyncStatus,
            crate::sync::HandlerStatus,
            crate::sync::AppVisibility,
        )
    ),
    info(
        title = "Orbit Watch API",
        description = "Pass predictions, ground track and the local position history",
        version = "0.1.0"
    ),
    tags(
        (name = "predict", description = "Pass and orbit predictions"),
        (name = "store", description = "Stored positions, crew and element sets"),
        (name = "sync", description = "Periodic data synchronisation"),
        (name = "maintenance", description = "Backfill, validation and retention")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/passes",
            "/api/passes/next",
            "/api/orbit/path",
            "/api/orbit/parameters",
            "/api/positions",
            "/api/crew",
            "/api/element-sets/latest",
            "/api/sync/status",
            "/api/sync/visibility",
            "/api/maintenance/backfill",
            "/api/maintenance/validate",
            "/api/maintenance/retention",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
