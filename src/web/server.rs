use axum::{routing::get, routing::post, Router};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::predict::{ElementSetResolver, HttpFetcher, Propagator, Sgp4Propagator};
use crate::store::backfill::Backfiller;
use crate::store::retention::RetentionManager;
use crate::store::validator::validate_store;
use crate::store::{Store, StoreError};
use crate::sync::{
    AppVisibility, CrewSync, ElementSetSync, HttpCrewSource, HttpPositionSource, PositionSync,
    ScheduledHandler, SyncCoordinator,
};

use super::api::maintenance as maintenance_handlers;
use super::api::positions as position_handlers;
use super::api::predict as predict_handlers;
use super::api::sync as sync_handlers;
use super::api_doc::ApiDoc;
use super::config::{Config, ConfigError};
use super::state::AppState;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Predictions
        .route("/api/passes", get(predict_handlers::list_passes))
        .route("/api/passes/next", get(predict_handlers::next_pass))
        .route("/api/orbit/path", get(predict_handlers::orbit_path))
        .route(
            "/api/orbit/parameters",
            get(predict_handlers::orbit_parameters),
        )
        // Stored data
        .route("/api/positions", get(position_handlers::list_positions))
        .route("/api/crew", get(position_handlers::list_crew))
        .route(
            "/api/element-sets/latest",
            get(position_handlers::latest_element_set),
        )
        // Sync
        .route("/api/sync/status", get(sync_handlers::status))
        .route("/api/sync/visibility", post(sync_handlers::set_visibility))
        // Maintenance
        .route(
            "/api/maintenance/backfill",
            post(maintenance_handlers::backfill),
        )
        .route(
            "/api/maintenance/validate",
            post(maintenance_handlers::validate),
        )
        .route(
            "/api/maintenance/retention",
            post(maintenance_handlers::retention),
        )
        // OpenAPI / Swagger
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_handlers(
    config: &Config,
    store: &Store,
) -> Result<Vec<ScheduledHandler>, ServerError> {
    let timeout = config.sources.timeout;
    let resolver = Arc::new(ElementSetResolver::new(
        Arc::new(HttpFetcher::new(timeout)?),
        config.sources.tle.clone(),
    ));
    let positions = HttpPositionSource::new(config.sources.position_url.clone(), timeout)?;
    let crew = HttpCrewSource::new(config.sources.crew_url.clone(), timeout)?;

    Ok(vec![
        ScheduledHandler {
            handler: Arc::new(PositionSync::new(Arc::new(positions), store.clone())),
            interval: config.sync.position_interval,
        },
        ScheduledHandler {
            handler: Arc::new(ElementSetSync::new(resolver, store.clone())),
            interval: config.sync.element_set_interval,
        },
        ScheduledHandler {
            handler: Arc::new(CrewSync::new(Arc::new(crew), store.clone())),
            interval: config.sync.crew_interval,
        },
    ])
}

pub async fn run_server(config: Config) -> Result<(), ServerError> {
    let bind_addr = config.web.bind.clone();
    let observer = config.observer()?;
    let store = Store::open(&config.store.data_dir)?;

    match validate_store(&store).await {
        Ok(report) if report.needs_refetch => {
            log::warn!("Stored data failed validation; relying on the initial sync to refetch")
        }
        Ok(_) => {}
        Err(e) => log::error!("Startup validation failed: {}", e),
    }

    let propagator: Arc<dyn Propagator> = Arc::new(Sgp4Propagator);
    let (visibility_tx, visibility_rx) = watch::channel(AppVisibility::Visible);
    let sync = Arc::new(SyncCoordinator::new(
        build_handlers(&config, &store)?,
        config.sync.pause_on_hidden,
        visibility_rx,
    ));
    let mut retention = RetentionManager::new(store.clone(), config.retention.clone());
    let backfiller = Arc::new(Backfiller::new(
        propagator.clone(),
        config.backfill.clone(),
    ));

    let state = AppState {
        config: Arc::new(config),
        observer,
        store,
        propagator,
        backfiller,
        sync: sync.clone(),
        visibility: Arc::new(visibility_tx),
    };

    sync.start().await;
    retention.start();

    log::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sync.stop().await;
    retention.stop().await;
    served.map_err(ServerError::from)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
}
