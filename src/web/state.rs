use std::sync::Arc;

use tokio::sync::watch;

use crate::predict::{ElementSet, ObserverLocation, Propagator};
use crate::store::backfill::Backfiller;
use crate::store::Store;
use crate::sync::{AppVisibility, SyncCoordinator};
use crate::web::api::error::{ApiError, ApiResult};
use crate::web::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub observer: ObserverLocation,
    pub store: Store,
    pub propagator: Arc<dyn Propagator>,
    pub backfiller: Arc<Backfiller>,
    pub sync: Arc<SyncCoordinator>,
    pub visibility: Arc<watch::Sender<AppVisibility>>,
}

impl AppState {
    /// The element set predictions are computed from: the newest one stored.
    pub async fn element_set(&self) -> ApiResult<ElementSet> {
        self.store
            .latest_element_set()
            .await?
            .ok_or(ApiError::Unavailable("no_element_set"))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::predict::Sgp4Propagator;
    use crate::store::backfill::BackfillConfig;

    /// State over `store` with no sync handlers, observer in Portland.
    pub fn test_state(store: Store) -> AppState {
        let config = Config::from_yaml("observer:\n  coordinates: \"45.5,-122.6\"\n").unwrap();
        let propagator: Arc<dyn Propagator> = Arc::new(Sgp4Propagator);
        let (visibility, rx) = watch::channel(AppVisibility::Visible);
        AppState {
            observer: config.observer().unwrap(),
            config: Arc::new(config),
            store,
            backfiller: Arc::new(Backfiller::new(propagator.clone(), BackfillConfig::default())),
            propagator,
            sync: Arc::new(SyncCoordinator::new(Vec::new(), true, rx)),
            visibility: Arc::new(visibility),
        }
    }

    #[tokio::test]
    async fn empty_store_has_no_element_set() {
        let state = test_state(Store::in_memory());
        assert!(matches!(
            state.element_set().await,
            Err(ApiError::Unavailable("no_element_set"))
        ));
    }
}
