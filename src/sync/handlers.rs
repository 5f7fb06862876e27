use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::predict::{ElementSetResolver, TleSource};
use crate::store::{Record, Store};
use crate::sync::error::SyncError;
use crate::sync::sources::{CrewSource, PositionSource};

/// One periodically refreshed data type. Returns the number of records written.
#[async_trait]
pub trait SyncHandler: Send + Sync {
    fn name(&self) -> &'static str;
    async fn sync(&self) -> Result<usize, SyncError>;
}

pub struct PositionSync {
    source: Arc<dyn PositionSource>,
    store: Store,
}

impl PositionSync {
    pub fn new(source: Arc<dyn PositionSource>, store: Store) -> Self {
        Self { source, store }
    }
}

#[async_trait]
impl SyncHandler for PositionSync {
    fn name(&self) -> &'static str {
        "positions"
    }

    async fn sync(&self) -> Result<usize, SyncError> {
        let sample = self.source.current_position().await?;
        log::debug!(
            "Position {:.3},{:.3} at {}",
            sample.latitude,
            sample.longitude,
            sample.timestamp
        );
        self.store.positions.upsert(sample).await?;
        Ok(1)
    }
}

pub struct ElementSetSync {
    resolver: Arc<ElementSetResolver>,
    store: Store,
}

impl ElementSetSync {
    pub fn new(resolver: Arc<ElementSetResolver>, store: Store) -> Self {
        Self { resolver, store }
    }
}

#[async_trait]
impl SyncHandler for ElementSetSync {
    fn name(&self) -> &'static str {
        "element_sets"
    }

    /// The built-in fallback is only stored when nothing better is on disk,
    /// so an outage never buries real sets under the old embedded one.
    async fn sync(&self) -> Result<usize, SyncError> {
        let set = self.resolver.fetch_element_set().await;
        if set.source == TleSource::Fallback && self.store.element_sets.count().await? > 0 {
            log::info!("Keeping stored element sets over the built-in fallback");
            return Ok(0);
        }
        self.store.element_sets.upsert(set).await?;
        Ok(1)
    }
}

pub struct CrewSync {
    source: Arc<dyn CrewSource>,
    store: Store,
}

impl CrewSync {
    pub fn new(source: Arc<dyn CrewSource>, store: Store) -> Self {
        Self { source, store }
    }
}

#[async_trait]
impl SyncHandler for CrewSync {
    fn name(&self) -> &'static str {
        "crew"
    }

    /// Replace the stored roster: current members are upserted and anyone
    /// no longer listed is removed.
    async fn sync(&self) -> Result<usize, SyncError> {
        let roster = self.source.current_crew().await?;
        let current: HashSet<String> = roster.iter().map(|r| r.id().to_string()).collect();

        let stale: Vec<String> = self
            .store
            .crew
            .ascending(usize::MAX)
            .await?
            .into_iter()
            .map(|r| r.id)
            .filter(|id| !current.contains(id))
            .collect();

        let written = self.store.crew.bulk_upsert(roster).await?;
        let removed = self.store.crew.bulk_delete(&stale).await?;
        if removed > 0 {
            log::info!("Removed {} crew no longer aboard", removed);
        }
        Ok(written)
    }
}
