pub mod backfill;
mod error;
pub mod records;
pub mod retention;
mod table;
pub mod validator;

use std::path::Path;
use std::sync::Arc;

pub use error::StoreError;
pub use records::{CrewRecord, PositionSample, Record, Visibility};
pub use table::{JsonTable, Table};

use crate::predict::ElementSet;

/// The three persisted datasets. Each occupies its own key space; there are
/// no cross-table transactions.
#[derive(Clone)]
pub struct Store {
    pub positions: Arc<dyn Table<PositionSample>>,
    pub element_sets: Arc<dyn Table<ElementSet>>,
    pub crew: Arc<dyn Table<CrewRecord>>,
}

impl Store {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        let store = Self {
            positions: Arc::new(JsonTable::open(dir.join("positions.jsonl"))?),
            element_sets: Arc::new(JsonTable::open(dir.join("element_sets.jsonl"))?),
            crew: Arc::new(JsonTable::open(dir.join("crew.jsonl"))?),
        };
        log::info!("Opened store at {}", dir.display());
        Ok(store)
    }

    pub fn in_memory() -> Self {
        Self {
            positions: Arc::new(JsonTable::in_memory()),
            element_sets: Arc::new(JsonTable::in_memory()),
            crew: Arc::new(JsonTable::in_memory()),
        }
    }

    /// Most recently fetched element set, if any.
    pub async fn latest_element_set(&self) -> Result<Option<ElementSet>, StoreError> {
        Ok(self.element_sets.descending(1).await?.into_iter().next())
    }
}
