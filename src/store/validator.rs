use std::collections::HashSet;

use serde::Serialize;
use utoipa::ToSchema;

use crate::predict::{parse_epoch, ElementSet, LINE1_MARKER, LINE2_MARKER};
use crate::store::{CrewRecord, PositionSample, Record, Store, StoreError, Table};

/// Records taken from each end of the position dataset. Corruption outside
/// these two windows goes unnoticed.
pub const POSITION_SAMPLE_SIZE: usize = 100;

const TLE_LINE_LENGTH: usize = 69;

/// Field-level schema check for a stored record.
pub trait Validate {
    fn is_valid(&self) -> bool;
}

impl Validate for PositionSample {
    fn is_valid(&self) -> bool {
        !self.id.is_empty()
            && self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.altitude_km.is_finite()
            && self.velocity_kmh.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..180.0).contains(&self.longitude)
            && self.altitude_km > 0.0
            && self.velocity_kmh > 0.0
            && self.timestamp > 0
    }
}

impl Validate for ElementSet {
    fn is_valid(&self) -> bool {
        !self.id.is_empty()
            && self.line1.starts_with(LINE1_MARKER)
            && self.line2.starts_with(LINE2_MARKER)
            && self.line1.len() == TLE_LINE_LENGTH
            && self.line2.len() == TLE_LINE_LENGTH
            && parse_epoch(&self.line1).is_ok()
    }
}

impl Validate for CrewRecord {
    fn is_valid(&self) -> bool {
        !self.id.is_empty() && !self.name.trim().is_empty() && !self.craft.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DatasetReport {
    pub checked: usize,
    pub removed: usize,
}

impl DatasetReport {
    fn wholly_invalid(&self) -> bool {
        self.checked > 0 && self.removed == self.checked
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct CorruptionReport {
    pub positions: DatasetReport,
    pub element_sets: DatasetReport,
    pub crew: DatasetReport,
    /// Stored data can no longer be trusted and should be fetched again.
    pub needs_refetch: bool,
}

/// Check the store and delete whatever fails validation.
///
/// Element sets and crew are checked in full. Positions are only sampled at
/// the oldest and newest [`POSITION_SAMPLE_SIZE`] records.
pub async fn validate_store(store: &Store) -> Result<CorruptionReport, StoreError> {
    let mut sampled = store.positions.ascending(POSITION_SAMPLE_SIZE).await?;
    sampled.extend(store.positions.descending(POSITION_SAMPLE_SIZE).await?);
    let mut seen = HashSet::new();
    sampled.retain(|sample| seen.insert(sample.id.clone()));
    let positions = purge(store.positions.as_ref(), sampled).await?;

    let element_sets = purge(
        store.element_sets.as_ref(),
        store.element_sets.ascending(usize::MAX).await?,
    )
    .await?;
    let crew = purge(store.crew.as_ref(), store.crew.ascending(usize::MAX).await?).await?;

    let needs_refetch =
        positions.removed > 0 || element_sets.wholly_invalid() || crew.wholly_invalid();

    let report = CorruptionReport {
        positions,
        element_sets,
        crew,
        needs_refetch,
    };
    if positions.removed + element_sets.removed + crew.removed > 0 {
        log::warn!(
            "Removed corrupt records: {} positions, {} element sets, {} crew (refetch: {})",
            positions.removed,
            element_sets.removed,
            crew.removed,
            needs_refetch
        );
    }
    Ok(report)
}

async fn purge<R: Record + Validate>(
    table: &dyn Table<R>,
    records: Vec<R>,
) -> Result<DatasetReport, StoreError> {
    let invalid: Vec<String> = records
        .iter()
        .filter(|record| !record.is_valid())
        .map(|record| record.id().to_string())
        .collect();
    let removed = table.bulk_delete(&invalid).await?;
    // Records that failed to load were already dropped from the table.
    let discarded = table.take_discarded_on_load();
    Ok(DatasetReport {
        checked: records.len() + discarded,
        removed: removed + discarded,
    })
}
