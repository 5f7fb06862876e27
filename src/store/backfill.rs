use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::predict::{calculate_orbit_path_at, ElementSet, Propagator};
use crate::store::{PositionSample, Store, StoreError, Visibility};

/// A hole between two consecutive stored samples.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GapInfo {
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub duration_hours: f64,
    /// Only these gaps are eligible for propagated backfill.
    pub use_orbital_calculation: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackfillConfig {
    #[serde(default = "default_expected_interval")]
    pub expected_interval_seconds: i64,
    #[serde(default = "default_orbital_threshold")]
    pub orbital_threshold_hours: f64,
    #[serde(default = "default_max_gap")]
    pub max_gap_hours: f64,
    #[serde(default = "default_synthetic_step")]
    pub synthetic_step_minutes: f64,
}

fn default_expected_interval() -> i64 {
    5
}

fn default_orbital_threshold() -> f64 {
    24.0
}

fn default_max_gap() -> f64 {
    168.0
}

fn default_synthetic_step() -> f64 {
    5.0
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            expected_interval_seconds: default_expected_interval(),
            orbital_threshold_hours: default_orbital_threshold(),
            max_gap_hours: default_max_gap(),
            synthetic_step_minutes: default_synthetic_step(),
        }
    }
}

/// Upper bound on `expected_interval_seconds`, one day.
pub const MAX_EXPECTED_INTERVAL_SECONDS: i64 = 86_400;

impl BackfillConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_EXPECTED_INTERVAL_SECONDS).contains(&self.expected_interval_seconds) {
            return Err(format!(
                "expected_interval_seconds must be between 1 and {}",
                MAX_EXPECTED_INTERVAL_SECONDS
            ));
        }
        let positive = |hours: f64| hours.is_finite() && hours > 0.0;
        if !positive(self.orbital_threshold_hours) || !positive(self.max_gap_hours) {
            return Err("orbital_threshold_hours and max_gap_hours must be positive".into());
        }
        if !positive(self.synthetic_step_minutes) {
            return Err("synthetic_step_minutes must be positive".into());
        }
        Ok(())
    }
}

/// Flag every consecutive pair further apart than three expected intervals.
///
/// `samples` must already be sorted by timestamp.
pub fn detect_gaps(
    samples: &[PositionSample],
    expected_interval_seconds: i64,
    orbital_threshold_hours: f64,
) -> Vec<GapInfo> {
    let tolerance = 3 * expected_interval_seconds;
    samples
        .windows(2)
        .filter(|pair| pair[1].timestamp - pair[0].timestamp > tolerance)
        .map(|pair| {
            let duration_hours = (pair[1].timestamp - pair[0].timestamp) as f64 / 3600.0;
            GapInfo {
                start_timestamp: pair[0].timestamp,
                end_timestamp: pair[1].timestamp,
                duration_hours,
                use_orbital_calculation: duration_hours > orbital_threshold_hours,
            }
        })
        .collect()
}

pub struct Backfiller {
    propagator: Arc<dyn Propagator>,
    config: BackfillConfig,
}

impl Backfiller {
    pub fn new(propagator: Arc<dyn Propagator>, config: BackfillConfig) -> Self {
        Self { propagator, config }
    }

    pub fn fill_gap_with_orbital(&self, gap: &GapInfo, elements: &ElementSet) -> Vec<PositionSample> {
        self.fill_gap_with_orbital_at(gap, elements, Utc::now())
    }

    /// Synthesize samples across `gap` in a single batched path computation.
    /// Gaps longer than `max_gap_hours` are refused outright. The endpoints
    /// are stored samples already, so only instants strictly inside the gap
    /// are produced.
    pub fn fill_gap_with_orbital_at(
        &self,
        gap: &GapInfo,
        elements: &ElementSet,
        now: DateTime<Utc>,
    ) -> Vec<PositionSample> {
        synthesize(self.propagator.as_ref(), &self.config, gap, elements, now)
    }

    pub async fn fill_gaps_in_range(
        &self,
        store: &Store,
        from: i64,
        to: i64,
        elements: &ElementSet,
    ) -> Result<usize, StoreError> {
        self.fill_gaps_in_range_at(store, from, to, elements, Utc::now())
            .await
    }

    /// Backfill every orbital-eligible gap between `from` and `to` (Unix
    /// seconds, inclusive). Returns the number of samples written.
    pub async fn fill_gaps_in_range_at(
        &self,
        store: &Store,
        from: i64,
        to: i64,
        elements: &ElementSet,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut samples = store.positions.between(from, to).await?;
        samples.sort_by_key(|s| s.timestamp);

        let gaps = detect_gaps(
            &samples,
            self.config.expected_interval_seconds,
            self.config.orbital_threshold_hours,
        );
        log::debug!("Found {} gaps between {} and {}", gaps.len(), from, to);

        let propagator = self.propagator.clone();
        let config = self.config.clone();
        let elements = elements.clone();
        let synthetic: Vec<PositionSample> = tokio::task::spawn_blocking(move || {
            gaps.iter()
                .filter(|gap| gap.use_orbital_calculation)
                .flat_map(|gap| synthesize(propagator.as_ref(), &config, gap, &elements, now))
                .collect::<Vec<_>>()
        })
        .await?;

        if synthetic.is_empty() {
            return Ok(0);
        }
        let written = store.positions.bulk_upsert(synthetic).await?;
        log::info!("Backfilled {} synthetic positions", written);
        Ok(written)
    }
}

fn synthesize(
    propagator: &dyn Propagator,
    config: &BackfillConfig,
    gap: &GapInfo,
    elements: &ElementSet,
    now: DateTime<Utc>,
) -> Vec<PositionSample> {
    if gap.duration_hours > config.max_gap_hours {
        log::warn!(
            "Gap of {:.1} h starting at {} exceeds {} h, not backfilling",
            gap.duration_hours,
            gap.start_timestamp,
            config.max_gap_hours
        );
        return Vec::new();
    }

    // Whole seconds keep every synthetic timestamp on an exact second.
    let reference = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
    let start_min = (gap.start_timestamp - reference.timestamp()) as f64 / 60.0;
    let end_min = (gap.end_timestamp - reference.timestamp()) as f64 / 60.0;

    calculate_orbit_path_at(
        propagator,
        elements,
        reference,
        start_min,
        end_min,
        config.synthetic_step_minutes,
    )
    .into_iter()
    .map(|point| {
        let timestamp = point.timestamp.timestamp();
        PositionSample {
            id: PositionSample::synthetic_id(timestamp),
            latitude: point.latitude,
            longitude: point.longitude,
            altitude_km: point.altitude_km,
            velocity_kmh: point.velocity_kmh,
            timestamp,
            visibility: Visibility::Synthetic,
        }
    })
    .filter(|sample| sample.timestamp > gap.start_timestamp && sample.timestamp < gap.end_timestamp)
    .collect()
}
