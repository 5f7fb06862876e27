use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use utoipa::ToSchema;

use crate::store::{Record, Store, StoreError};
use crate::util::duration_str;

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
    /// Element sets kept, newest by fetch time.
    #[serde(default = "default_max_record_count")]
    pub max_record_count: usize,
    #[serde(default = "default_cleanup_batch_size")]
    pub cleanup_batch_size: usize,
    #[serde(default = "default_cleanup_interval", with = "duration_str")]
    pub cleanup_interval: StdDuration,
}

fn default_max_age_days() -> i64 {
    30
}

fn default_max_record_count() -> usize {
    7
}

fn default_cleanup_batch_size() -> usize {
    10_000
}

fn default_cleanup_interval() -> StdDuration {
    StdDuration::from_secs(60)
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            max_record_count: default_max_record_count(),
            cleanup_batch_size: default_cleanup_batch_size(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

/// Upper bound on `max_age_days`, a century.
pub const MAX_AGE_DAYS_LIMIT: i64 = 36_500;

impl RetentionPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_AGE_DAYS_LIMIT).contains(&self.max_age_days) {
            return Err(format!(
                "max_age_days must be between 1 and {}",
                MAX_AGE_DAYS_LIMIT
            ));
        }
        if self.max_record_count == 0 {
            return Err("max_record_count must be at least 1".into());
        }
        if self.cleanup_batch_size == 0 {
            return Err("cleanup_batch_size must be at least 1".into());
        }
        if self.cleanup_interval.is_zero() {
            return Err("cleanup_interval must be non-zero".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RetentionReport {
    pub positions_removed: usize,
    pub element_sets_removed: usize,
}

/// One retention pass. At most one batch of expired positions is removed,
/// so a large backlog drains over several runs.
pub async fn run_retention(
    store: &Store,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<RetentionReport, StoreError> {
    let cutoff = (now - Duration::days(policy.max_age_days)).timestamp();

    let expired: Vec<String> = store
        .positions
        .ascending(policy.cleanup_batch_size)
        .await?
        .into_iter()
        .take_while(|sample| sample.timestamp < cutoff)
        .map(|sample| sample.id)
        .collect();
    let positions_removed = store.positions.bulk_delete(&expired).await?;

    let surplus: Vec<String> = store
        .element_sets
        .descending(usize::MAX)
        .await?
        .into_iter()
        .skip(policy.max_record_count)
        .map(|set| set.id().to_string())
        .collect();
    let element_sets_removed = store.element_sets.bulk_delete(&surplus).await?;

    Ok(RetentionReport {
        positions_removed,
        element_sets_removed,
    })
}

struct WorkerHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

/// Owns the single recurring retention timer.
pub struct RetentionManager {
    store: Store,
    policy: RetentionPolicy,
    worker: Option<WorkerHandle>,
}

impl RetentionManager {
    pub fn new(store: Store, policy: RetentionPolicy) -> Self {
        Self {
            store,
            policy,
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Arm the timer. Calling this while already running does nothing.
    pub fn start(&mut self) {
        if self.worker.is_some() {
            return;
        }
        if let Err(e) = self.policy.validate() {
            log::error!("Retention not started: {}", e);
            return;
        }

        let store = self.store.clone();
        let policy = self.policy.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let join = tokio::spawn(async move {
            let period = policy.cleanup_interval;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = &mut stop_rx => break,
                }
                match run_retention(&store, &policy, Utc::now()).await {
                    Ok(report) if report != RetentionReport::default() => log::info!(
                        "Retention removed {} positions, {} element sets",
                        report.positions_removed,
                        report.element_sets_removed
                    ),
                    Ok(_) => {}
                    Err(e) => log::error!("Retention run failed: {}", e),
                }
            }
        });

        log::info!(
            "Retention started (every {:?}, max age {} days)",
            self.policy.cleanup_interval,
            self.policy.max_age_days
        );
        self.worker = Some(WorkerHandle { stop_tx, join });
    }

    pub async fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.join.await;
            log::info!("Retention stopped");
        }
    }
}
