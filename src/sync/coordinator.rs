use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use utoipa::ToSchema;

use crate::sync::handlers::SyncHandler;

/// Whether the host application is in the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AppVisibility {
    Visible,
    Hidden,
}

pub struct ScheduledHandler {
    pub handler: Arc<dyn SyncHandler>,
    pub interval: StdDuration,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HandlerStatus {
    pub name: String,
    pub interval_seconds: u64,
    pub runs: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_written: usize,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SyncStatus {
    pub running: bool,
    pub active_timers: usize,
    pub handlers: Vec<HandlerStatus>,
}

struct WorkerHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    async fn shutdown(self) {
        let _ = self.stop_tx.send(());
        let _ = self.join.await;
    }
}

#[derive(Default)]
struct State {
    running: bool,
    timers: Vec<WorkerHandle>,
    listener: Option<WorkerHandle>,
}

/// Periodic fetch-and-store for every data type.
///
/// Each handler gets its own timer task, so a slow or failing handler never
/// delays the others and a handler's ticks never overlap.
pub struct SyncCoordinator {
    handlers: Arc<Vec<ScheduledHandler>>,
    statuses: Arc<StdMutex<Vec<HandlerStatus>>>,
    pause_on_hidden: bool,
    visibility: watch::Receiver<AppVisibility>,
    state: Arc<Mutex<State>>,
}

impl SyncCoordinator {
    pub fn new(
        handlers: Vec<ScheduledHandler>,
        pause_on_hidden: bool,
        visibility: watch::Receiver<AppVisibility>,
    ) -> Self {
        let handlers: Vec<ScheduledHandler> = handlers
            .into_iter()
            .filter(|h| {
                if h.interval.is_zero() {
                    log::error!("Sync handler {} has a zero interval, skipping", h.handler.name());
                }
                !h.interval.is_zero()
            })
            .collect();
        let statuses = handlers
            .iter()
            .map(|h| HandlerStatus {
                name: h.handler.name().to_string(),
                interval_seconds: h.interval.as_secs(),
                runs: 0,
                last_run: None,
                last_written: 0,
                last_error: None,
            })
            .collect();
        Self {
            handlers: Arc::new(handlers),
            statuses: Arc::new(StdMutex::new(statuses)),
            pause_on_hidden,
            visibility,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Sync everything now and keep syncing on each handler's interval.
    /// No-op when already running.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if state.running {
            return;
        }
        state.running = true;

        let hidden = self.pause_on_hidden && *self.visibility.borrow() == AppVisibility::Hidden;
        if hidden {
            log::info!("Sync started while hidden; waiting for visibility");
        } else {
            state.timers = arm(&self.handlers, &self.statuses);
        }

        if self.pause_on_hidden {
            state.listener = Some(spawn_listener(
                self.visibility.clone(),
                self.handlers.clone(),
                self.statuses.clone(),
                self.state.clone(),
            ));
        }
        log::info!("Sync coordinator started ({} handlers)", self.handlers.len());
    }

    /// Cancel every timer and the visibility listener. Safe to call repeatedly.
    pub async fn stop(&self) {
        let (timers, listener) = {
            let mut state = self.state.lock().await;
            if !state.running {
                return;
            }
            state.running = false;
            (std::mem::take(&mut state.timers), state.listener.take())
        };

        if let Some(listener) = listener {
            listener.shutdown().await;
        }
        for timer in timers {
            timer.shutdown().await;
        }
        log::info!("Sync coordinator stopped");
    }

    pub async fn active_timers(&self) -> usize {
        self.state.lock().await.timers.len()
    }

    pub async fn status(&self) -> SyncStatus {
        let (running, active_timers) = {
            let state = self.state.lock().await;
            (state.running, state.timers.len())
        };
        SyncStatus {
            running,
            active_timers,
            handlers: self
                .statuses
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

fn arm(
    handlers: &Arc<Vec<ScheduledHandler>>,
    statuses: &Arc<StdMutex<Vec<HandlerStatus>>>,
) -> Vec<WorkerHandle> {
    (0..handlers.len())
        .map(|index| spawn_timer(handlers.clone(), statuses.clone(), index))
        .collect()
}

fn spawn_timer(
    handlers: Arc<Vec<ScheduledHandler>>,
    statuses: Arc<StdMutex<Vec<HandlerStatus>>>,
    index: usize,
) -> WorkerHandle {
    let (stop_tx, stop_rx) = oneshot::channel();

    let join = tokio::spawn(async move {
        let scheduled = &handlers[index];
        let mut ticker = interval(scheduled.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let ticks = async {
            loop {
                ticker.tick().await;
                let result = scheduled.handler.sync().await;
                record(&statuses, index, scheduled.handler.name(), result);
            }
        };

        // Stopping also abandons a sync that is still in flight.
        tokio::select! {
            _ = ticks => {}
            _ = stop_rx => {}
        }
    });

    WorkerHandle { stop_tx, join }
}

fn record(
    statuses: &StdMutex<Vec<HandlerStatus>>,
    index: usize,
    name: &str,
    result: Result<usize, crate::sync::SyncError>,
) {
    let mut statuses = statuses.lock().unwrap_or_else(PoisonError::into_inner);
    let Some(status) = statuses.get_mut(index) else {
        return;
    };
    status.runs += 1;
    status.last_run = Some(Utc::now());
    match result {
        Ok(written) => {
            log::debug!("Sync {} wrote {} records", name, written);
            status.last_written = written;
            status.last_error = None;
        }
        Err(e) => {
            log::warn!("Sync {} failed: {}", name, e);
            status.last_error = Some(e.to_string());
        }
    }
}

fn spawn_listener(
    mut visibility: watch::Receiver<AppVisibility>,
    handlers: Arc<Vec<ScheduledHandler>>,
    statuses: Arc<StdMutex<Vec<HandlerStatus>>>,
    state: Arc<Mutex<State>>,
) -> WorkerHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel();

    let join = tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = visibility.changed() => {
                    if changed.is_err() {
                        log::debug!("Visibility sender dropped; listener exiting");
                        break;
                    }
                }
                _ = &mut stop_rx => break,
            }

            let current = *visibility.borrow_and_update();
            match current {
                AppVisibility::Hidden => {
                    let timers = std::mem::take(&mut state.lock().await.timers);
                    if !timers.is_empty() {
                        log::info!("Hidden: pausing {} sync timers", timers.len());
                    }
                    for timer in timers {
                        timer.shutdown().await;
                    }
                }
                AppVisibility::Visible => {
                    let mut guard = state.lock().await;
                    if guard.running && guard.timers.is_empty() {
                        log::info!("Visible again: resuming sync");
                        guard.timers = arm(&handlers, &statuses);
                    }
                }
            }
        }
    });

    WorkerHandle { stop_tx, join }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::time::sleep;

    use super::*;
    use crate::sync::SyncError;

    struct Counting {
        name: &'static str,
        calls: AtomicUsize,
        fail: bool,
    }

    impl Counting {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
                fail,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SyncHandler for Counting {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn sync(&self) -> Result<usize, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SyncError::Decode("boom".into()))
            } else {
                Ok(1)
            }
        }
    }

    struct Fixture {
        positions: Arc<Counting>,
        element_sets: Arc<Counting>,
        crew: Arc<Counting>,
        visibility: watch::Sender<AppVisibility>,
        coordinator: SyncCoordinator,
    }

    fn fixture(initial: AppVisibility, crew_fails: bool) -> Fixture {
        let positions = Counting::new("positions", false);
        let element_sets = Counting::new("element_sets", false);
        let crew = Counting::new("crew", crew_fails);
        let (visibility, rx) = watch::channel(initial);
        let coordinator = SyncCoordinator::new(
            vec![
                ScheduledHandler {
                    handler: positions.clone(),
                    interval: StdDuration::from_secs(5),
                },
                ScheduledHandler {
                    handler: element_sets.clone(),
                    interval: StdDuration::from_secs(3600),
                },
                ScheduledHandler {
                    handler: crew.clone(),
                    interval: StdDuration::from_secs(5),
                },
            ],
            true,
            rx,
        );
        Fixture {
            positions,
            element_sets,
            crew,
            visibility,
            coordinator,
        }
    }

    async fn settle() {
        sleep(StdDuration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_handler_is_not_scheduled() {
        let stuck = Counting::new("stuck", false);
        let (_visibility, rx) = watch::channel(AppVisibility::Visible);
        let coordinator = SyncCoordinator::new(
            vec![ScheduledHandler {
                handler: stuck.clone(),
                interval: StdDuration::ZERO,
            }],
            true,
            rx,
        );
        coordinator.start().await;
        settle().await;
        assert_eq!(coordinator.active_timers().await, 0);
        assert_eq!(stuck.calls(), 0);
        assert!(coordinator.status().await.handlers.is_empty());
        coordinator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_syncs_immediately_then_on_interval() {
        let f = fixture(AppVisibility::Visible, false);
        f.coordinator.start().await;
        settle().await;
        assert_eq!(f.positions.calls(), 1);
        assert_eq!(f.element_sets.calls(), 1);
        assert_eq!(f.crew.calls(), 1);

        sleep(StdDuration::from_secs(12)).await;
        assert_eq!(f.positions.calls(), 3);
        assert_eq!(f.element_sets.calls(), 1);
        f.coordinator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failing_handler_does_not_block_others() {
        let f = fixture(AppVisibility::Visible, true);
        f.coordinator.start().await;
        sleep(StdDuration::from_secs(11)).await;

        assert_eq!(f.crew.calls(), 3);
        assert_eq!(f.positions.calls(), 3);
        let status = f.coordinator.status().await;
        let crew = status.handlers.iter().find(|h| h.name == "crew").unwrap();
        assert!(crew.last_error.is_some());
        let positions = status.handlers.iter().find(|h| h.name == "positions").unwrap();
        assert!(positions.last_error.is_none());
        assert_eq!(positions.runs, 3);
        f.coordinator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_stop_are_idempotent() {
        let f = fixture(AppVisibility::Visible, false);
        f.coordinator.start().await;
        f.coordinator.start().await;
        settle().await;
        assert_eq!(f.coordinator.active_timers().await, 3);
        assert_eq!(f.positions.calls(), 1);

        f.coordinator.stop().await;
        f.coordinator.stop().await;
        assert_eq!(f.coordinator.active_timers().await, 0);
        assert!(!f.coordinator.status().await.running);

        sleep(StdDuration::from_secs(30)).await;
        assert_eq!(f.positions.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_pauses_and_visible_resumes_with_fresh_sync() {
        let f = fixture(AppVisibility::Visible, false);
        f.coordinator.start().await;
        settle().await;

        f.visibility.send_replace(AppVisibility::Hidden);
        settle().await;
        assert_eq!(f.coordinator.active_timers().await, 0);
        sleep(StdDuration::from_secs(60)).await;
        assert_eq!(f.positions.calls(), 1);

        f.visibility.send_replace(AppVisibility::Visible);
        settle().await;
        assert_eq!(f.coordinator.active_timers().await, 3);
        assert_eq!(f.positions.calls(), 2);
        assert_eq!(f.element_sets.calls(), 2);
        f.coordinator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn starting_hidden_waits_for_visibility() {
        let f = fixture(AppVisibility::Hidden, false);
        f.coordinator.start().await;
        settle().await;
        assert!(f.coordinator.status().await.running);
        assert_eq!(f.coordinator.active_timers().await, 0);
        assert_eq!(f.positions.calls(), 0);

        f.visibility.send_replace(AppVisibility::Visible);
        settle().await;
        assert_eq!(f.positions.calls(), 1);

        f.coordinator.stop().await;
        assert_eq!(f.coordinator.active_timers().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn visibility_change_after_stop_does_not_rearm() {
        let f = fixture(AppVisibility::Visible, false);
        f.coordinator.start().await;
        f.coordinator.stop().await;

        f.visibility.send_replace(AppVisibility::Hidden);
        f.visibility.send_replace(AppVisibility::Visible);
        settle().await;
        assert_eq!(f.coordinator.active_timers().await, 0);
    }
}
