//! Scheduler engine.
//!
//! Owns the persisted schedule state and the background loop that sleeps
//! until the next trigger, fires the update callback, and reschedules. The
//! loop never sleeps longer than `RECHECK_INTERVAL` so a clock jump or
//! suspend/resume is noticed within minutes rather than days.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::Duration;
use log::{error, info, warn};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;

use crate::clock::{Clock, SystemClock};
use crate::config::SchedulingConfig;
use crate::error::{GraphbotError, Result};
use crate::pipeline::update::{PipelineResult, UpdateCallback};
use crate::scheduler::recovery::{repair_schedule_state, validate_schedule_integrity};
use crate::scheduler::schedule::{FixedTime, compute_next_trigger};
use crate::scheduler::state::{ScheduleState, SchedulerStatus};
use crate::scheduler::store::StateStore;

/// Upper bound on a single loop sleep.
const RECHECK_INTERVAL: StdDuration = StdDuration::from_secs(300);

/// How far past its trigger the schedule may drift before the scheduler is
/// considered unhealthy.
const HEALTH_GRACE_SECS: i64 = 15 * 60;

/// How long `stop` waits for the loop before aborting it.
const STOP_TIMEOUT: StdDuration = StdDuration::from_secs(5);

struct Inner {
    clock: Arc<dyn Clock>,
    store: StateStore,
    callback: Arc<dyn UpdateCallback>,
    state: Mutex<ScheduleState>,
    config: Mutex<Option<SchedulingConfig>>,
    /// Held for the duration of a pipeline run; guarantees at most one run
    /// in flight whether triggered by the loop or by `force_update`.
    run_lock: AsyncMutex<()>,
    shutdown_tx: watch::Sender<bool>,
    loop_task: Mutex<Option<JoinHandle<()>>>,
    recheck: StdDuration,
}

/// Handle to the update scheduler. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(store: StateStore, callback: Arc<dyn UpdateCallback>) -> Self {
        Self::with_clock(store, callback, Arc::new(SystemClock))
    }

    pub fn with_clock(store: StateStore, callback: Arc<dyn UpdateCallback>, clock: Arc<dyn Clock>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                clock,
                store,
                callback,
                state: Mutex::new(ScheduleState::new()),
                config: Mutex::new(None),
                run_lock: AsyncMutex::new(()),
                shutdown_tx,
                loop_task: Mutex::new(None),
                recheck: RECHECK_INTERVAL,
            }),
        }
    }

    /// Shrink the loop's re-check bound. Test hook.
    #[cfg(test)]
    pub fn with_recheck(mut self, recheck: StdDuration) -> Self {
        let inner = Arc::get_mut(&mut self.inner).expect("with_recheck after sharing");
        inner.recheck = recheck;
        self
    }

    /// Load persisted state, repair it if needed, and start the trigger loop.
    ///
    /// Idempotent on the config: calling `start` while already running stops
    /// the previous loop first.
    pub fn start(&self, config: SchedulingConfig) -> Result<()> {
        config.validate()?;

        let fixed = FixedTime::parse(&config.fixed_update_time)?;
        let now = self.inner.clock.now();

        let (mut state, stored_config) = self.inner.store.load();

        for issue in validate_schedule_integrity(now, &state, &config) {
            warn!("Schedule integrity: {issue}");
        }

        if let Some(stored) = stored_config
            && stored != config
        {
            info!(
                "Scheduling config changed (was {}d @ {}, now {}d @ {}), recomputing next trigger",
                stored.update_days, stored.fixed_update_time, config.update_days, config.fixed_update_time
            );
            state.next_update = None;
        }

        repair_schedule_state(now, &mut state, config.update_days, fixed);
        state.is_running = true;

        if let Some(next) = state.next_update {
            info!("Scheduler started: next update at {}", next.format("%Y-%m-%d %H:%M:%S"));
        }

        self.inner.store.save(&state, Some(&config))?;
        *self.inner.state.lock().unwrap() = state;
        *self.inner.config.lock().unwrap() = Some(config);

        // Reset the shutdown flag in case this is a restart.
        self.inner.shutdown_tx.send_replace(false);
        let shutdown_rx = self.inner.shutdown_tx.subscribe();
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(run_loop(inner, shutdown_rx));
        if let Some(previous) = self.inner.loop_task.lock().unwrap().replace(handle)
            && !previous.is_finished()
        {
            warn!("Replacing a still-running scheduler loop");
            previous.abort();
        }
        Ok(())
    }

    /// Signal the loop to exit, wait briefly, and persist the stopped state.
    pub async fn stop(&self) {
        self.inner.shutdown_tx.send_replace(true);

        let handle = self.inner.loop_task.lock().unwrap().take();
        if let Some(handle) = handle {
            let abort = handle.abort_handle();
            if tokio::time::timeout(STOP_TIMEOUT, handle).await.is_err() {
                warn!("Scheduler loop did not stop within {STOP_TIMEOUT:?}, aborting");
                abort.abort();
            }
        }

        let state = {
            let mut state = self.inner.state.lock().unwrap();
            state.is_running = false;
            state.clone()
        };
        let config = self.inner.config.lock().unwrap().clone();
        if let Err(e) = self.inner.store.save(&state, config.as_ref()) {
            error!("Failed to persist state on stop: {e}");
        }
        info!("Scheduler stopped");
    }

    /// Stop and start again with the same config. Used by the health
    /// supervisor when the loop has died or drifted.
    pub async fn restart(&self) -> Result<()> {
        let config = self
            .inner
            .config
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| GraphbotError::InvalidState("cannot restart a scheduler that was never started".to_string()))?;
        self.stop().await;
        self.start(config)
    }

    /// Run the pipeline immediately, outside the schedule.
    ///
    /// Waits if a scheduled run is in flight. The run is recorded and the
    /// next trigger re-anchored exactly as for a scheduled run.
    pub async fn force_update(&self) -> Result<PipelineResult> {
        if self.inner.config.lock().unwrap().is_none() {
            return Err(GraphbotError::InvalidState("scheduler has not been started".to_string()));
        }

        let _guard = self.inner.run_lock.lock().await;
        info!("Manual update requested");
        let outcome = self.inner.callback.run().await;
        // Record the attempt either way so a failing pipeline retries at the
        // next interval instead of immediately.
        self.inner.record_run();
        outcome
    }

    /// True while the loop task is alive and the schedule has not drifted
    /// more than the grace period past its trigger.
    pub fn is_healthy(&self) -> bool {
        let alive = self
            .inner
            .loop_task
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|h| !h.is_finished());
        if !alive {
            return false;
        }

        let now = self.inner.clock.now();
        match self.inner.state.lock().unwrap().next_update {
            Some(next) => (now - next) < Duration::seconds(HEALTH_GRACE_SECS),
            None => true,
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.inner.state.lock().unwrap().clone();
        let config = self.inner.config.lock().unwrap().clone();
        SchedulerStatus {
            is_running: state.is_running,
            last_update: state.last_update,
            next_update: state.next_update,
            update_days: config.as_ref().map(|c| c.update_days),
            fixed_update_time: config.map(|c| c.fixed_update_time),
        }
    }

    pub fn next_update_time(&self) -> Option<chrono::DateTime<chrono::Local>> {
        self.inner.state.lock().unwrap().next_update
    }

    pub fn last_update_time(&self) -> Option<chrono::DateTime<chrono::Local>> {
        self.inner.state.lock().unwrap().last_update
    }
}

impl Inner {
    /// Record a completed (or attempted) run and schedule the next one.
    fn record_run(&self) {
        let config = match self.config.lock().unwrap().clone() {
            Some(config) => config,
            None => return,
        };
        let fixed = match FixedTime::parse(&config.fixed_update_time) {
            Ok(fixed) => fixed,
            Err(e) => {
                error!("Stored fixed_update_time became invalid: {e}");
                return;
            }
        };

        let now = self.clock.now();
        let state = {
            let mut state = self.state.lock().unwrap();
            state.record_update(now);
            let next = compute_next_trigger(now, config.update_days, fixed, Some(now));
            state.set_next_update(next);
            info!("Next update scheduled for {}", next.format("%Y-%m-%d %H:%M:%S"));
            state.clone()
        };

        // A persistence failure costs crash recovery, not the live schedule.
        if let Err(e) = self.store.save(&state, Some(&config)) {
            error!("Failed to persist schedule state: {e}");
        }
    }
}

async fn run_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        let now = inner.clock.now();
        let next = inner.state.lock().unwrap().next_update;
        let Some(next) = next else {
            // Repaired at start, so this only happens transiently.
            tokio::time::sleep(inner.recheck).await;
            continue;
        };

        if next <= now {
            fire(&inner).await;
            continue;
        }

        let until = (next - now).to_std().unwrap_or(StdDuration::ZERO);
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
            _ = tokio::time::sleep(until.min(inner.recheck)) => {}
        }
    }
}

/// Fire one scheduled run, re-checking due-ness under the run lock since a
/// manual update may have just moved the trigger.
async fn fire(inner: &Arc<Inner>) {
    let _guard = inner.run_lock.lock().await;

    let now = inner.clock.now();
    let still_due = inner.state.lock().unwrap().next_update.is_some_and(|next| next <= now);
    if !still_due {
        return;
    }

    info!("Scheduled update triggered");
    match inner.callback.run().await {
        Ok(result) => {
            info!(
                "Update complete: {}/{} graphs posted ({} errors)",
                result.graphs_posted,
                result.graphs_requested,
                result.errors.len()
            );
        }
        Err(e) => error!("Scheduled update failed: {e}"),
    }
    inner.record_run();
}
