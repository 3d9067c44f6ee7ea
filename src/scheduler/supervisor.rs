//! Health supervision for the scheduler loop.
//!
//! Periodically checks the scheduler and restarts it when the loop has died
//! or the schedule has drifted past its grace period. Restart failures are
//! logged and retried at the next check rather than propagated.

use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::watch;

use crate::scheduler::engine::Scheduler;

const SUPERVISOR_PERIOD: Duration = Duration::from_secs(300);

pub struct HealthSupervisor {
    scheduler: Scheduler,
    period: Duration,
}

impl HealthSupervisor {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            period: SUPERVISOR_PERIOD,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Run the check loop until the shutdown signal flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Health supervisor running (period {:?})", self.period);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Health supervisor shutting down");
                        return;
                    }
                }
                _ = tokio::time::sleep(self.period) => {
                    self.check().await;
                }
            }
        }
    }

    async fn check(&self) {
        if self.scheduler.is_healthy() {
            debug!("Scheduler healthy");
            return;
        }

        warn!("Scheduler unhealthy, restarting");
        match self.scheduler.restart().await {
            Ok(()) => info!("Scheduler restarted by health supervisor"),
            Err(e) => error!("Health supervisor failed to restart scheduler: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulingConfig;
    use crate::error::Result;
    use crate::pipeline::update::{PipelineResult, UpdateCallback};
    use crate::scheduler::store::StateStore;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct NoopCallback;

    #[async_trait]
    impl UpdateCallback for NoopCallback {
        async fn run(&self) -> Result<PipelineResult> {
            Ok(PipelineResult::default())
        }
    }

    fn scheduler_in(dir: &TempDir) -> Scheduler {
        Scheduler::new(StateStore::new(dir.path().join("state.json")), Arc::new(NoopCallback))
    }

    #[tokio::test]
    async fn test_supervisor_restarts_dead_scheduler() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler_in(&dir);
        scheduler
            .start(SchedulingConfig {
                update_days: 7,
                fixed_update_time: "XX:XX".to_string(),
            })
            .unwrap();

        // Kill the loop behind the supervisor's back.
        scheduler.stop().await;
        assert!(!scheduler.is_healthy());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = HealthSupervisor::new(scheduler.clone()).with_period(Duration::from_millis(10));
        let handle = tokio::spawn(supervisor.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(scheduler.is_healthy());

        shutdown_tx.send_replace(true);
        handle.await.unwrap();
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_supervisor_exits_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler_in(&dir);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(
            HealthSupervisor::new(scheduler)
                .with_period(Duration::from_secs(60))
                .run(shutdown_rx),
        );

        shutdown_tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
