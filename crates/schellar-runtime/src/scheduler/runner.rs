use std::sync::{Arc, Mutex};

use schellar_core::config::SchedulerConfig;
use schellar_core::{SchellarError, ScheduleStore, WorkflowEngine};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::reconciler::ReconciliationLoop;
use super::registry::{ReconcileReport, TimerRegistry};
use super::trigger::TriggerHandler;
use super::SchedulerResult;
use crate::metrics::SchedulerMetrics;

/// The schedule engine as one unit: timer registry plus reconciliation loop.
pub struct Scheduler {
    registry: Arc<TimerRegistry>,
    reconciler: Arc<ReconciliationLoop>,
    shutdown: CancellationToken,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Wire the scheduler components over the given ports.
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        engine: Arc<dyn WorkflowEngine>,
        config: &SchedulerConfig,
        metrics: Arc<SchedulerMetrics>,
    ) -> schellar_core::Result<Self> {
        let timezone = config.tz().ok_or_else(|| {
            SchellarError::Config(format!("Unknown timezone '{}'", config.timezone))
        })?;

        let handler = Arc::new(
            TriggerHandler::new(store.clone(), engine.clone(), config.call_timeout())
                .with_metrics(metrics.clone()),
        );
        let registry = Arc::new(
            TimerRegistry::new(store.clone(), handler, timezone, config.call_timeout())
                .with_metrics(metrics.clone()),
        );
        let reconciler = Arc::new(
            ReconciliationLoop::new(
                store,
                engine,
                config.check_interval(),
                config.call_timeout(),
            )
            .with_metrics(metrics),
        );

        Ok(Self {
            registry,
            reconciler,
            shutdown: CancellationToken::new(),
            loop_handle: Mutex::new(None),
        })
    }

    /// The timer registry.
    pub fn registry(&self) -> &Arc<TimerRegistry> {
        &self.registry
    }

    /// The reconciliation loop.
    pub fn reconciler(&self) -> &Arc<ReconciliationLoop> {
        &self.reconciler
    }

    /// Arm timers for every enabled schedule and start the reconciliation
    /// loop.
    ///
    /// Fails if storage cannot be read; the loop is not started in that case.
    pub async fn start(&self) -> SchedulerResult<ReconcileReport> {
        let report = self.registry.reconcile().await?;
        tracing::info!(timers = report.active, "Scheduler started");

        let reconciler = self.reconciler.clone();
        let shutdown = self.shutdown.child_token();
        let handle = tokio::spawn(async move {
            reconciler.run(shutdown).await;
        });

        let previous = self
            .loop_handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }

        Ok(report)
    }

    /// Re-sync timers with storage after a schedule was written.
    pub async fn reconcile(&self) -> SchedulerResult<ReconcileReport> {
        self.registry.reconcile().await
    }

    /// Stop the reconciliation loop and every timer.
    ///
    /// Ticks already in flight are not interrupted.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        self.registry.stop_all();

        let handle = self
            .loop_handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Reconciliation loop ended abnormally");
            }
        }
        tracing::info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schellar_core::testing::{FailingStore, MemoryEngine};
    use schellar_core::{MemoryScheduleStore, Schedule};

    fn metrics() -> Arc<SchedulerMetrics> {
        Arc::new(SchedulerMetrics::new().unwrap())
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let store = Arc::new(MemoryScheduleStore::with_schedules([Schedule::new(
            "nightly",
            "0 0 * * *",
            "wf1",
            "1",
        )]));
        let scheduler = Scheduler::new(
            store,
            Arc::new(MemoryEngine::new()),
            &SchedulerConfig::default(),
            metrics(),
        )
        .unwrap();

        let report = scheduler.start().await.unwrap();
        assert_eq!(report.active, 1);
        assert_eq!(scheduler.registry().len(), 1);

        scheduler.stop().await;
        assert!(scheduler.registry().is_empty());
    }

    #[tokio::test]
    async fn test_start_fails_when_storage_unavailable() {
        let scheduler = Scheduler::new(
            Arc::new(FailingStore::new()),
            Arc::new(MemoryEngine::new()),
            &SchedulerConfig::default(),
            metrics(),
        )
        .unwrap();

        assert!(scheduler.start().await.is_err());
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let config = SchedulerConfig {
            timezone: "Atlantis/Capital".into(),
            ..Default::default()
        };
        let result = Scheduler::new(
            Arc::new(MemoryScheduleStore::new()),
            Arc::new(MemoryEngine::new()),
            &config,
            metrics(),
        );
        assert!(matches!(result, Err(SchellarError::Config(_))));
    }
}
