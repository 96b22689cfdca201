use std::sync::Arc;
use std::time::{Duration, Instant};

use schellar_core::{Schedule, ScheduleStatus, ScheduleStore, WorkflowEngine};
use tokio_util::sync::CancellationToken;

use super::{bounded, SchedulerResult};
use crate::metrics::SchedulerMetrics;

/// How one RUNNING schedule was resolved in a pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// An instance is still running; nothing was written.
    StillRunning,
    /// The latest instance finished with this status, which was persisted.
    Finished(ScheduleStatus),
    /// Marked RUNNING but the engine knows no instance for it.
    Inconsistent,
    /// A storage or engine call failed for this schedule.
    Error(String),
}

impl Resolution {
    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StillRunning => "still_running",
            Self::Finished(_) => "finished",
            Self::Inconsistent => "inconsistent",
            Self::Error(_) => "error",
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// Resolution per RUNNING schedule, in storage order.
    pub resolutions: Vec<(String, Resolution)>,
    /// Wall time of the pass.
    pub elapsed: Duration,
}

impl PassReport {
    /// Resolution for a schedule, if it was examined.
    pub fn resolution(&self, name: &str) -> Option<&Resolution> {
        self.resolutions
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r)
    }

    /// Number of schedules examined.
    pub fn len(&self) -> usize {
        self.resolutions.len()
    }

    /// Check if the pass examined nothing.
    pub fn is_empty(&self) -> bool {
        self.resolutions.is_empty()
    }
}

/// Background loop resolving RUNNING schedules to their final status.
///
/// Ticks only ever move a schedule to RUNNING; this loop is what moves it
/// back once the engine reports the instance finished, folding the
/// instance output into the workflow context for the next launch.
pub struct ReconciliationLoop {
    store: Arc<dyn ScheduleStore>,
    engine: Arc<dyn WorkflowEngine>,
    interval: Duration,
    call_timeout: Duration,
    metrics: Option<Arc<SchedulerMetrics>>,
}

impl ReconciliationLoop {
    /// Create a new reconciliation loop.
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        engine: Arc<dyn WorkflowEngine>,
        interval: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            engine,
            interval,
            call_timeout,
            metrics: None,
        }
    }

    /// Record pass outcomes into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<SchedulerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run passes until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(interval = ?self.interval, "Reconciliation loop started");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let started = Instant::now();
            match self.run_pass().await {
                Ok(report) if !report.is_empty() => {
                    tracing::debug!(
                        checked = report.len(),
                        elapsed = ?report.elapsed,
                        "Reconciliation pass complete"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load RUNNING schedules");
                }
            }

            let remaining = self.interval.saturating_sub(started.elapsed());
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(remaining) => {}
            }
        }

        tracing::info!("Reconciliation loop stopped");
    }

    /// Examine every RUNNING schedule once.
    ///
    /// Fails only when the RUNNING schedules cannot be loaded; per-schedule
    /// failures are reported as [`Resolution::Error`].
    pub async fn run_pass(&self) -> SchedulerResult<PassReport> {
        let started = Instant::now();
        let schedules = bounded(
            "find_by_status",
            self.call_timeout,
            self.store.find_by_status(&ScheduleStatus::Running),
        )
        .await?;

        if !schedules.is_empty() {
            tracing::debug!(count = schedules.len(), "Checking running workflows");
        }

        let mut report = PassReport::default();
        for schedule in schedules {
            let resolution = match self.resolve(&schedule).await {
                Ok(resolution) => resolution,
                Err(e) => {
                    tracing::error!(
                        schedule = %schedule.name,
                        error = %e,
                        "Failed to reconcile schedule"
                    );
                    Resolution::Error(e.to_string())
                }
            };
            if let Some(ref metrics) = self.metrics {
                metrics.record_resolution(resolution.as_str());
            }
            report.resolutions.push((schedule.name, resolution));
        }

        report.elapsed = started.elapsed();
        if let Some(ref metrics) = self.metrics {
            metrics.observe_pass(report.elapsed.as_secs_f64());
        }
        Ok(report)
    }

    async fn resolve(&self, schedule: &Schedule) -> SchedulerResult<Resolution> {
        let running = bounded(
            "search_instances",
            self.call_timeout,
            self.engine
                .search_instances(&schedule.workflow_name, &schedule.name, true),
        )
        .await?;
        let finished = bounded(
            "search_instances",
            self.call_timeout,
            self.engine
                .search_instances(&schedule.workflow_name, &schedule.name, false),
        )
        .await?;

        tracing::debug!(
            schedule = %schedule.name,
            running = running.total_hits,
            finished = finished.total_hits,
            "Workflow hits for schedule"
        );

        if running.has_hits() {
            return Ok(Resolution::StillRunning);
        }

        let latest = match finished.latest() {
            Some(latest) => latest,
            None => {
                tracing::warn!(
                    schedule = %schedule.name,
                    "No workflows found for schedule, but it is in state RUNNING"
                );
                return Ok(Resolution::Inconsistent);
            }
        };

        let instance = bounded(
            "get_instance",
            self.call_timeout,
            self.engine.get_instance(&latest.workflow_id),
        )
        .await?;

        let mut updated = schedule.clone();
        updated.status = instance.status.clone();
        if updated.record_last_execution(&instance.output) {
            tracing::debug!(
                schedule = %schedule.name,
                instance_id = %latest.workflow_id,
                "Added last workflow output to schedule context"
            );
        }
        if updated.status != schedule.status {
            tracing::info!(
                schedule = %schedule.name,
                status = %updated.status,
                "Changing schedule status"
            );
        }

        bounded(
            "update_status_and_workflow_context",
            self.call_timeout,
            self.store.update_status_and_workflow_context(&updated),
        )
        .await?;

        Ok(Resolution::Finished(updated.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schellar_core::testing::{FailingStore, MemoryEngine};
    use schellar_core::{
        EngineError, InstanceSummary, MemoryScheduleStore, SearchResult, WorkflowInstance,
    };
    use serde_json::{json, Value};

    fn running(name: &str) -> Schedule {
        let mut schedule = Schedule::new(name, "0 0 * * *", "wf1", "1");
        schedule.status = ScheduleStatus::Running;
        schedule
    }

    fn reconciler(
        store: Arc<dyn ScheduleStore>,
        engine: Arc<MemoryEngine>,
    ) -> ReconciliationLoop {
        ReconciliationLoop::new(
            store,
            engine,
            Duration::from_secs(10),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_finished_instance_updates_status_and_context() {
        let store = Arc::new(MemoryScheduleStore::with_schedules([running("nightly")]));
        let engine = Arc::new(MemoryEngine::new());
        engine.add_instance(
            "wf1",
            "nightly",
            WorkflowInstance {
                workflow_id: "abc".into(),
                status: ScheduleStatus::Completed,
                output: json!({"x": 1}),
            },
        );

        let report = reconciler(store.clone(), engine).run_pass().await.unwrap();
        assert_eq!(
            report.resolution("nightly"),
            Some(&Resolution::Finished(ScheduleStatus::Completed))
        );

        let stored = store.find_by_name("nightly").await.unwrap().unwrap();
        assert_eq!(stored.status, ScheduleStatus::Completed);
        assert_eq!(stored.workflow_context["lastExecution"], json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_empty_output_keeps_context() {
        let store = Arc::new(MemoryScheduleStore::with_schedules([running("nightly")]));
        let engine = Arc::new(MemoryEngine::new());
        engine.add_instance(
            "wf1",
            "nightly",
            WorkflowInstance {
                workflow_id: "abc".into(),
                status: ScheduleStatus::Failed,
                output: json!({}),
            },
        );

        reconciler(store.clone(), engine).run_pass().await.unwrap();
        let stored = store.find_by_name("nightly").await.unwrap().unwrap();
        assert_eq!(stored.status, ScheduleStatus::Failed);
        assert!(!stored.workflow_context.contains_key("lastExecution"));
    }

    #[tokio::test]
    async fn test_still_running_is_not_written() {
        let schedule = running("nightly");
        let before = schedule.last_update;
        let store = Arc::new(MemoryScheduleStore::with_schedules([schedule]));
        let engine = Arc::new(MemoryEngine::new());
        engine.add_instance(
            "wf1",
            "nightly",
            WorkflowInstance {
                workflow_id: "abc".into(),
                status: ScheduleStatus::Running,
                output: Value::Null,
            },
        );

        let report = reconciler(store.clone(), engine).run_pass().await.unwrap();
        assert_eq!(report.resolution("nightly"), Some(&Resolution::StillRunning));

        let stored = store.find_by_name("nightly").await.unwrap().unwrap();
        assert_eq!(stored.status, ScheduleStatus::Running);
        assert_eq!(stored.last_update, before);
    }

    #[tokio::test]
    async fn test_no_instances_is_inconsistent() {
        let schedule = running("nightly");
        let store = Arc::new(MemoryScheduleStore::with_schedules([schedule.clone()]));
        let engine = Arc::new(MemoryEngine::new());

        let report = reconciler(store.clone(), engine).run_pass().await.unwrap();
        assert_eq!(report.resolution("nightly"), Some(&Resolution::Inconsistent));
        assert_eq!(store.find_by_name("nightly").await.unwrap().unwrap(), schedule);
    }

    #[tokio::test]
    async fn test_latest_finished_instance_wins() {
        let store = Arc::new(MemoryScheduleStore::with_schedules([running("nightly")]));
        let engine = Arc::new(MemoryEngine::new());
        for (id, status) in [("old", ScheduleStatus::Failed), ("new", ScheduleStatus::Completed)] {
            engine.add_instance(
                "wf1",
                "nightly",
                WorkflowInstance {
                    workflow_id: id.into(),
                    status,
                    output: Value::Null,
                },
            );
        }

        reconciler(store.clone(), engine).run_pass().await.unwrap();
        let stored = store.find_by_name("nightly").await.unwrap().unwrap();
        assert_eq!(stored.status, ScheduleStatus::Completed);
    }

    #[tokio::test]
    async fn test_errors_are_isolated_per_schedule() {
        let store = Arc::new(MemoryScheduleStore::with_schedules([
            running("broken"),
            running("healthy"),
        ]));
        let engine = Arc::new(MemoryEngine::new());
        engine.script_search(
            "wf1",
            "broken",
            false,
            SearchResult::from_results(vec![InstanceSummary::new("gone", "COMPLETED")]),
        );
        engine.add_instance(
            "wf1",
            "healthy",
            WorkflowInstance {
                workflow_id: "ok".into(),
                status: ScheduleStatus::Terminated,
                output: Value::Null,
            },
        );

        let report = reconciler(store.clone(), engine).run_pass().await.unwrap();
        assert!(matches!(
            report.resolution("broken"),
            Some(Resolution::Error(_))
        ));
        assert_eq!(
            report.resolution("healthy"),
            Some(&Resolution::Finished(ScheduleStatus::Terminated))
        );
    }

    #[tokio::test]
    async fn test_engine_outage_leaves_status() {
        let store = Arc::new(MemoryScheduleStore::with_schedules([running("nightly")]));
        let engine = Arc::new(MemoryEngine::new());
        engine.fail_searches(Some(EngineError::Unavailable("connection refused".into())));

        let report = reconciler(store.clone(), engine).run_pass().await.unwrap();
        assert!(matches!(
            report.resolution("nightly"),
            Some(Resolution::Error(_))
        ));
        let stored = store.find_by_name("nightly").await.unwrap().unwrap();
        assert_eq!(stored.status, ScheduleStatus::Running);
    }

    #[tokio::test]
    async fn test_storage_failure_fails_pass() {
        let store = Arc::new(FailingStore::new());
        let engine = Arc::new(MemoryEngine::new());
        assert!(reconciler(store, engine).run_pass().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_after_storage_failure_and_stops_on_cancel() {
        let store = Arc::new(FailingStore::new());
        let engine = Arc::new(MemoryEngine::new());
        let reconciler = Arc::new(reconciler(store.clone(), engine));
        let shutdown = CancellationToken::new();

        let task = {
            let reconciler = reconciler.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { reconciler.run(shutdown).await })
        };

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(store.call_count(), 3);

        shutdown.cancel();
        task.await.unwrap();
    }
}
