use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use schellar_core::{LaunchRequest, ScheduleStatus, ScheduleStore, WorkflowEngine};

use super::{bounded, SchedulerResult};
use crate::metrics::SchedulerMetrics;

/// What a single tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The schedule was deleted after the timer was armed.
    ScheduleMissing,
    /// The tick fell outside the activation window.
    OutsideWindow,
    /// A previous instance is still running and parallel runs are off.
    SkippedParallel,
    /// A new instance was launched.
    Launched,
    /// A storage or engine call failed; nothing was launched.
    Failed,
}

impl TickOutcome {
    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScheduleMissing => "schedule_missing",
            Self::OutsideWindow => "outside_window",
            Self::SkippedParallel => "skipped_parallel",
            Self::Launched => "launched",
            Self::Failed => "failed",
        }
    }
}

/// Decides, on every timer tick, whether to launch a workflow instance.
///
/// The schedule is re-read on every tick so edits made after the timer was
/// armed (window, parallel policy, context) take effect immediately.
pub struct TriggerHandler {
    store: Arc<dyn ScheduleStore>,
    engine: Arc<dyn WorkflowEngine>,
    call_timeout: Duration,
    metrics: Option<Arc<SchedulerMetrics>>,
}

impl TriggerHandler {
    /// Create a new trigger handler.
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        engine: Arc<dyn WorkflowEngine>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            engine,
            call_timeout,
            metrics: None,
        }
    }

    /// Record tick outcomes into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<SchedulerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Handle a tick for `name` at the current time.
    pub async fn on_tick(&self, name: &str) -> TickOutcome {
        self.on_tick_at(name, Utc::now()).await
    }

    /// Handle a tick for `name` as if it fired at `now`.
    pub async fn on_tick_at(&self, name: &str, now: DateTime<Utc>) -> TickOutcome {
        tracing::debug!(schedule = %name, "Processing timer trigger");

        let outcome = match self.fire(name, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(schedule = %name, error = %e, "Timer trigger failed");
                TickOutcome::Failed
            }
        };

        if let Some(ref metrics) = self.metrics {
            metrics.record_tick(outcome.as_str());
        }
        outcome
    }

    async fn fire(&self, name: &str, now: DateTime<Utc>) -> SchedulerResult<TickOutcome> {
        let found =
            bounded("find_by_name", self.call_timeout, self.store.find_by_name(name)).await?;
        let schedule = match found {
            Some(schedule) => schedule,
            None => {
                tracing::warn!(schedule = %name, "Schedule no longer exists, ignoring tick");
                return Ok(TickOutcome::ScheduleMissing);
            }
        };

        if !schedule.is_active_at(now) {
            tracing::debug!(
                schedule = %name,
                from = ?schedule.from_date,
                to = ?schedule.to_date,
                "Schedule enabled but outside its activation window"
            );
            return Ok(TickOutcome::OutsideWindow);
        }

        let running = bounded(
            "search_instances",
            self.call_timeout,
            self.engine
                .search_instances(&schedule.workflow_name, &schedule.name, true),
        )
        .await?;

        if running.has_hits() {
            if !schedule.parallel_runs {
                tracing::debug!(
                    schedule = %name,
                    previous = ?running.latest().map(|r| r.workflow_id.as_str()),
                    "Tick skipped, previous instance has not finished yet"
                );
                return Ok(TickOutcome::SkippedParallel);
            }
            tracing::info!(
                schedule = %name,
                workflow = %schedule.workflow_name,
                running = running.total_hits,
                "Launching concurrent workflow instance"
            );
        }

        let request = LaunchRequest::for_schedule(&schedule);
        let instance_id = bounded(
            "launch_instance",
            self.call_timeout,
            self.engine.launch_instance(&request),
        )
        .await?;

        tracing::info!(
            schedule = %name,
            workflow = %schedule.workflow_name,
            version = %schedule.workflow_version,
            instance_id = %instance_id,
            "Launched workflow instance"
        );

        if let Err(e) = bounded(
            "update_status",
            self.call_timeout,
            self.store.update_status(name, &ScheduleStatus::Running),
        )
        .await
        {
            tracing::error!(schedule = %name, error = %e, "Failed to mark schedule RUNNING");
        }

        Ok(TickOutcome::Launched)
    }
}
