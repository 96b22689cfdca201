use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono_tz::Tz;
use schellar_core::{CronSchedule, ScheduleStore};

use super::timer::{Timer, TimerKey};
use super::trigger::TriggerHandler;
use super::{bounded, SchedulerResult};
use crate::metrics::SchedulerMetrics;

/// What one `reconcile()` call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Timers armed by this call.
    pub started: Vec<TimerKey>,
    /// Timers stopped by this call.
    pub stopped: Vec<TimerKey>,
    /// Live timers after this call.
    pub active: usize,
    /// The storage snapshot was older than one already applied and was
    /// discarded.
    pub stale: bool,
}

#[derive(Default)]
struct TimerSet {
    timers: HashMap<TimerKey, Timer>,
    applied: u64,
}

/// Keeps exactly one live timer per enabled schedule.
///
/// The timer map is only touched under a short synchronous lock that is
/// never held across a storage call. Concurrent `reconcile()` calls are
/// ordered by a ticket taken before the storage read, so an older snapshot
/// never overwrites the result of a newer one.
pub struct TimerRegistry {
    store: Arc<dyn ScheduleStore>,
    handler: Arc<TriggerHandler>,
    timezone: Tz,
    call_timeout: Duration,
    tickets: AtomicU64,
    state: Mutex<TimerSet>,
    metrics: Option<Arc<SchedulerMetrics>>,
}

impl TimerRegistry {
    /// Create an empty registry.
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        handler: Arc<TriggerHandler>,
        timezone: Tz,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            handler,
            timezone,
            call_timeout,
            tickets: AtomicU64::new(0),
            state: Mutex::new(TimerSet::default()),
            metrics: None,
        }
    }

    /// Publish the live timer count into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<SchedulerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Bring the live timers in line with the enabled schedules in storage.
    ///
    /// On storage failure the existing timers are left untouched.
    pub async fn reconcile(&self) -> SchedulerResult<ReconcileReport> {
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(ticket, "Refreshing timers according to enabled schedules");

        let schedules = bounded(
            "find_all_by_enabled",
            self.call_timeout,
            self.store.find_all_by_enabled(true),
        )
        .await?;

        let mut desired: HashMap<TimerKey, CronSchedule> = HashMap::with_capacity(schedules.len());
        for schedule in &schedules {
            match schedule.cron_schedule() {
                Ok(cron) => {
                    desired.insert(TimerKey::of(schedule), cron);
                }
                Err(e) => {
                    tracing::warn!(
                        schedule = %schedule.name,
                        cron = %schedule.cron_expression,
                        error = %e,
                        "Skipping schedule with invalid cron expression"
                    );
                }
            }
        }

        let mut set = self.lock();
        if ticket < set.applied {
            tracing::debug!(
                ticket,
                applied = set.applied,
                "Discarding stale schedule snapshot"
            );
            return Ok(ReconcileReport {
                active: set.timers.len(),
                stale: true,
                ..Default::default()
            });
        }
        set.applied = ticket;

        let mut report = ReconcileReport::default();

        let extra: Vec<TimerKey> = set
            .timers
            .keys()
            .filter(|key| !desired.contains_key(*key))
            .cloned()
            .collect();
        for key in extra {
            if let Some(timer) = set.timers.remove(&key) {
                timer.stop();
                tracing::info!(timer = %key, "Stopping timer");
                report.stopped.push(key);
            }
        }

        for (key, cron) in desired {
            if set.timers.contains_key(&key) {
                continue;
            }
            tracing::info!(timer = %key, "Creating timer");
            let timer = Timer::start(key.clone(), cron, self.timezone, self.handler.clone());
            set.timers.insert(key.clone(), timer);
            report.started.push(key);
        }

        report.active = set.timers.len();
        if let Some(ref metrics) = self.metrics {
            metrics.set_active_timers(report.active);
        }

        Ok(report)
    }

    /// Keys of every live timer, sorted.
    pub fn active_keys(&self) -> Vec<TimerKey> {
        let mut keys: Vec<TimerKey> = self.lock().timers.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of live timers.
    pub fn len(&self) -> usize {
        self.lock().timers.len()
    }

    /// Check if no timers are live.
    pub fn is_empty(&self) -> bool {
        self.lock().timers.is_empty()
    }

    /// Stop and forget every timer.
    pub fn stop_all(&self) {
        let mut set = self.lock();
        let count = set.timers.len();
        for (_, timer) in set.timers.drain() {
            timer.stop();
        }
        if let Some(ref metrics) = self.metrics {
            metrics.set_active_timers(0);
        }
        tracing::info!(count, "Stopped all timers");
    }

    fn lock(&self) -> MutexGuard<'_, TimerSet> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
