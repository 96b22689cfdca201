use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use schellar_core::{CronSchedule, Schedule};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::trigger::TriggerHandler;

/// Identity of a live timer: schedule name plus cron expression.
///
/// Editing a schedule's cron expression changes its key, so the registry
/// replaces the old timer instead of keeping it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerKey {
    pub name: String,
    pub cron: String,
}

impl TimerKey {
    /// Create a key.
    pub fn new(name: impl Into<String>, cron: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cron: cron.into(),
        }
    }

    /// The key a schedule's timer runs under.
    pub fn of(schedule: &Schedule) -> Self {
        Self::new(&schedule.name, &schedule.cron_expression)
    }
}

impl fmt::Display for TimerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.name, self.cron)
    }
}

/// Wall-clock source for fire times.
pub(crate) type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// A running cron timer for one schedule.
///
/// Each tick is handed to the [`TriggerHandler`] on its own task. Stopping
/// the timer prevents future ticks only; a tick already in flight runs to
/// completion.
pub(crate) struct Timer {
    key: TimerKey,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Timer {
    /// Arm a timer and start its task.
    pub fn start(
        key: TimerKey,
        schedule: CronSchedule,
        timezone: Tz,
        handler: Arc<TriggerHandler>,
    ) -> Self {
        Self::start_with_clock(key, schedule, timezone, handler, system_clock())
    }

    /// Arm a timer that reads wall time from `clock`.
    pub fn start_with_clock(
        key: TimerKey,
        schedule: CronSchedule,
        timezone: Tz,
        handler: Arc<TriggerHandler>,
        clock: Clock,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            run_timer(task_key, schedule, timezone, handler, clock, token).await;
        });

        Self {
            key,
            cancel,
            handle,
        }
    }

    /// Stop future ticks.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the timer task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel.cancel();
        tracing::debug!(timer = %self.key, "Timer dropped");
    }
}

async fn run_timer(
    key: TimerKey,
    schedule: CronSchedule,
    timezone: Tz,
    handler: Arc<TriggerHandler>,
    clock: Clock,
    cancel: CancellationToken,
) {
    tracing::debug!(timer = %key, timezone = %timezone, "Timer started");

    // Never schedule at or before the previous fire, even if the wall clock
    // stepped backwards.
    let mut last_fired: Option<DateTime<Utc>> = None;

    loop {
        let now = clock();
        let from = last_fired.map_or(now, |last| last.max(now));
        let next = match schedule.next_after_in_tz(from, timezone) {
            Some(next) => next,
            None => {
                tracing::warn!(timer = %key, "Cron expression has no future occurrences");
                break;
            }
        };
        let wait = (next - now).to_std().unwrap_or_default();

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        last_fired = Some(next);

        let handler = handler.clone();
        let name = key.name.clone();
        tokio::spawn(async move {
            handler.on_tick(&name).await;
        });
    }

    tracing::debug!(timer = %key, "Timer stopped");
}
