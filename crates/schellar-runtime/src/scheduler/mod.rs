//! The schedule engine: timers, tick handling and the reconciliation loop.

mod reconciler;
mod registry;
mod runner;
mod timer;
mod trigger;

pub use reconciler::{PassReport, ReconciliationLoop, Resolution};
pub use registry::{ReconcileReport, TimerRegistry};
pub use runner::Scheduler;
pub use timer::TimerKey;
pub use trigger::{TickOutcome, TriggerHandler};

use std::future::Future;
use std::time::Duration;

use schellar_core::{EngineError, SchellarError, StoreError};
use thiserror::Error;

/// Failure inside the schedule engine.
///
/// None of these are fatal on their own; the affected tick or pass is
/// abandoned and the next natural trigger retries.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

impl From<SchedulerError> for SchellarError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::StorageUnavailable(e) => SchellarError::Storage(e),
            SchedulerError::Engine(e) => SchellarError::Engine(e),
            other => SchellarError::Internal(other.to_string()),
        }
    }
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

/// Run a port call with an upper bound on its duration.
pub(crate) async fn bounded<T, E, F>(
    operation: &'static str,
    timeout: Duration,
    call: F,
) -> SchedulerResult<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    SchedulerError: From<E>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(SchedulerError::from),
        Err(_) => Err(SchedulerError::Timeout { operation, timeout }),
    }
}
