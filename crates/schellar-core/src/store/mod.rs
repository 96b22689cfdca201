//! Storage contract over schedule records.
//!
//! The scheduler depends only on [`ScheduleStore`]; backends live elsewhere
//! (`MemoryScheduleStore` here, PostgreSQL in the runtime crate).

mod memory;

pub use memory::MemoryScheduleStore;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::schedule::{Schedule, ScheduleStatus};

/// Storage failure. Always treated as retryable by the next natural trigger.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The backend could not be reached or the driver failed.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be decoded.
    #[error("corrupt schedule record '{name}': {reason}")]
    Corrupt { name: String, reason: String },

    /// A write conflicted with an existing record.
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Result type for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// CRUD and query contract over [`Schedule`] records.
///
/// Every write is a single last-write-wins operation; implementations must
/// never leave a partially written record behind.
pub trait ScheduleStore: Send + Sync {
    /// All schedules.
    fn find_all(&self) -> BoxFuture<'_, StoreResult<Vec<Schedule>>>;

    /// Schedules with the given `enabled` flag.
    fn find_all_by_enabled(&self, enabled: bool) -> BoxFuture<'_, StoreResult<Vec<Schedule>>>;

    /// Schedule by name; `None` when absent.
    fn find_by_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StoreResult<Option<Schedule>>>;

    /// Schedules currently in the given status.
    fn find_by_status<'a>(
        &'a self,
        status: &'a ScheduleStatus,
    ) -> BoxFuture<'a, StoreResult<Vec<Schedule>>>;

    /// Set the status of one schedule and bump `lastUpdate`.
    fn update_status<'a>(
        &'a self,
        name: &'a str,
        status: &'a ScheduleStatus,
    ) -> BoxFuture<'a, StoreResult<()>>;

    /// Set status and workflow context together and bump `lastUpdate`.
    fn update_status_and_workflow_context<'a>(
        &'a self,
        schedule: &'a Schedule,
    ) -> BoxFuture<'a, StoreResult<()>>;

    /// Insert a new schedule.
    fn insert<'a>(&'a self, schedule: &'a Schedule) -> BoxFuture<'a, StoreResult<()>>;

    /// Replace every field of an existing schedule, keyed by name.
    fn update<'a>(&'a self, schedule: &'a Schedule) -> BoxFuture<'a, StoreResult<()>>;

    /// Delete a schedule by name. Deleting a missing schedule is not an error.
    fn remove_by_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StoreResult<()>>;
}
