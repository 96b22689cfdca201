pub mod config;
pub mod engine;
pub mod error;
pub mod schedule;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::SchellarConfig;
pub use engine::{
    EngineError, EngineResult, InstanceSummary, LaunchRequest, SearchResult, WorkflowEngine,
    WorkflowInstance,
};
pub use error::{Result, SchellarError};
pub use schedule::{CronParseError, CronSchedule, Schedule, ScheduleStatus};
pub use store::{MemoryScheduleStore, ScheduleStore, StoreError, StoreResult};
