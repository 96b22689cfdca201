//! Runtime for the Schellar scheduler: timers, reconciliation, PostgreSQL
//! storage, the Conductor client and the REST gateway.

pub mod conductor;
pub mod db;
pub mod gateway;
pub mod metrics;
pub mod migrations;
pub mod scheduler;
pub mod store;

pub use conductor::ConductorClient;
pub use db::Database;
pub use gateway::{AppState, GatewayServer};
pub use metrics::SchedulerMetrics;
pub use migrations::{Migration, MigrationRunner};
pub use scheduler::{
    PassReport, ReconcileReport, ReconciliationLoop, Resolution, Scheduler, SchedulerError, SchedulerResult,
    TickOutcome, TimerKey, TimerRegistry, TriggerHandler,
};
pub use store::PostgresScheduleStore;
