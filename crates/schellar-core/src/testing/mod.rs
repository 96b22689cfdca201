//! Test doubles for the storage and engine ports.
//!
//! Enabled with the `testing` feature. The scheduler tests drive the timer
//! registry, trigger handler and reconciliation loop against these instead
//! of a database and a live orchestration engine.

mod failing_store;
mod memory_engine;

pub use failing_store::FailingStore;
pub use memory_engine::MemoryEngine;

pub use crate::store::MemoryScheduleStore;
