//! Schellar: cron-style scheduling of Conductor workflow instances.
//!
//! The daemon keeps one timer per enabled schedule, launches instances on
//! each tick and reconciles their outcome back into storage.

pub mod cli;
pub mod runtime;

pub use runtime::{init_tracing, Schellar};
