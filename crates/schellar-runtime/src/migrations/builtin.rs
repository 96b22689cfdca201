//! Schema migrations shipped with the daemon.
//!
//! Applied once each and tracked in `schellar_migrations`.

use super::runner::Migration;

const SCHEDULE_SQL: &str = include_str!("../../migrations/0001_schedule.sql");

/// All built-in migrations, in application order.
pub fn builtin_migrations() -> Vec<Migration> {
    vec![Migration::new("0001_schedule", SCHEDULE_SQL)]
}
