//! Storage backends living outside the core crate.

mod postgres;

pub use postgres::PostgresScheduleStore;
