use std::collections::BTreeMap;

use futures::future::BoxFuture;
use schellar_core::{Schedule, ScheduleStatus, ScheduleStore, StoreError, StoreResult};
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

const COLUMNS: &str = r#"
    schedule_name,
    is_enabled,
    workflow_status,
    workflow_name,
    workflow_version,
    workflow_context,
    cron_string,
    parallel_runs,
    check_warning_seconds,
    from_date,
    to_date,
    correlation_id,
    task_to_domain,
    last_update
"#;

/// Schedule store backed by the PostgreSQL `schedule` table.
///
/// Every write is a single statement, so concurrent writers resolve as
/// last-write-wins.
#[derive(Clone)]
pub struct PostgresScheduleStore {
    pool: PgPool,
}

impl PostgresScheduleStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn query_all(&self, filter: Filter<'_>) -> StoreResult<Vec<Schedule>> {
        let rows = match filter {
            Filter::All => {
                sqlx::query(&format!(
                    "SELECT {} FROM schedule ORDER BY schedule_name",
                    COLUMNS
                ))
                .fetch_all(&self.pool)
                .await
            }
            Filter::Enabled(enabled) => {
                sqlx::query(&format!(
                    "SELECT {} FROM schedule WHERE is_enabled = $1 ORDER BY schedule_name",
                    COLUMNS
                ))
                .bind(enabled)
                .fetch_all(&self.pool)
                .await
            }
            Filter::Status(status) => {
                sqlx::query(&format!(
                    "SELECT {} FROM schedule WHERE workflow_status = $1 ORDER BY schedule_name",
                    COLUMNS
                ))
                .bind(status)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(unavailable)?;

        rows.iter().map(row_to_schedule).collect()
    }
}

enum Filter<'a> {
    All,
    Enabled(bool),
    Status(&'a str),
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn row_to_schedule(row: &PgRow) -> StoreResult<Schedule> {
    let name: String = row.try_get("schedule_name").map_err(unavailable)?;
    let corrupt = |e: sqlx::Error| StoreError::Corrupt {
        name: name.clone(),
        reason: e.to_string(),
    };

    let status: String = row.try_get("workflow_status").map_err(corrupt)?;
    let context: Option<Json<Map<String, Value>>> =
        row.try_get("workflow_context").map_err(corrupt)?;
    let task_to_domain: Option<Json<BTreeMap<String, String>>> =
        row.try_get("task_to_domain").map_err(corrupt)?;

    Ok(Schedule {
        name: name.clone(),
        enabled: row.try_get("is_enabled").map_err(corrupt)?,
        status: ScheduleStatus::parse(&status),
        workflow_name: row.try_get("workflow_name").map_err(corrupt)?,
        workflow_version: row.try_get("workflow_version").map_err(corrupt)?,
        workflow_context: context.map(|Json(c)| c).unwrap_or_default(),
        cron_expression: row.try_get("cron_string").map_err(corrupt)?,
        parallel_runs: row.try_get("parallel_runs").map_err(corrupt)?,
        check_warning_seconds: row.try_get("check_warning_seconds").map_err(corrupt)?,
        from_date: row.try_get("from_date").map_err(corrupt)?,
        to_date: row.try_get("to_date").map_err(corrupt)?,
        last_update: row.try_get("last_update").map_err(corrupt)?,
        correlation_id: row.try_get("correlation_id").map_err(corrupt)?,
        task_to_domain: task_to_domain.map(|Json(t)| t),
    })
}

fn write_error(e: sqlx::Error, name: &str) -> StoreError {
    let duplicate = e
        .as_database_error()
        .map_or(false, |db| db.is_unique_violation());
    if duplicate {
        StoreError::Conflict(format!("schedule '{}' already exists", name))
    } else {
        unavailable(e)
    }
}

impl ScheduleStore for PostgresScheduleStore {
    fn find_all(&self) -> BoxFuture<'_, StoreResult<Vec<Schedule>>> {
        Box::pin(self.query_all(Filter::All))
    }

    fn find_all_by_enabled(&self, enabled: bool) -> BoxFuture<'_, StoreResult<Vec<Schedule>>> {
        Box::pin(self.query_all(Filter::Enabled(enabled)))
    }

    fn find_by_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StoreResult<Option<Schedule>>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {} FROM schedule WHERE schedule_name = $1",
                COLUMNS
            ))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

            row.as_ref().map(row_to_schedule).transpose()
        })
    }

    fn find_by_status<'a>(
        &'a self,
        status: &'a ScheduleStatus,
    ) -> BoxFuture<'a, StoreResult<Vec<Schedule>>> {
        Box::pin(self.query_all(Filter::Status(status.as_str())))
    }

    fn update_status<'a>(
        &'a self,
        name: &'a str,
        status: &'a ScheduleStatus,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(
                "UPDATE schedule SET workflow_status = $2, last_update = NOW() WHERE schedule_name = $1",
            )
            .bind(name)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
            Ok(())
        })
    }

    fn update_status_and_workflow_context<'a>(
        &'a self,
        schedule: &'a Schedule,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(
                r#"
                UPDATE schedule
                SET workflow_status = $2, workflow_context = $3, last_update = NOW()
                WHERE schedule_name = $1
                "#,
            )
            .bind(&schedule.name)
            .bind(schedule.status.as_str())
            .bind(Json(&schedule.workflow_context))
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
            Ok(())
        })
    }

    fn insert<'a>(&'a self, schedule: &'a Schedule) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(&format!(
                "INSERT INTO schedule ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
                COLUMNS
            ))
            .bind(&schedule.name)
            .bind(schedule.enabled)
            .bind(schedule.status.as_str())
            .bind(&schedule.workflow_name)
            .bind(&schedule.workflow_version)
            .bind(Json(&schedule.workflow_context))
            .bind(&schedule.cron_expression)
            .bind(schedule.parallel_runs)
            .bind(schedule.check_warning_seconds)
            .bind(schedule.from_date)
            .bind(schedule.to_date)
            .bind(&schedule.correlation_id)
            .bind(schedule.task_to_domain.as_ref().map(Json))
            .bind(schedule.last_update)
            .execute(&self.pool)
            .await
            .map_err(|e| write_error(e, &schedule.name))?;
            Ok(())
        })
    }

    fn update<'a>(&'a self, schedule: &'a Schedule) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query(
                r#"
                UPDATE schedule SET
                    is_enabled = $2,
                    workflow_status = $3,
                    workflow_name = $4,
                    workflow_version = $5,
                    workflow_context = $6,
                    cron_string = $7,
                    parallel_runs = $8,
                    check_warning_seconds = $9,
                    from_date = $10,
                    to_date = $11,
                    correlation_id = $12,
                    task_to_domain = $13,
                    last_update = $14
                WHERE schedule_name = $1
                "#,
            )
            .bind(&schedule.name)
            .bind(schedule.enabled)
            .bind(schedule.status.as_str())
            .bind(&schedule.workflow_name)
            .bind(&schedule.workflow_version)
            .bind(Json(&schedule.workflow_context))
            .bind(&schedule.cron_expression)
            .bind(schedule.parallel_runs)
            .bind(schedule.check_warning_seconds)
            .bind(schedule.from_date)
            .bind(schedule.to_date)
            .bind(&schedule.correlation_id)
            .bind(schedule.task_to_domain.as_ref().map(Json))
            .bind(schedule.last_update)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
            Ok(())
        })
    }

    fn remove_by_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            sqlx::query("DELETE FROM schedule WHERE schedule_name = $1")
                .bind(name)
                .execute(&self.pool)
                .await
                .map_err(unavailable)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_match_schema() {
        let sql = &crate::migrations::builtin_migrations()[0].sql;
        for column in COLUMNS.split(',').map(str::trim) {
            assert!(sql.contains(column), "column {} missing from schema", column);
        }
        assert_eq!(COLUMNS.split(',').count(), 14);
    }

    #[test]
    fn test_driver_error_is_unavailable() {
        let err = write_error(sqlx::Error::RowNotFound, "nightly");
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
