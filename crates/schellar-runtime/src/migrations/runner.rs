//! Migration runner.
//!
//! Holds a PostgreSQL advisory lock while applying, so several daemons
//! starting against one database do not race on the schema.

use std::collections::HashSet;

use schellar_core::error::{Result, SchellarError};
use sqlx::PgPool;

use super::builtin::builtin_migrations;

/// Advisory lock id, "SCHELL" in ASCII.
const MIGRATION_LOCK_ID: i64 = 0x5343_4845_4C4C;

/// A single migration.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Unique name, e.g. `0001_schedule`.
    pub name: String,
    /// SQL to execute.
    pub sql: String,
}

impl Migration {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
        }
    }
}

/// Applies pending built-in migrations.
pub struct MigrationRunner {
    pool: PgPool,
}

impl MigrationRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply every built-in migration not yet recorded as applied.
    pub async fn run(&self) -> Result<Vec<String>> {
        self.acquire_lock().await?;

        let result = self.apply_pending(builtin_migrations()).await;

        if let Err(e) = self.release_lock().await {
            tracing::warn!(error = %e, "Failed to release migration lock");
        }

        result
    }

    async fn apply_pending(&self, migrations: Vec<Migration>) -> Result<Vec<String>> {
        self.ensure_migrations_table().await?;

        let applied = self.applied_migrations().await?;
        tracing::debug!(applied = ?applied, "Already applied migrations");

        let mut newly_applied = Vec::new();
        for migration in migrations {
            if !applied.contains(&migration.name) {
                self.apply(&migration).await?;
                newly_applied.push(migration.name);
            }
        }
        Ok(newly_applied)
    }

    async fn acquire_lock(&self) -> Result<()> {
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_ID)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                SchellarError::Database(format!("Failed to acquire migration lock: {}", e))
            })?;
        Ok(())
    }

    async fn release_lock(&self) -> Result<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_ID)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                SchellarError::Database(format!("Failed to release migration lock: {}", e))
            })?;
        Ok(())
    }

    async fn ensure_migrations_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schellar_migrations (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) UNIQUE NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            SchellarError::Database(format!("Failed to create migrations table: {}", e))
        })?;
        Ok(())
    }

    async fn applied_migrations(&self) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM schellar_migrations")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                SchellarError::Database(format!("Failed to get applied migrations: {}", e))
            })?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn apply(&self, migration: &Migration) -> Result<()> {
        tracing::info!(migration = %migration.name, "Applying migration");

        let mut tx = self.pool.begin().await.map_err(|e| {
            SchellarError::Database(format!("Failed to begin migration transaction: {}", e))
        })?;

        for statement in split_statements(&migration.sql) {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    SchellarError::Database(format!(
                        "Failed to apply migration '{}': {}",
                        migration.name, e
                    ))
                })?;
        }

        sqlx::query("INSERT INTO schellar_migrations (name) VALUES ($1)")
            .bind(&migration.name)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                SchellarError::Database(format!(
                    "Failed to record migration '{}': {}",
                    migration.name, e
                ))
            })?;

        tx.commit().await.map_err(|e| {
            SchellarError::Database(format!(
                "Failed to commit migration '{}': {}",
                migration.name, e
            ))
        })?;

        tracing::info!(migration = %migration.name, "Migration applied");
        Ok(())
    }
}

/// Split a migration into statements, dropping comment-only fragments.
///
/// Built-in migrations contain no function bodies, so splitting on `;` is
/// sufficient.
fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(|fragment| {
            fragment
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string()
        })
        .filter(|statement| !statement.is_empty())
        .collect()
}
