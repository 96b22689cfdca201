//! Process wiring: storage backend, engine client, scheduler and gateway.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use schellar_core::config::{LogFormat, LoggingConfig, SchellarConfig, StorageBackend};
use schellar_core::error::{Result, SchellarError};
use schellar_core::{MemoryScheduleStore, ScheduleStore};
use schellar_runtime::{
    AppState, ConductorClient, Database, GatewayServer, MigrationRunner, PostgresScheduleStore,
    Scheduler, SchedulerMetrics,
};

/// Build the log filter: `RUST_LOG` wins, then `--dev`, then the configured level.
pub fn env_filter(logging: &LoggingConfig, dev: bool) -> EnvFilter {
    let fallback = if dev { "debug" } else { logging.level.as_str() };
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global tracing subscriber. Later calls are ignored.
pub fn init_tracing(logging: &LoggingConfig, dev: bool) {
    let filter = env_filter(logging, dev);
    let result = match (logging.format, dev) {
        (LogFormat::Json, false) => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };
    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// The Schellar daemon.
pub struct Schellar {
    config: SchellarConfig,
    shutdown: CancellationToken,
}

impl Schellar {
    pub fn new(config: SchellarConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &SchellarConfig {
        &self.config
    }

    /// Token that stops the daemon when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Open the configured storage backend, applying migrations for PostgreSQL.
    pub async fn open_store(&self) -> Result<(Arc<dyn ScheduleStore>, Option<Database>)> {
        match self.config.storage.backend {
            StorageBackend::Postgres => {
                let db = Database::from_config(&self.config.storage).await?;
                tracing::info!("Connected to database");

                let applied = MigrationRunner::new(db.pool().clone()).run().await?;
                tracing::info!(applied = ?applied, "Migrations completed");

                let store = PostgresScheduleStore::new(db.pool().clone());
                Ok((Arc::new(store), Some(db)))
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; schedules are lost on restart");
                Ok((Arc::new(MemoryScheduleStore::new()), None))
            }
        }
    }

    /// Run until ctrl-c or [`Schellar::shutdown`].
    pub async fn run(self) -> Result<()> {
        tracing::info!(version = env!("CARGO_PKG_VERSION"), "Schellar starting");
        self.config.validate()?;

        let (store, db) = self.open_store().await?;
        let engine = Arc::new(ConductorClient::new(&self.config.engine)?);
        tracing::info!(url = %engine.base_url(), "Using Conductor engine");

        let metrics = Arc::new(SchedulerMetrics::new().map_err(|e| {
            SchellarError::Internal(format!("Failed to register metrics: {}", e))
        })?);

        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            engine,
            &self.config.scheduler,
            metrics.clone(),
        )?);
        scheduler.start().await.map_err(SchellarError::from)?;

        let signal_token = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => {
                        tracing::info!("Received shutdown signal");
                        signal_token.cancel();
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
                },
                _ = signal_token.cancelled() => {}
            }
        });

        let gateway = GatewayServer::new(
            self.config.gateway.clone(),
            AppState {
                store,
                scheduler: scheduler.clone(),
                metrics,
            },
        );
        let served = gateway.run(self.shutdown.clone()).await;

        tracing::info!("Starting graceful shutdown");
        self.shutdown.cancel();
        scheduler.stop().await;
        if let Some(db) = db {
            db.close().await;
        }

        served?;
        tracing::info!("Schellar stopped");
        Ok(())
    }
}
