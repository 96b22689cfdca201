mod engine;
mod scheduler;
mod storage;

pub use engine::EngineConfig;
pub use scheduler::SchedulerConfig;
pub use storage::{StorageBackend, StorageConfig};

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SchellarError};

/// Root configuration for Schellar.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchellarConfig {
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Orchestration engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Schedule engine configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// HTTP gateway configuration.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SchellarConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SchellarError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        // Substitute environment variables
        let content = substitute_env_vars(content);

        toml::from_str(&content)
            .map_err(|e| SchellarError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from `path` when it exists, otherwise from the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            tracing::debug!(path = %path.display(), "Loading configuration file");
            Self::from_file(path)
        } else {
            tracing::debug!(
                path = %path.display(),
                "Configuration file not found, using environment"
            );
            Self::from_env()
        }
    }

    /// Build the configuration from environment variables only.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(backend) = lookup("BACKEND") {
            config.storage.backend = StorageBackend::parse(&backend).ok_or_else(|| {
                SchellarError::Config(format!("Unsupported storage backend '{}'", backend))
            })?;
        }
        if let Some(url) = lookup("POSTGRES_DATABASE_URL") {
            config.storage.url = url;
        }
        if let Some(url) = lookup("CONDUCTOR_API_URL") {
            config.engine.url = url;
        }
        if let Some(interval) = lookup("CHECK_INTERVAL_SECONDS") {
            config.scheduler.check_interval_secs = interval.trim().parse().map_err(|_| {
                SchellarError::Config(format!(
                    "CHECK_INTERVAL_SECONDS must be a whole number of seconds, got '{}'",
                    interval
                ))
            })?;
        }
        if let Some(roles) = lookup("ADMIN_ROLES") {
            config.engine.admin_roles = roles;
        }
        if let Some(groups) = lookup("ADMIN_GROUPS") {
            config.engine.admin_groups = groups;
        }
        if let Some(port) = lookup("PORT") {
            config.gateway.port = port
                .trim()
                .parse()
                .map_err(|_| SchellarError::Config(format!("Invalid PORT '{}'", port)))?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            config.logging.level = level.to_lowercase();
        }

        Ok(config)
    }

    /// Reject configurations the daemon cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.storage.backend == StorageBackend::Postgres && self.storage.url.is_empty() {
            return Err(SchellarError::Config(
                "storage.url is required for the postgres backend".into(),
            ));
        }
        if self.engine.url.trim().is_empty() {
            return Err(SchellarError::Config("engine.url is required".into()));
        }
        if self.scheduler.check_interval_secs == 0 {
            return Err(SchellarError::Config(
                "scheduler.check_interval_secs must be greater than zero".into(),
            ));
        }
        if self.scheduler.tz().is_none() {
            return Err(SchellarError::Config(format!(
                "Unknown timezone '{}'",
                self.scheduler.timezone
            )));
        }
        Ok(())
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP port.
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Allow cross-origin requests.
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_http_port(),
            cors_enabled: true,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    3000
}

fn default_true() -> bool {
    true
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter level; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "debug".to_string()
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}") {
        Ok(re) => re,
        Err(_) => return content.to_string(),
    };

    let mut result = content.to_string();
    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}
