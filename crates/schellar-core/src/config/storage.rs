use serde::{Deserialize, Serialize};

/// Which persistence backend holds the schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

impl StorageBackend {
    /// Parse a backend name as found in the `BACKEND` environment variable.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "postgres" => Some(Self::Postgres),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend selection.
    #[serde(default)]
    pub backend: StorageBackend,

    /// PostgreSQL connection URL.
    #[serde(default)]
    pub url: String,

    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Pool checkout timeout in seconds.
    #[serde(default = "default_pool_timeout")]
    pub pool_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            url: String::new(),
            pool_size: default_pool_size(),
            pool_timeout_secs: default_pool_timeout(),
        }
    }
}

fn default_pool_size() -> u32 {
    10
}

fn default_pool_timeout() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_storage_config() {
        let config = StorageConfig::default();
        assert_eq!(config.backend, StorageBackend::Postgres);
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.pool_timeout_secs, 10);
    }

    #[test]
    fn test_parse_storage_config() {
        let toml = r#"
            backend = "memory"
            pool_size = 4
        "#;

        let config: StorageConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.backend, StorageBackend::Memory);
        assert_eq!(config.pool_size, 4);
        assert!(config.url.is_empty());
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!(StorageBackend::parse("POSTGRES"), Some(StorageBackend::Postgres));
        assert_eq!(StorageBackend::parse("memory"), Some(StorageBackend::Memory));
        assert_eq!(StorageBackend::parse("mongo"), None);
    }
}
