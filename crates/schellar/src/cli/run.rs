use anyhow::Result;
use clap::Parser;
use tracing::info;

use schellar_core::config::SchellarConfig;

use crate::runtime::{init_tracing, Schellar};

/// Run the Schellar daemon.
#[derive(Parser, Debug)]
pub struct RunCommand {
    /// Configuration file path. Falls back to environment variables when absent.
    #[arg(short, long, default_value = "schellar.toml")]
    pub config: String,

    /// Port to listen on (overrides config).
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    pub host: Option<String>,

    /// Development mode: debug logging in the pretty format.
    #[arg(long)]
    pub dev: bool,
}

impl RunCommand {
    /// Load the configuration and apply command-line overrides.
    pub fn load_config(&self) -> Result<SchellarConfig> {
        let mut config = SchellarConfig::load(&self.config)?;
        if let Some(port) = self.port {
            config.gateway.port = port;
        }
        if let Some(ref host) = self.host {
            config.gateway.host = host.clone();
        }
        Ok(config)
    }

    /// Execute the run command.
    pub async fn execute(self) -> Result<()> {
        let config = self.load_config()?;
        init_tracing(&config.logging, self.dev);

        if std::path::Path::new(&self.config).exists() {
            info!(path = %self.config, "Loaded configuration file");
        } else {
            info!(path = %self.config, "No configuration file, using environment");
        }

        Schellar::new(config).run().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_overrides_applied() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[storage]
backend = "memory"

[gateway]
port = 4000
"#
        )
        .unwrap();

        let cmd = RunCommand {
            config: file.path().to_string_lossy().to_string(),
            port: Some(3100),
            host: Some("127.0.0.1".to_string()),
            dev: true,
        };
        let config = cmd.load_config().unwrap();
        assert_eq!(config.gateway.port, 3100);
        assert_eq!(config.gateway.host, "127.0.0.1");
    }

    #[test]
    fn test_file_values_without_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gateway]\nport = 4000").unwrap();

        let cmd = RunCommand {
            config: file.path().to_string_lossy().to_string(),
            port: None,
            host: None,
            dev: false,
        };
        assert_eq!(cmd.load_config().unwrap().gateway.port, 4000);
    }
}
