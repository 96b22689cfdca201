use anyhow::Result;
use clap::Parser;

use schellar_core::config::SchellarConfig;

/// Validate the configuration and print the effective settings.
#[derive(Parser, Debug)]
pub struct CheckConfigCommand {
    /// Configuration file path. Falls back to environment variables when absent.
    #[arg(short, long, default_value = "schellar.toml")]
    pub config: String,
}

impl CheckConfigCommand {
    /// Load and validate, returning the checked configuration.
    pub fn check(&self) -> Result<SchellarConfig> {
        let config = SchellarConfig::load(&self.config)?;
        config.validate()?;
        Ok(config)
    }

    /// Execute the check-config command.
    pub async fn execute(self) -> Result<()> {
        let config = self.check()?;

        println!("Configuration OK");
        println!("  storage:   {:?}", config.storage.backend);
        println!("  engine:    {}", config.engine.url);
        println!(
            "  scheduler: every {}s, timezone {}",
            config.scheduler.check_interval_secs, config.scheduler.timezone
        );
        println!("  gateway:   {}:{}", config.gateway.host, config.gateway.port);
        Ok(())
    }
}
