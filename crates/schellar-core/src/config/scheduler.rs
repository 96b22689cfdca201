use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Schedule engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between reconciliation passes.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Upper bound for any single storage or engine call made by the
    /// scheduler.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// IANA timezone cron expressions are evaluated in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            call_timeout_secs: default_call_timeout(),
            timezone: default_timezone(),
        }
    }
}

impl SchedulerConfig {
    /// Reconciliation cadence.
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Per-call timeout.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Parsed timezone; `None` if the name is unknown.
    pub fn tz(&self) -> Option<Tz> {
        self.timezone.parse().ok()
    }
}

fn default_check_interval() -> u64 {
    10
}

fn default_call_timeout() -> u64 {
    10
}

fn default_timezone() -> String {
    "UTC".to_string()
}
