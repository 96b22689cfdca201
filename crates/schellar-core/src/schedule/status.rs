use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Status of a schedule, mirroring the most recently observed workflow
/// instance.
///
/// Terminal states are defined by the orchestration engine, so anything this
/// crate does not know about is kept verbatim in [`ScheduleStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ScheduleStatus {
    /// No instance has been observed yet.
    #[default]
    Unknown,
    /// An instance was launched and has not been seen finishing.
    Running,
    Completed,
    Failed,
    Terminated,
    TimedOut,
    Paused,
    /// A status reported by the engine that has no dedicated variant.
    Other(String),
}

impl ScheduleStatus {
    /// Convert to the wire/database representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Terminated => "TERMINATED",
            Self::TimedOut => "TIMED_OUT",
            Self::Paused => "PAUSED",
            Self::Other(s) => s,
        }
    }

    /// Parse from the wire/database representation. Never fails.
    pub fn parse(s: &str) -> Self {
        match s {
            "" | "UNKNOWN" => Self::Unknown,
            "RUNNING" => Self::Running,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            "TERMINATED" => Self::Terminated,
            "TIMED_OUT" => Self::TimedOut,
            "PAUSED" => Self::Paused,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether the status describes an in-flight instance.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ScheduleStatus {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for ScheduleStatus {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl Serialize for ScheduleStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ScheduleStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_conversion() {
        assert_eq!(ScheduleStatus::Running.as_str(), "RUNNING");
        assert_eq!(ScheduleStatus::TimedOut.as_str(), "TIMED_OUT");
        assert_eq!(ScheduleStatus::parse("COMPLETED"), ScheduleStatus::Completed);
        assert_eq!(ScheduleStatus::parse(""), ScheduleStatus::Unknown);
    }

    #[test]
    fn test_unrecognized_status_passes_through() {
        let status = ScheduleStatus::parse("FAILED_WITH_TERMINAL_ERROR");
        assert_eq!(
            status,
            ScheduleStatus::Other("FAILED_WITH_TERMINAL_ERROR".to_string())
        );
        assert_eq!(status.as_str(), "FAILED_WITH_TERMINAL_ERROR");
        assert!(!status.is_running());
    }

    #[test]
    fn test_serde_as_plain_string() {
        let json = serde_json::to_string(&ScheduleStatus::Paused).unwrap();
        assert_eq!(json, "\"PAUSED\"");

        let back: ScheduleStatus = serde_json::from_str("\"RUNNING\"").unwrap();
        assert!(back.is_running());
    }
}
