use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::cron::CronSchedule;
use super::status::ScheduleStatus;
use crate::error::{Result, SchellarError};

/// Input key carrying the schedule name into every launched instance.
pub const SCHEDULE_NAME_KEY: &str = "scheduleName";

/// Context key holding the output of the last finished instance.
pub const LAST_EXECUTION_KEY: &str = "lastExecution";

/// Default advisory threshold for long-running instances.
pub const DEFAULT_CHECK_WARNING_SECONDS: i32 = 3600;

/// A named schedule driving one workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Unique, immutable name.
    pub name: String,

    /// Whether a timer should exist for this schedule.
    #[serde(default)]
    pub enabled: bool,

    /// Status of the most recently observed instance.
    #[serde(default)]
    pub status: ScheduleStatus,

    /// Workflow definition to launch.
    #[serde(default)]
    pub workflow_name: String,

    /// Workflow definition version.
    #[serde(default, deserialize_with = "string_or_number")]
    pub workflow_version: String,

    /// Input payload for launched instances.
    #[serde(default, deserialize_with = "map_or_null")]
    pub workflow_context: Map<String, Value>,

    /// Standard 5-field cron expression.
    #[serde(rename = "cronString", default)]
    pub cron_expression: String,

    /// Launch even when a previous instance is still running.
    #[serde(default)]
    pub parallel_runs: bool,

    /// Advisory threshold, informational only.
    #[serde(default = "default_check_warning_seconds")]
    pub check_warning_seconds: i32,

    /// Ticks before this instant are ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_date: Option<DateTime<Utc>>,

    /// Ticks at or after this instant are ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_date: Option<DateTime<Utc>>,

    /// Last time the record was written.
    #[serde(default = "Utc::now")]
    pub last_update: DateTime<Utc>,

    /// Forwarded verbatim to launched instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Forwarded verbatim to launched instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_to_domain: Option<BTreeMap<String, String>>,
}

fn default_check_warning_seconds() -> i32 {
    DEFAULT_CHECK_WARNING_SECONDS
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, found {}",
            other
        ))),
    }
}

fn map_or_null<'de, D>(deserializer: D) -> std::result::Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Schedule {
    /// Create an enabled schedule with default settings.
    pub fn new(
        name: impl Into<String>,
        cron_expression: impl Into<String>,
        workflow_name: impl Into<String>,
        workflow_version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            status: ScheduleStatus::Unknown,
            workflow_name: workflow_name.into(),
            workflow_version: workflow_version.into(),
            workflow_context: Map::new(),
            cron_expression: cron_expression.into(),
            parallel_runs: false,
            check_warning_seconds: DEFAULT_CHECK_WARNING_SECONDS,
            from_date: None,
            to_date: None,
            last_update: Utc::now(),
            correlation_id: None,
            task_to_domain: None,
        }
    }

    /// Set whether the schedule is enabled.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the parallel-run policy.
    pub fn with_parallel_runs(mut self, parallel_runs: bool) -> Self {
        self.parallel_runs = parallel_runs;
        self
    }

    /// Set the activation window.
    pub fn with_window(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from_date = from;
        self.to_date = to;
        self
    }

    /// Set the workflow context.
    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.workflow_context = context;
        self
    }

    /// Validate user input and fill defaults before the record is written.
    pub fn validate_and_update(&mut self) -> Result<()> {
        if self.name.is_empty() {
            return Err(SchellarError::Validation("'name' is required".into()));
        }
        if self.name.contains('/') {
            return Err(SchellarError::Validation(
                "'name' cannot contain '/' character".into(),
            ));
        }
        if self.workflow_name.is_empty() {
            return Err(SchellarError::Validation("'workflowName' is required".into()));
        }
        if self.cron_expression.trim().is_empty() {
            return Err(SchellarError::Validation("'cronString' is required".into()));
        }
        self.cron_schedule()
            .map_err(|e| SchellarError::Validation(format!("'cronString' is invalid: {}", e)))?;
        if let (Some(from), Some(to)) = (self.from_date, self.to_date) {
            if from >= to {
                return Err(SchellarError::Validation(
                    "'fromDate' must be before 'toDate'".into(),
                ));
            }
        }

        if self.check_warning_seconds <= 0 {
            self.check_warning_seconds = DEFAULT_CHECK_WARNING_SECONDS;
        }
        self.last_update = Utc::now();
        Ok(())
    }

    /// Parse the cron expression.
    pub fn cron_schedule(&self) -> std::result::Result<CronSchedule, super::CronParseError> {
        CronSchedule::parse(&self.cron_expression)
    }

    /// Whether a tick at `now` falls inside the activation window.
    ///
    /// `fromDate` is inclusive, `toDate` is exclusive.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        let before_end = self.to_date.map_or(true, |to| now < to);
        let after_start = self.from_date.map_or(true, |from| now >= from);
        before_end && after_start
    }

    /// Build the input for a new instance: the workflow context with the
    /// schedule name merged in.
    pub fn launch_input(&self) -> Map<String, Value> {
        let mut input = self.workflow_context.clone();
        input.insert(
            SCHEDULE_NAME_KEY.to_string(),
            Value::String(self.name.clone()),
        );
        input
    }

    /// Fold the output of a finished instance into the context.
    ///
    /// Returns false (and leaves the context alone) when the output is empty.
    pub fn record_last_execution(&mut self, output: &Value) -> bool {
        let is_empty = match output {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if is_empty {
            return false;
        }

        self.workflow_context
            .insert(LAST_EXECUTION_KEY.to_string(), output.clone());
        true
    }
}
