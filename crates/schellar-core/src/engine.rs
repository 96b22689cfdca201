//! Contract to the workflow-orchestration engine.

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::schedule::{Schedule, ScheduleStatus};

/// Failure talking to the orchestration engine.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// Transport failure (connection refused, timeout, unreadable body).
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// The engine answered with a non-success status.
    #[error("engine rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The requested instance does not exist.
    #[error("workflow instance not found: {0}")]
    NotFound(String),

    /// The engine answered with a payload that could not be decoded.
    #[error("malformed engine response: {0}")]
    Malformed(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Request to start one workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRequest {
    /// Workflow definition name.
    pub name: String,
    /// Workflow definition version.
    pub version: String,
    /// Instance input.
    pub input: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_to_domain: Option<BTreeMap<String, String>>,
}

impl LaunchRequest {
    /// Build the launch request for a schedule's next instance.
    ///
    /// Empty correlation ids and task-to-domain maps are not forwarded.
    pub fn for_schedule(schedule: &Schedule) -> Self {
        Self {
            name: schedule.workflow_name.clone(),
            version: schedule.workflow_version.clone(),
            input: schedule.launch_input(),
            correlation_id: schedule
                .correlation_id
                .clone()
                .filter(|id| !id.is_empty()),
            task_to_domain: schedule
                .task_to_domain
                .clone()
                .filter(|domains| !domains.is_empty()),
        }
    }
}

/// Summary row returned by an instance search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSummary {
    /// Instance id.
    pub workflow_id: String,
    /// Status at indexing time.
    #[serde(default)]
    pub status: Option<String>,
    /// End time as reported by the search index.
    #[serde(default)]
    pub end_time: Option<Value>,
}

impl InstanceSummary {
    /// Create a summary with just an id and status.
    pub fn new(workflow_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            status: Some(status.into()),
            end_time: None,
        }
    }
}

/// Result page of an instance search, most recently ended first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Total number of matching instances (may exceed `results.len()`).
    #[serde(default)]
    pub total_hits: u64,
    /// First page of matches.
    #[serde(default)]
    pub results: Vec<InstanceSummary>,
}

impl SearchResult {
    /// Build a result whose hit count matches its rows.
    pub fn from_results(results: Vec<InstanceSummary>) -> Self {
        Self {
            total_hits: results.len() as u64,
            results,
        }
    }

    /// Whether the search matched anything.
    ///
    /// Both the hit count and the rows are consulted, since a lagging index
    /// can report one without the other.
    pub fn has_hits(&self) -> bool {
        self.total_hits > 0 || !self.results.is_empty()
    }

    /// The most recently ended match.
    pub fn latest(&self) -> Option<&InstanceSummary> {
        self.results.first()
    }
}

/// Full record of one workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInstance {
    /// Instance id.
    #[serde(default)]
    pub workflow_id: String,
    /// Status as reported by the engine.
    pub status: ScheduleStatus,
    /// Output payload; `null` while running.
    #[serde(default)]
    pub output: Value,
}

/// Launch, fetch and search workflow instances.
pub trait WorkflowEngine: Send + Sync {
    /// Start a new instance, returning its id.
    fn launch_instance<'a>(&'a self, request: &'a LaunchRequest)
        -> BoxFuture<'a, EngineResult<String>>;

    /// Fetch one instance by id.
    fn get_instance<'a>(&'a self, instance_id: &'a str)
        -> BoxFuture<'a, EngineResult<WorkflowInstance>>;

    /// Search instances of `workflow_type` launched by `schedule_name`,
    /// either still running or already finished.
    fn search_instances<'a>(
        &'a self,
        workflow_type: &'a str,
        schedule_name: &'a str,
        running: bool,
    ) -> BoxFuture<'a, EngineResult<SearchResult>>;
}
