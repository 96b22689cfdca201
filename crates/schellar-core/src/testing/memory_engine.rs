use std::collections::HashMap;
use std::sync::RwLock;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::engine::{
    EngineError, EngineResult, InstanceSummary, LaunchRequest, SearchResult, WorkflowEngine,
    WorkflowInstance,
};
use crate::schedule::{ScheduleStatus, SCHEDULE_NAME_KEY};

type SearchKey = (String, String, bool);

/// One instance known to the fake engine.
#[derive(Debug, Clone)]
struct TrackedInstance {
    workflow_type: String,
    schedule_name: String,
    instance: WorkflowInstance,
    /// Completion order; larger means more recently ended.
    finished_seq: Option<u64>,
}

#[derive(Default)]
struct State {
    instances: Vec<TrackedInstance>,
    scripted: HashMap<SearchKey, SearchResult>,
    launches: Vec<LaunchRequest>,
    next_id: u64,
    next_finish: u64,
    launch_error: Option<EngineError>,
    search_error: Option<EngineError>,
    get_error: Option<EngineError>,
}

/// In-memory orchestration engine.
///
/// Launched instances start out RUNNING and show up in running searches for
/// their schedule until [`MemoryEngine::finish`] moves them to a terminal
/// status. Search results can also be scripted per query to simulate a
/// lagging index.
///
/// # Example
///
/// ```ignore
/// let engine = MemoryEngine::new();
/// let id = engine.launch_instance(&request).await?;
/// engine.finish(&id, ScheduleStatus::Completed, json!({"x": 1}));
///
/// engine.assert_launch_count(1);
/// ```
#[derive(Default)]
pub struct MemoryEngine {
    state: RwLock<State>,
}

impl MemoryEngine {
    /// Create an engine with no instances.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance that was started outside this engine.
    pub fn add_instance(
        &self,
        workflow_type: &str,
        schedule_name: &str,
        instance: WorkflowInstance,
    ) {
        let mut state = self.state.write().unwrap();
        let finished_seq = if instance.status.is_running() {
            None
        } else {
            state.next_finish += 1;
            Some(state.next_finish)
        };
        state.instances.push(TrackedInstance {
            workflow_type: workflow_type.to_string(),
            schedule_name: schedule_name.to_string(),
            instance,
            finished_seq,
        });
    }

    /// Move an instance to a terminal status with the given output.
    ///
    /// Returns false if the instance is unknown.
    pub fn finish(&self, instance_id: &str, status: ScheduleStatus, output: Value) -> bool {
        let mut state = self.state.write().unwrap();
        state.next_finish += 1;
        let seq = state.next_finish;
        match state
            .instances
            .iter_mut()
            .find(|t| t.instance.workflow_id == instance_id)
        {
            Some(tracked) => {
                tracked.instance.status = status;
                tracked.instance.output = output;
                tracked.finished_seq = Some(seq);
                true
            }
            None => false,
        }
    }

    /// Override the answer for one search query.
    pub fn script_search(
        &self,
        workflow_type: &str,
        schedule_name: &str,
        running: bool,
        result: SearchResult,
    ) {
        self.state.write().unwrap().scripted.insert(
            (workflow_type.to_string(), schedule_name.to_string(), running),
            result,
        );
    }

    /// Make every launch fail with `error`, or succeed again with `None`.
    pub fn fail_launches(&self, error: Option<EngineError>) {
        self.state.write().unwrap().launch_error = error;
    }

    /// Make every search fail with `error`, or succeed again with `None`.
    pub fn fail_searches(&self, error: Option<EngineError>) {
        self.state.write().unwrap().search_error = error;
    }

    /// Make every instance fetch fail with `error`, or succeed again with `None`.
    pub fn fail_gets(&self, error: Option<EngineError>) {
        self.state.write().unwrap().get_error = error;
    }

    /// All launch requests received, in order.
    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.state.read().unwrap().launches.clone()
    }

    /// Number of launch requests received.
    pub fn launch_count(&self) -> usize {
        self.state.read().unwrap().launches.len()
    }

    /// Ids of instances still running for a schedule.
    pub fn running_ids(&self, schedule_name: &str) -> Vec<String> {
        self.state
            .read()
            .unwrap()
            .instances
            .iter()
            .filter(|t| t.schedule_name == schedule_name && t.finished_seq.is_none())
            .map(|t| t.instance.workflow_id.clone())
            .collect()
    }

    /// Assert that exactly `expected` launches were requested.
    pub fn assert_launch_count(&self, expected: usize) {
        let launches = self.launches();
        assert_eq!(
            launches.len(),
            expected,
            "Expected {} launches, but found {}: {:?}",
            expected,
            launches.len(),
            launches.iter().map(|l| &l.name).collect::<Vec<_>>()
        );
    }

    fn search(state: &State, workflow_type: &str, schedule_name: &str, running: bool) -> SearchResult {
        let key = (workflow_type.to_string(), schedule_name.to_string(), running);
        if let Some(scripted) = state.scripted.get(&key) {
            return scripted.clone();
        }

        let mut matches: Vec<&TrackedInstance> = state
            .instances
            .iter()
            .filter(|t| t.workflow_type == workflow_type && t.schedule_name == schedule_name)
            .filter(|t| t.finished_seq.is_none() == running)
            .collect();
        matches.sort_by(|a, b| b.finished_seq.cmp(&a.finished_seq));

        SearchResult::from_results(
            matches
                .into_iter()
                .map(|t| InstanceSummary::new(&t.instance.workflow_id, t.instance.status.as_str()))
                .collect(),
        )
    }
}

impl WorkflowEngine for MemoryEngine {
    fn launch_instance<'a>(
        &'a self,
        request: &'a LaunchRequest,
    ) -> BoxFuture<'a, EngineResult<String>> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            if let Some(err) = state.launch_error.clone() {
                return Err(err);
            }

            state.next_id += 1;
            let id = format!("{}-{}", request.name, state.next_id);
            let schedule_name = request
                .input
                .get(SCHEDULE_NAME_KEY)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            state.launches.push(request.clone());
            state.instances.push(TrackedInstance {
                workflow_type: request.name.clone(),
                schedule_name,
                instance: WorkflowInstance {
                    workflow_id: id.clone(),
                    status: ScheduleStatus::Running,
                    output: Value::Null,
                },
                finished_seq: None,
            });
            Ok(id)
        })
    }

    fn get_instance<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> BoxFuture<'a, EngineResult<WorkflowInstance>> {
        Box::pin(async move {
            let state = self.state.read().unwrap();
            if let Some(err) = state.get_error.clone() {
                return Err(err);
            }
            state
                .instances
                .iter()
                .find(|t| t.instance.workflow_id == instance_id)
                .map(|t| t.instance.clone())
                .ok_or_else(|| EngineError::NotFound(instance_id.to_string()))
        })
    }

    fn search_instances<'a>(
        &'a self,
        workflow_type: &'a str,
        schedule_name: &'a str,
        running: bool,
    ) -> BoxFuture<'a, EngineResult<SearchResult>> {
        Box::pin(async move {
            let state = self.state.read().unwrap();
            if let Some(err) = state.search_error.clone() {
                return Err(err);
            }
            Ok(Self::search(&state, workflow_type, schedule_name, running))
        })
    }
}
