use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Response, StatusCode};
use schellar_core::config::EngineConfig;
use schellar_core::error::{Result, SchellarError};
use schellar_core::{
    EngineError, EngineResult, LaunchRequest, SearchResult, WorkflowEngine, WorkflowInstance,
};
use serde_json::Value;

/// HTTP client for the Conductor orchestration engine.
#[derive(Clone)]
pub struct ConductorClient {
    http: reqwest::Client,
    base_url: String,
    page_size: u32,
}

impl ConductorClient {
    /// Build a client from the engine configuration.
    ///
    /// Every request carries the configured `x-auth-user-groups`,
    /// `x-auth-user-roles` and `from` headers.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in [
            ("x-auth-user-groups", &config.admin_groups),
            ("x-auth-user-roles", &config.admin_roles),
            ("from", &config.from),
        ] {
            let value = HeaderValue::from_str(value).map_err(|e| {
                SchellarError::Config(format!("Invalid value for header '{}': {}", name, e))
            })?;
            headers.insert(HeaderName::from_static(name), value);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| SchellarError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            page_size: config.search_page_size,
        })
    }

    /// Base API URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Free-text search query matching instances of one workflow launched by
/// one schedule.
pub(crate) fn search_free_text(workflow_type: &str, schedule_name: &str, running: bool) -> String {
    let negation = if running { "" } else { "NOT" };
    format!(
        "workflowType:{} AND scheduleName:{} AND ({} status:RUNNING)",
        escape(workflow_type),
        escape(schedule_name),
        negation
    )
}

fn escape(term: &str) -> String {
    term.replace(':', "\\:")
}

/// Launch payload; numeric versions are sent as JSON numbers.
pub(crate) fn launch_body(request: &LaunchRequest) -> EngineResult<Value> {
    let mut body =
        serde_json::to_value(request).map_err(|e| EngineError::Malformed(e.to_string()))?;
    if let Ok(version) = request.version.trim().parse::<i64>() {
        body["version"] = Value::from(version);
    }
    Ok(body)
}

fn transport(e: reqwest::Error) -> EngineError {
    EngineError::Unavailable(e.to_string())
}

async fn rejected(response: Response) -> EngineError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    EngineError::Rejected { status, body }
}

impl WorkflowEngine for ConductorClient {
    fn launch_instance<'a>(
        &'a self,
        request: &'a LaunchRequest,
    ) -> BoxFuture<'a, EngineResult<String>> {
        Box::pin(async move {
            let body = launch_body(request)?;
            tracing::debug!(workflow = %request.name, body = %body, "Launching workflow");

            let response = self
                .http
                .post(format!("{}/workflow", self.base_url))
                .json(&body)
                .send()
                .await
                .map_err(transport)?;

            if !response.status().is_success() {
                let err = rejected(response).await;
                tracing::warn!(workflow = %request.name, error = %err, "POST /workflow rejected");
                return Err(err);
            }

            let text = response.text().await.map_err(transport)?;
            let id = text.trim().trim_matches('"').to_string();
            if id.is_empty() {
                return Err(EngineError::Malformed(
                    "POST /workflow returned an empty instance id".into(),
                ));
            }
            Ok(id)
        })
    }

    fn get_instance<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> BoxFuture<'a, EngineResult<WorkflowInstance>> {
        Box::pin(async move {
            tracing::debug!(instance_id = %instance_id, "Fetching workflow instance");

            let response = self
                .http
                .get(format!("{}/workflow/{}", self.base_url, instance_id))
                .query(&[("includeTasks", "false")])
                .send()
                .await
                .map_err(transport)?;

            match response.status() {
                StatusCode::NOT_FOUND => Err(EngineError::NotFound(instance_id.to_string())),
                status if status.is_success() => response
                    .json::<WorkflowInstance>()
                    .await
                    .map_err(|e| EngineError::Malformed(e.to_string())),
                _ => Err(rejected(response).await),
            }
        })
    }

    fn search_instances<'a>(
        &'a self,
        workflow_type: &'a str,
        schedule_name: &'a str,
        running: bool,
    ) -> BoxFuture<'a, EngineResult<SearchResult>> {
        Box::pin(async move {
            let free_text = search_free_text(workflow_type, schedule_name, running);
            tracing::debug!(free_text = %free_text, "Searching workflow instances");

            let size = self.page_size.to_string();
            let response = self
                .http
                .get(format!("{}/workflow/search", self.base_url))
                .query(&[
                    ("freeText", free_text.as_str()),
                    ("sort", "endTime:DESC"),
                    ("size", size.as_str()),
                ])
                .send()
                .await
                .map_err(transport)?;

            if !response.status().is_success() {
                return Err(rejected(response).await);
            }

            response
                .json::<SearchResult>()
                .await
                .map_err(|e| EngineError::Malformed(e.to_string()))
        })
    }
}
