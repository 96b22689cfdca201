use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use schellar_core::config::GatewayConfig;
use schellar_core::error::{Result, SchellarError};
use schellar_core::ScheduleStore;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::metrics::SchedulerMetrics;
use crate::scheduler::Scheduler;

/// Shared state behind every request handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ScheduleStore>,
    pub scheduler: Arc<Scheduler>,
    pub metrics: Arc<SchedulerMetrics>,
}

/// HTTP server for schedule management, liveness and metrics.
pub struct GatewayServer {
    config: GatewayConfig,
    state: AppState,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Build the Axum router.
    pub fn router(&self) -> Router {
        let cors = if self.config.cors_enabled {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers(Any)
        } else {
            CorsLayer::new()
        };

        Router::new()
            .route(
                "/schedule",
                get(handlers::list_schedules).post(handlers::create_schedule),
            )
            .route(
                "/schedule/{name}",
                get(handlers::get_schedule)
                    .put(handlers::update_schedule)
                    .delete(handlers::delete_schedule),
            )
            .route("/liveness", get(handlers::liveness))
            .route("/metrics", get(handlers::metrics))
            .with_state(self.state.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors),
            )
    }

    /// Get the socket address to bind to.
    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| {
                SchellarError::Config(format!(
                    "Invalid listen address '{}:{}': {}",
                    self.config.host, self.config.port, e
                ))
            })
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.addr()?;
        let router = self.router();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "Gateway listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TimerKey;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use schellar_core::config::SchedulerConfig;
    use schellar_core::testing::{FailingStore, MemoryEngine};
    use schellar_core::{MemoryScheduleStore, Schedule, ScheduleStatus};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct Harness {
        router: Router,
        store: Arc<MemoryScheduleStore>,
        scheduler: Arc<Scheduler>,
    }

    fn harness_with(
        store: Arc<MemoryScheduleStore>,
        api_store: Arc<dyn ScheduleStore>,
    ) -> Harness {
        let metrics = Arc::new(SchedulerMetrics::new().unwrap());
        let scheduler = Arc::new(
            Scheduler::new(
                store.clone(),
                Arc::new(MemoryEngine::new()),
                &SchedulerConfig::default(),
                metrics.clone(),
            )
            .unwrap(),
        );
        let state = AppState {
            store: api_store,
            scheduler: scheduler.clone(),
            metrics,
        };
        Harness {
            router: GatewayServer::new(GatewayConfig::default(), state).router(),
            store,
            scheduler,
        }
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryScheduleStore::new());
        harness_with(store.clone(), store)
    }

    async fn send(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    fn message(bytes: &[u8]) -> String {
        let body: Value = serde_json::from_slice(bytes).unwrap();
        body["message"].as_str().unwrap().to_string()
    }

    fn nightly() -> Value {
        json!({
            "name": "nightly",
            "enabled": true,
            "workflowName": "wf1",
            "workflowVersion": 1,
            "cronString": "0 0 * * *",
            "workflowContext": {"region": "eu"}
        })
    }

    #[tokio::test]
    async fn test_create_arms_timer_and_get_returns_schedule() {
        let h = harness();

        let (status, _) = send(&h.router, "POST", "/schedule", Some(nightly())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(
            h.scheduler.registry().active_keys(),
            vec![TimerKey::new("nightly", "0 0 * * *")]
        );

        let (status, body) = send(&h.router, "GET", "/schedule/nightly", None).await;
        assert_eq!(status, StatusCode::OK);
        let schedule: Schedule = serde_json::from_slice(&body).unwrap();
        assert_eq!(schedule.workflow_name, "wf1");
        assert_eq!(schedule.workflow_version, "1");
        assert_eq!(schedule.workflow_context["region"], json!("eu"));

        let (status, body) = send(&h.router, "GET", "/schedule", None).await;
        assert_eq!(status, StatusCode::OK);
        let all: Vec<Schedule> = serde_json::from_slice(&body).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let h = harness();
        send(&h.router, "POST", "/schedule", Some(nightly())).await;

        let (status, body) = send(&h.router, "POST", "/schedule", Some(nightly())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message(&body), "Duplicate schedule name 'nightly'");
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_invalid_payloads_rejected() {
        let h = harness();

        let mut missing_workflow = nightly();
        missing_workflow["workflowName"] = json!("");
        let (status, body) = send(&h.router, "POST", "/schedule", Some(missing_workflow)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(message(&body).contains("workflowName"));

        let mut bad_cron = nightly();
        bad_cron["cronString"] = json!("not a cron");
        let (status, _) = send(&h.router, "POST", "/schedule", Some(bad_cron)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = Request::builder()
            .method("POST")
            .uri("/schedule")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = h.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert!(h.store.is_empty().await);
        assert!(h.scheduler.registry().is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let h = harness();
        let (status, body) = send(&h.router, "GET", "/schedule/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(message(&body), "Couldn't find schedule ghost");
    }

    #[tokio::test]
    async fn test_update_uses_path_name_and_rearms_timer() {
        let h = harness();
        send(&h.router, "POST", "/schedule", Some(nightly())).await;

        let mut changed = nightly();
        changed["name"] = json!("renamed");
        changed["cronString"] = json!("30 2 * * *");
        let (status, body) = send(&h.router, "PUT", "/schedule/nightly", Some(changed)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(message(&body), "Schedule updated successfully");

        let stored = h.store.find_by_name("nightly").await.unwrap().unwrap();
        assert_eq!(stored.cron_expression, "30 2 * * *");
        assert!(h.store.find_by_name("renamed").await.unwrap().is_none());
        assert_eq!(
            h.scheduler.registry().active_keys(),
            vec![TimerKey::new("nightly", "30 2 * * *")]
        );
    }

    #[tokio::test]
    async fn test_update_keeps_running_status() {
        let h = harness();
        send(&h.router, "POST", "/schedule", Some(nightly())).await;
        h.store
            .update_status("nightly", &ScheduleStatus::Running)
            .await
            .unwrap();

        let mut changed = nightly();
        changed["parallelRuns"] = json!(true);
        changed["status"] = json!("COMPLETED");
        let (status, _) = send(&h.router, "PUT", "/schedule/nightly", Some(changed)).await;
        assert_eq!(status, StatusCode::OK);

        let stored = h.store.find_by_name("nightly").await.unwrap().unwrap();
        assert!(stored.parallel_runs);
        assert_eq!(stored.status, ScheduleStatus::Running);
        let running = h
            .store
            .find_by_status(&ScheduleStatus::Running)
            .await
            .unwrap();
        assert_eq!(running.len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let h = harness();
        let (status, _) = send(&h.router, "PUT", "/schedule/ghost", Some(nightly())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_disarms_timer() {
        let h = harness();
        send(&h.router, "POST", "/schedule", Some(nightly())).await;

        let (status, body) = send(&h.router, "DELETE", "/schedule/nightly", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(message(&body), "Deleted schedule successfully. name=nightly");
        assert!(h.store.is_empty().await);
        assert!(h.scheduler.registry().is_empty());
    }

    #[tokio::test]
    async fn test_liveness_and_metrics() {
        let h = harness();
        send(&h.router, "POST", "/schedule", Some(nightly())).await;

        let (status, body) = send(&h.router, "GET", "/liveness", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");

        let (status, body) = send(&h.router, "GET", "/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("schellar_active_timers 1"));
    }

    #[tokio::test]
    async fn test_storage_failure_is_internal_error() {
        let store = Arc::new(MemoryScheduleStore::new());
        let h = harness_with(store, Arc::new(FailingStore::new()));

        let (status, body) = send(&h.router, "GET", "/schedule", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(message(&body).contains("storage unavailable"));
    }

    #[tokio::test]
    async fn test_write_succeeds_when_reconcile_fails() {
        // The scheduler reads a separate store that is down; the write still lands.
        let api_store = Arc::new(MemoryScheduleStore::new());
        let metrics = Arc::new(SchedulerMetrics::new().unwrap());
        let scheduler = Arc::new(
            Scheduler::new(
                Arc::new(FailingStore::wrapping(MemoryScheduleStore::new(), true)),
                Arc::new(MemoryEngine::new()),
                &SchedulerConfig::default(),
                metrics.clone(),
            )
            .unwrap(),
        );
        let router = GatewayServer::new(
            GatewayConfig::default(),
            AppState {
                store: api_store.clone(),
                scheduler: scheduler.clone(),
                metrics,
            },
        )
        .router();

        let (status, _) = send(&router, "POST", "/schedule", Some(nightly())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(api_store.len().await, 1);
        assert!(scheduler.registry().is_empty());
    }

    #[test]
    fn test_invalid_listen_address() {
        let h = harness();
        let config = GatewayConfig {
            host: "not an address".into(),
            ..Default::default()
        };
        let server = GatewayServer::new(
            config,
            AppState {
                store: h.store.clone(),
                scheduler: h.scheduler.clone(),
                metrics: Arc::new(SchedulerMetrics::new().unwrap()),
            },
        );
        assert!(matches!(server.addr(), Err(SchellarError::Config(_))));
    }
}
