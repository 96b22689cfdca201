use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use schellar_core::{Schedule, SchellarError, StoreError};

use super::response::{ApiMessage, ApiResult};
use super::server::AppState;

fn decode(payload: Result<Json<Schedule>, JsonRejection>) -> ApiResult<Schedule> {
    payload
        .map(|Json(schedule)| schedule)
        .map_err(|e| ApiMessage::bad_request(format!("Error handling post results. err={}", e)))
}

/// Re-sync timers after a write. The write itself has already succeeded.
async fn resync(state: &AppState, schedule: &str) {
    if let Err(e) = state.scheduler.reconcile().await {
        tracing::warn!(
            schedule = %schedule,
            error = %e,
            "Timer reconciliation failed after write"
        );
    }
}

/// `POST /schedule`
pub async fn create_schedule(
    State(state): State<AppState>,
    payload: Result<Json<Schedule>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let mut schedule = decode(payload)?;
    schedule.validate_and_update()?;

    if state.store.find_by_name(&schedule.name).await?.is_some() {
        return Err(SchellarError::Duplicate(schedule.name).into());
    }

    tracing::debug!(
        schedule = %schedule.name,
        workflow = %schedule.workflow_name,
        "Saving schedule"
    );
    match state.store.insert(&schedule).await {
        Ok(()) => {}
        Err(StoreError::Conflict(_)) => {
            return Err(SchellarError::Duplicate(schedule.name).into());
        }
        Err(e) => return Err(e.into()),
    }

    resync(&state, &schedule.name).await;
    tracing::info!(schedule = %schedule.name, "Schedule created");
    Ok((StatusCode::CREATED, [(header::CACHE_CONTROL, "no-store")]))
}

/// `GET /schedule`
pub async fn list_schedules(State(state): State<AppState>) -> ApiResult<Json<Vec<Schedule>>> {
    Ok(Json(state.store.find_all().await?))
}

/// `GET /schedule/{name}`
pub async fn get_schedule(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Schedule>> {
    state
        .store
        .find_by_name(&name)
        .await?
        .map(Json)
        .ok_or_else(|| ApiMessage::not_found(format!("Couldn't find schedule {}", name)))
}

/// `PUT /schedule/{name}`
///
/// The name in the path wins over any name in the body, and the stored
/// status is kept.
pub async fn update_schedule(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: Result<Json<Schedule>, JsonRejection>,
) -> ApiResult<ApiMessage> {
    let mut schedule = decode(payload)?;
    schedule.name = name.clone();
    schedule.validate_and_update()?;

    let stored = state
        .store
        .find_by_name(&name)
        .await?
        .ok_or_else(|| ApiMessage::not_found(format!("Couldn't find schedule {}", name)))?;

    // Status tracks the engine, not the client.
    schedule.status = stored.status;
    state.store.update(&schedule).await?;
    resync(&state, &name).await;
    tracing::info!(schedule = %name, "Schedule updated");
    Ok(ApiMessage::ok("Schedule updated successfully"))
}

/// `DELETE /schedule/{name}`
pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<ApiMessage> {
    state.store.remove_by_name(&name).await?;
    resync(&state, &name).await;
    tracing::info!(schedule = %name, "Schedule deleted");
    Ok(ApiMessage::ok(format!(
        "Deleted schedule successfully. name={}",
        name
    )))
}

/// `GET /liveness`
pub async fn liveness() -> &'static str {
    "OK"
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        state.metrics.render(),
    )
}
