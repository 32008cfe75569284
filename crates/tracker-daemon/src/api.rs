//! HTTP API: tracker commands, status, health checks and Prometheus metrics

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use tracker_core::{
    health::{ComponentStatus, HealthRegistry},
    observability::TrackerMetrics,
    report::ComparisonReport,
    tracker::{Scheduler, SchedulerError, Settings, SortState, TrackerView},
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Scheduler,
    pub health_registry: HealthRegistry,
    pub metrics: TrackerMetrics,
}

impl AppState {
    pub fn new(scheduler: Scheduler, health_registry: HealthRegistry, metrics: TrackerMetrics) -> Self {
        Self {
            scheduler,
            health_registry,
            metrics,
        }
    }
}

/// Scheduler errors rendered as `{ "error": "..." }`
#[derive(Debug)]
pub struct ApiError(SchedulerError);

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SchedulerError::NotFound(_) => StatusCode::NOT_FOUND,
            SchedulerError::AlreadyTracked(_) => StatusCode::CONFLICT,
            SchedulerError::InvalidUrl(_)
            | SchedulerError::InvalidInterval(_)
            | SchedulerError::MissingApiKey
            | SchedulerError::InvalidBaseline(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct AddTrackerRequest {
    pub url: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UrlRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub url: String,
    pub index: usize,
}

#[derive(Debug, Deserialize)]
pub struct BaselineRequest {
    #[serde(default)]
    pub url: Option<String>,
}

/// Settings as reported back; the key itself is never echoed
#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub api_key_set: bool,
    pub poll_interval_secs: u64,
}

impl From<&Settings> for SettingsResponse {
    fn from(settings: &Settings) -> Self {
        Self {
            api_key_set: settings.has_api_key(),
            poll_interval_secs: settings.poll_interval_secs,
        }
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn list_trackers(State(state): State<Arc<AppState>>) -> Json<Vec<TrackerView>> {
    Json(state.scheduler.views().await)
}

/// Add a URL and run its first cycle right away
async fn add_tracker(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddTrackerRequest>,
) -> ApiResult<(StatusCode, Json<TrackerView>)> {
    let view = state
        .scheduler
        .add_tracker(&request.url, request.label)
        .await?;
    let view = state.scheduler.start(&view.url, true).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn remove_tracker(
    State(state): State<Arc<AppState>>,
    Query(request): Query<UrlRequest>,
) -> ApiResult<StatusCode> {
    state.scheduler.remove_tracker(&request.url).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_tracker(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UrlRequest>,
) -> ApiResult<Json<TrackerView>> {
    Ok(Json(state.scheduler.start(&request.url, false).await?))
}

async fn stop_tracker(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UrlRequest>,
) -> ApiResult<Json<TrackerView>> {
    Ok(Json(state.scheduler.stop(&request.url).await?))
}

async fn run_tracker(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UrlRequest>,
) -> ApiResult<Json<TrackerView>> {
    Ok(Json(state.scheduler.trigger_now(&request.url).await?))
}

async fn move_tracker(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MoveRequest>,
) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(
        state
            .scheduler
            .move_tracker(&request.url, request.index)
            .await?,
    ))
}

async fn start_all(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let started = state.scheduler.start_all().await?;
    Ok(Json(json!({ "started": started })))
}

async fn stop_all(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let stopped = state.scheduler.stop_all().await;
    Json(json!({ "stopped": stopped }))
}

async fn clear_all(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let removed = state.scheduler.clear_all().await;
    Json(json!({ "removed": removed }))
}

async fn get_settings(State(state): State<Arc<AppState>>) -> Json<SettingsResponse> {
    let settings = state.scheduler.settings().await;
    Json(SettingsResponse::from(&settings))
}

async fn put_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<Settings>,
) -> ApiResult<Json<SettingsResponse>> {
    let settings = state.scheduler.update_settings(settings).await?;
    info!(
        poll_interval_secs = settings.poll_interval_secs,
        "Settings updated"
    );
    Ok(Json(SettingsResponse::from(&settings)))
}

async fn put_baseline(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BaselineRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let baseline = state
        .scheduler
        .set_baseline(request.url.as_deref())
        .await?;
    Ok(Json(json!({ "baseline": baseline })))
}

async fn put_sort(
    State(state): State<Arc<AppState>>,
    Json(sort): Json<SortState>,
) -> Json<SortState> {
    state.scheduler.set_sort(sort).await;
    Json(sort)
}

async fn report(State(state): State<Arc<AppState>>) -> Json<ComparisonReport> {
    Json(state.scheduler.report().await)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route(
            "/api/trackers",
            get(list_trackers).post(add_tracker).delete(remove_tracker),
        )
        .route("/api/trackers/start", post(start_tracker))
        .route("/api/trackers/stop", post(stop_tracker))
        .route("/api/trackers/run", post(run_tracker))
        .route("/api/trackers/move", post(move_tracker))
        .route("/api/trackers/start-all", post(start_all))
        .route("/api/trackers/stop-all", post(stop_all))
        .route("/api/trackers/all", delete(clear_all))
        .route("/api/settings", get(get_settings).put(put_settings))
        .route("/api/baseline", put(put_baseline))
        .route("/api/sort", put(put_sort))
        .route("/api/report", get(report))
        .with_state(state)
}

/// Start the API server, shutting down gracefully when `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
