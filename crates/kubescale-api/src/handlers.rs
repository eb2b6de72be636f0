//! REST API handlers.
//!
//! Each handler calls one `Platform` operation and wraps the result in the
//! `{ success, data?, error? }` envelope.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::debug;

use kubescale_core::{Plan, WorkloadConfig};
use kubescale_state::PlatformError;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn status_for(e: &PlatformError) -> StatusCode {
    match e {
        PlatformError::Validation(_) => StatusCode::BAD_REQUEST,
        PlatformError::TenantNotFound(_) | PlatformError::WorkloadNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        PlatformError::QuotaExceeded { .. } => StatusCode::CONFLICT,
        PlatformError::ClusterUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn platform_error(e: PlatformError) -> Response {
    let status = status_for(&e);
    debug!(status = status.as_u16(), error = %e, "request rejected");
    error_response(&e.to_string(), status).into_response()
}

// ── Request bodies ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
    #[serde(default = "default_plan")]
    pub plan: Plan,
}

fn default_plan() -> Plan {
    Plan::Basic
}

#[derive(Debug, Deserialize)]
pub struct DeployWorkloadRequest {
    pub tenant_id: String,
    pub name: String,
    pub image: String,
    #[serde(flatten)]
    pub config: WorkloadConfig,
}

#[derive(Debug, Deserialize)]
pub struct PredictionRequest {
    pub workload_id: String,
    pub estimated_users: f64,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WorkloadsQuery {
    pub tenant: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PodsQuery {
    pub workload: Option<String>,
}

// ── Health ─────────────────────────────────────────────────────

/// GET /health
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.platform.health().await)
}

// ── Tenants ────────────────────────────────────────────────────

/// GET /api/v1/tenants
pub async fn list_tenants(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.platform.tenants().await)
}

/// POST /api/v1/tenants
pub async fn create_tenant(
    State(state): State<ApiState>,
    Json(req): Json<CreateTenantRequest>,
) -> impl IntoResponse {
    match state.platform.create_tenant(&req.name, req.plan).await {
        Ok(tenant) => (StatusCode::CREATED, ApiResponse::ok(tenant)).into_response(),
        Err(e) => platform_error(e),
    }
}

// ── Workloads ──────────────────────────────────────────────────

/// GET /api/v1/workloads?tenant=
pub async fn list_workloads(
    State(state): State<ApiState>,
    Query(q): Query<WorkloadsQuery>,
) -> impl IntoResponse {
    ApiResponse::ok(state.platform.get_workloads(q.tenant.as_deref()).await)
}

/// POST /api/v1/workloads
pub async fn deploy_workload(
    State(state): State<ApiState>,
    Json(req): Json<DeployWorkloadRequest>,
) -> impl IntoResponse {
    match state
        .platform
        .deploy_workload(&req.tenant_id, &req.name, &req.image, req.config)
        .await
    {
        Ok(workload) => (StatusCode::CREATED, ApiResponse::ok(workload)).into_response(),
        Err(e) => platform_error(e),
    }
}

/// GET /api/v1/workloads/{id}/traffic
pub async fn traffic_history(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.platform.traffic_history(&id).await {
        Ok(points) => ApiResponse::ok(points).into_response(),
        Err(e) => platform_error(e),
    }
}

// ── Pods ───────────────────────────────────────────────────────

/// GET /api/v1/pods?workload=
pub async fn list_pods(
    State(state): State<ApiState>,
    Query(q): Query<PodsQuery>,
) -> impl IntoResponse {
    ApiResponse::ok(state.platform.get_pods(q.workload.as_deref()).await)
}

// ── Predictions ────────────────────────────────────────────────

/// POST /api/v1/predictions
pub async fn submit_prediction(
    State(state): State<ApiState>,
    Json(req): Json<PredictionRequest>,
) -> impl IntoResponse {
    match state
        .platform
        .submit_prediction(&req.workload_id, req.estimated_users, req.confidence)
        .await
    {
        Ok(sample) => (StatusCode::ACCEPTED, ApiResponse::ok(sample)).into_response(),
        Err(e) => platform_error(e),
    }
}

// ── State ──────────────────────────────────────────────────────

/// GET /api/v1/state
pub async fn get_state(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.platform.snapshot().await)
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.platform.snapshot().await;
    let body = crate::prometheus::render_prometheus(&snapshot);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
