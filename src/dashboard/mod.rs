use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::board::{Column, JobDraft, JobId, JobPatch};
use crate::error::TrackerError;
use crate::tracker::JobTracker;

#[derive(Clone)]
pub struct DashboardState {
    pub tracker: Arc<JobTracker>,
}

#[derive(Deserialize)]
struct MoveRequest {
    source: Column,
    target: Column,
    #[serde(default)]
    index: Option<usize>,
}

#[derive(Deserialize)]
struct ReorderRequest {
    column: Column,
    index: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Tracker errors rendered as JSON with a matching status code.
pub struct ApiError(TrackerError);

impl From<TrackerError> for ApiError {
    fn from(e: TrackerError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TrackerError::JobNotFound(_) => StatusCode::NOT_FOUND,
            TrackerError::StaleSource { .. } | TrackerError::UnconfirmedJob(_) => {
                StatusCode::CONFLICT
            }
            TrackerError::Validation(_) | TrackerError::InvariantViolation(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            TrackerError::Remote(_) | TrackerError::Http(_) => StatusCode::BAD_GATEWAY,
            TrackerError::Cache(_) | TrackerError::Io(_) | TrackerError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn parse_id(raw: &str) -> ApiResult<JobId> {
    Ok(raw.parse::<JobId>()?)
}

pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/columns", get(columns_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/status", get(status_handler))
        .route("/api/jobs", post(add_job_handler))
        .route(
            "/api/jobs/:id",
            patch(update_job_handler).delete(delete_job_handler),
        )
        .route("/api/jobs/:id/move", post(move_job_handler))
        .route("/api/jobs/:id/reorder", post(reorder_job_handler))
        .route("/api/sync", post(sync_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run_dashboard(addr: SocketAddr, state: DashboardState, shutdown: CancellationToken) {
    let app = router(state);

    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
    {
        tracing::error!(error = %e, "Dashboard server failed");
    }
}

async fn columns_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(state.tracker.columns().await)
}

async fn stats_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(state.tracker.stats().await)
}

async fn status_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(state.tracker.status().await)
}

async fn add_job_handler(
    State(state): State<DashboardState>,
    Json(draft): Json<JobDraft>,
) -> ApiResult<impl IntoResponse> {
    let job = state.tracker.add_job(draft).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

async fn update_job_handler(
    State(state): State<DashboardState>,
    Path(id): Path<String>,
    Json(patch): Json<JobPatch>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let job = state.tracker.update_job(&id, patch).await?;
    Ok(Json(job))
}

async fn delete_job_handler(
    State(state): State<DashboardState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    state.tracker.delete_job(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn move_job_handler(
    State(state): State<DashboardState>,
    Path(id): Path<String>,
    Json(req): Json<MoveRequest>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    state
        .tracker
        .move_job(&id, req.source, req.target, req.index)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reorder_job_handler(
    State(state): State<DashboardState>,
    Path(id): Path<String>,
    Json(req): Json<ReorderRequest>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    state
        .tracker
        .reorder_in_column(req.column, &id, req.index)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn sync_handler(State(state): State<DashboardState>) -> ApiResult<impl IntoResponse> {
    let outcome = state.tracker.sync_with_server().await?;
    Ok(Json(outcome))
}
