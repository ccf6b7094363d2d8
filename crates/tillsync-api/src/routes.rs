use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tillsync_core::models::SyncStatus;
use tillsync_core::services::SyncEngine;
use tillsync_core::state::SyncState;
use tillsync_core::sync::RunReport;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    engine: Arc<SyncEngine>,
    /// Present when the background scheduler runs in this process
    sync_state: Option<watch::Receiver<SyncState>>,
}

impl AppState {
    pub const fn new(
        engine: Arc<SyncEngine>,
        sync_state: Option<watch::Receiver<SyncState>>,
    ) -> Self {
        Self { engine, sync_state }
    }
}

pub fn app_router(state: AppState) -> Router {
    let sync_routes = Router::new()
        .route("/sync/trigger", post(trigger_sync))
        .route("/sync/push", post(push_sync))
        .route("/sync/pull", post(pull_sync))
        .route("/sync/status", get(list_statuses))
        .route("/sync/status/{table}", get(table_status).delete(reset_status));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", sync_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    sync_state: Option<SyncState>,
    pending_changes: usize,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        sync_state: state.sync_state.as_ref().map(|state| *state.borrow()),
        pending_changes: state.engine.queue().pending_count(),
    })
}

async fn trigger_sync(State(state): State<AppState>) -> Json<RunReport> {
    let report = state.engine.orchestrator().sync_now().await;
    log_report("sync_trigger", &report);
    Json(report)
}

async fn push_sync(State(state): State<AppState>) -> Json<RunReport> {
    let report = state.engine.orchestrator().sync_to_cloud().await;
    log_report("sync_push", &report);
    Json(report)
}

async fn pull_sync(State(state): State<AppState>) -> Json<RunReport> {
    let report = state.engine.orchestrator().sync_from_cloud().await;
    log_report("sync_pull", &report);
    Json(report)
}

async fn list_statuses(State(state): State<AppState>) -> Result<Json<Vec<SyncStatus>>, AppError> {
    Ok(Json(state.engine.orchestrator().sync_statuses().await?))
}

async fn table_status(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> Result<Json<SyncStatus>, AppError> {
    Ok(Json(state.engine.orchestrator().sync_status(&table).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResetResponse {
    table_name: String,
    reset: bool,
}

async fn reset_status(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> Result<Json<ResetResponse>, AppError> {
    let reset = state.engine.orchestrator().reset_sync_status(&table).await?;
    tracing::info!(endpoint = "sync_reset", table = %table, reset, "Reset sync status");
    Ok(Json(ResetResponse {
        table_name: table,
        reset,
    }))
}

fn log_report(endpoint: &'static str, report: &RunReport) {
    tracing::info!(
        endpoint,
        success = report.success,
        tables = report.tables_processed,
        records = report.records_synced,
        conflicts = report.conflicts,
        "Sync run finished"
    );
}
