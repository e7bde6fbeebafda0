//! Evaluation service: classification metrics over a predictions CSV.
//!
//! The file is re-read on every `GET /metrics`, so it can be produced by a
//! batch run after the service is already up.

use anyhow::Result;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serve_core::{bind, evaluate_file, init_tracing, load_config, serve, MetricsSnapshot, ServeError};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};

pub const SERVICE_NAME: &str = "evaluation-service";

/// Honoured ahead of `MLSERVE__PREDICTIONS_PATH` for older deployments.
pub const LEGACY_PREDICTIONS_ENV: &str = "PREDICTIONS_PATH";

#[derive(Clone)]
pub struct AppState {
    pub predictions_path: Arc<PathBuf>,
}

impl AppState {
    pub fn new(predictions_path: impl Into<PathBuf>) -> Self { Self { predictions_path: Arc::new(predictions_path.into()) } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub metrics: MetricsSnapshot,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> { Json(serde_json::json!({ "message": "Welcome to the ML Metrics API" })) }

async fn health() -> Json<serde_json::Value> { Json(serde_json::json!({ "status": "healthy" })) }

#[instrument(skip_all)]
async fn metrics(State(state): State<AppState>) -> Result<Json<MetricsResponse>, ServeError> {
    let path = state.predictions_path.clone();
    let snapshot = tokio::task::spawn_blocking(move || evaluate_file(&path))
        .await
        .map_err(|e| ServeError::Internal(format!("evaluation task failed: {e}")))??;
    info!(path = %state.predictions_path.display(), accuracy = snapshot.accuracy, f1 = snapshot.f1_score, "metrics computed");
    Ok(Json(MetricsResponse { metrics: snapshot }))
}

pub async fn run() -> Result<()> {
    let mut cfg = load_config(SERVICE_NAME)?;
    init_tracing(&cfg.service_name, &cfg.log_level)?;
    if let Ok(p) = std::env::var(LEGACY_PREDICTIONS_ENV) {
        cfg.predictions_path = PathBuf::from(p);
    }
    info!(?cfg, "config loaded");

    let state = AppState::new(cfg.predictions_path.clone());
    let listener = bind(&cfg.bind_addr()).await?;
    serve(listener, router(state)).await
}
