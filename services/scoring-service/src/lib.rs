//! Scoring service: single-row prediction over HTTP.
//!
//! Routes:
//! - `GET /health`  → `{"status": "ok"}`
//! - `POST /predict` with `{"x1": .., "x2": ..}` → `{"score": .., "model_version": ..}`
//! - `GET /metrics` → Prometheus text exposition

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serve_core::metrics::TEXT_CONTENT_TYPE;
use serve_core::{
    bind, init_tracing, load_config, serve, FeatureSchema, MetricsRecorder, ModelHandle, Outcome, ServeError, ServeResult,
};
use std::time::Instant;
use tracing::{debug, info, instrument};

pub const SERVICE_NAME: &str = "scoring-service";

/// Request schema used while no model is loaded, so bodies are still validated.
pub const DEFAULT_FEATURES: [&str; 2] = ["x1", "x2"];

#[derive(Clone)]
pub struct AppState {
    pub schema: FeatureSchema,
    pub model: ModelHandle,
    pub metrics: MetricsRecorder,
}

impl AppState {
    pub fn new(model: ModelHandle) -> ServeResult<Self> {
        let schema = match model.classifier() {
            Ok(c) => c.schema().clone(),
            Err(_) => FeatureSchema::new(DEFAULT_FEATURES),
        };
        let metrics = MetricsRecorder::new("scoring")?;
        metrics.set_model_loaded(model.is_usable());
        Ok(Self { schema, model, metrics })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub score: f64,
    pub model_version: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Validate `body` against `schema`, then score it. Validation runs before
/// the model check so malformed input is always a 4xx.
pub fn score(schema: &FeatureSchema, model: &ModelHandle, body: &[u8]) -> ServeResult<PredictResponse> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ServeError::Validation(format!("request body is not valid JSON: {e}")))?;
    let row = schema.parse_json(&value)?;
    let classifier = model.classifier()?;
    let score = classifier
        .positive_proba(std::slice::from_ref(&row))?
        .into_iter()
        .next()
        .ok_or_else(|| ServeError::PredictionFailure("model returned no score".into()))?;
    if !(0.0..=1.0).contains(&score) {
        return Err(ServeError::PredictionFailure(format!("score {score} outside [0, 1]")));
    }
    Ok(PredictResponse { score, model_version: classifier.version().to_string() })
}

async fn health() -> Json<serde_json::Value> { Json(serde_json::json!({ "status": "ok" })) }

/// Body rejections from axum (oversized payload, aborted stream) count as
/// validation errors so every attempt reaches the recorder.
#[instrument(skip_all)]
async fn predict(State(state): State<AppState>, body: Result<Bytes, BytesRejection>) -> Response {
    let start = Instant::now();
    let body = match body {
        Ok(b) => b,
        Err(rejection) => {
            state.metrics.record_request(Outcome::ValidationError, start.elapsed());
            debug!(status = %rejection.status(), reason = %rejection.body_text(), "body rejected");
            return rejection.into_response();
        }
    };
    let result = score(&state.schema, &state.model, &body);
    let outcome = match &result {
        Ok(_) => Outcome::Success,
        Err(e) => Outcome::from_error(e),
    };
    state.metrics.record_request(outcome, start.elapsed());
    match result {
        Ok(r) => {
            debug!(score = r.score, version = %r.model_version, "scored");
            Json(r).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn metrics(State(state): State<AppState>) -> Result<Response, ServeError> {
    let body = state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)], body).into_response())
}

pub async fn run() -> Result<()> {
    let cfg = load_config(SERVICE_NAME)?;
    init_tracing(&cfg.service_name, &cfg.log_level)?;
    info!(?cfg, "config loaded");

    let model = ModelHandle::load(&cfg.model_path, cfg.model_sha256.as_deref());
    let state = AppState::new(model)?;
    info!(model_loaded = state.model.is_usable(), "service ready");

    let listener = bind(&cfg.bind_addr()).await?;
    serve(listener, router(state)).await
}
