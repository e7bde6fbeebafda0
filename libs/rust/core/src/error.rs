//! Error kinds shared by the scoring, evaluation and batch components.
//!
//! Every variant maps to exactly one HTTP status so handlers can bubble a
//! `ServeError` up with `?` and let [`IntoResponse`] render it.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::path::PathBuf;
use thiserror::Error;

pub type ServeResult<T> = Result<T, ServeError>;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("{what} not found at {}", .path.display())]
    NotFound { what: &'static str, path: PathBuf },
    #[error("model artifact at {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("{0}")]
    Schema(String),
    #[error("{0}")]
    EmptyInput(String),
    #[error("{0}")]
    Validation(String),
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("prediction failed: {0}")]
    PredictionFailure(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServeError {
    pub fn not_found(what: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::NotFound { what, path: path.into() }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt { path: path.into(), reason: reason.into() }
    }

    /// Short machine-readable name, used for metric labels and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Corrupt { .. } => "corrupt",
            Self::Schema(_) => "schema_error",
            Self::EmptyInput(_) => "empty_input",
            Self::Validation(_) => "validation_error",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::PredictionFailure(_) => "prediction_error",
            Self::Io(_) | Self::Csv(_) | Self::Metrics(_) | Self::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Schema(_) | Self::EmptyInput(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        } else {
            tracing::debug!(kind = self.kind(), error = %self, "request rejected");
        }
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}
