//! Core shared utilities for the model-serving services.

use anyhow::Result;
use axum::Router;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod error;
pub mod evaluation;
pub mod features;
pub mod metrics;
pub mod model;
pub mod table;

pub use error::{ServeError, ServeResult};
pub use evaluation::{evaluate, evaluate_file, MetricsSnapshot};
pub use features::{FeatureRow, FeatureSchema};
pub use metrics::{MetricsRecorder, Outcome};
pub use model::{Classifier, LogisticModel, ModelArtifact, ModelHandle};
pub use table::Table;

pub const ENV_PREFIX: &str = "MLSERVE";
pub const CONFIG_FILE_ENV: &str = "MLSERVE_CONFIG_FILE";
pub const JSON_LOG_ENV: &str = "MLSERVE_JSON_LOG";

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Install the global subscriber once. `RUST_LOG` wins over `default_level`;
/// `MLSERVE_JSON_LOG=1` switches to JSON lines. Output goes to stderr.
pub fn init_tracing(service: &str, default_level: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let json = std::env::var(JSON_LOG_ENV).ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        let registry = tracing_subscriber::registry().with(env_filter);
        if json {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_current_span(true)
                        .with_span_list(false)
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        } else {
            registry
                .with(fmt::layer().with_target(true).with_line_number(true).with_writer(std::io::stderr))
                .try_init()?;
        }
        Ok(())
    })?;
    info!(service, "tracing initialized");
    Ok(())
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub service_name: String,
    pub log_level: String,
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub model_sha256: Option<String>,
    pub predictions_path: PathBuf,
}

impl ServiceConfig {
    pub fn bind_addr(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Defaults, then the file named by `MLSERVE_CONFIG_FILE`, then `MLSERVE__*` env vars.
pub fn load_config(service: &str) -> Result<ServiceConfig> {
    let file = std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);
    load_config_from(service, file.as_deref())
}

pub fn load_config_from(service: &str, file: Option<&Path>) -> Result<ServiceConfig> {
    let mut builder = config::Config::builder()
        .set_default("service_name", service)?
        .set_default("log_level", "info")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8000_i64)?
        .set_default("model_path", "models/baseline.json")?
        .set_default("predictions_path", "data/predictions.csv")?;
    if let Some(f) = file {
        builder = builder.add_source(config::File::from(f).required(true));
    }
    builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"));
    let cfg: ServiceConfig = builder.build()?.try_deserialize()?;
    Ok(cfg)
}

pub async fn bind(addr: &str) -> Result<TcpListener> { Ok(TcpListener::bind(addr).await?) }

/// Serve `app` until Ctrl-C.
pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "http server listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    info!("http server stopped");
    Ok(())
}

pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
