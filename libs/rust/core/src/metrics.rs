//! Request metrics for the scoring path.
//!
//! The recorder owns its own `prometheus::Registry` instead of the process
//! default one, so a service builds exactly one at startup and hands clones to
//! its handlers. Counters and histograms are atomic; clones share series.

use crate::error::{ServeError, ServeResult};
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::time::Duration;

pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

const LATENCY_BUCKETS: &[f64] = &[0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    ValidationError,
    ModelUnavailable,
    PredictionError,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [Outcome::Success, Outcome::ValidationError, Outcome::ModelUnavailable, Outcome::PredictionError];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::ValidationError => "validation_error",
            Outcome::ModelUnavailable => "model_unavailable",
            Outcome::PredictionError => "prediction_error",
        }
    }

    pub fn from_error(e: &ServeError) -> Self {
        match e {
            ServeError::Validation(_) => Outcome::ValidationError,
            ServeError::ModelUnavailable(_) => Outcome::ModelUnavailable,
            _ => Outcome::PredictionError,
        }
    }
}

#[derive(Clone)]
pub struct MetricsRecorder {
    registry: Registry,
    requests: IntCounterVec,
    latency: Histogram,
    model_loaded: IntGauge,
}

impl MetricsRecorder {
    /// `namespace` prefixes every series, e.g. `scoring` → `scoring_predict_requests_total`.
    pub fn new(namespace: &str) -> ServeResult<Self> {
        let registry = Registry::new();
        let requests = IntCounterVec::new(
            Opts::new("predict_requests_total", "Prediction requests by outcome").namespace(namespace),
            &["outcome"],
        )?;
        let latency = Histogram::with_opts(
            HistogramOpts::new("predict_latency_seconds", "Prediction request latency in seconds")
                .namespace(namespace)
                .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        let model_loaded = IntGauge::with_opts(
            Opts::new("model_loaded", "1 when a usable model is loaded").namespace(namespace),
        )?;
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(model_loaded.clone()))?;
        // pre-create every outcome so the exposition lists zeros before traffic
        for o in Outcome::ALL { requests.with_label_values(&[o.as_str()]); }
        Ok(Self { registry, requests, latency, model_loaded })
    }

    pub fn record_request(&self, outcome: Outcome, elapsed: Duration) {
        self.requests.with_label_values(&[outcome.as_str()]).inc();
        self.latency.observe(elapsed.as_secs_f64());
    }

    pub fn set_model_loaded(&self, loaded: bool) { self.model_loaded.set(i64::from(loaded)); }

    pub fn request_count(&self, outcome: Outcome) -> u64 { self.requests.with_label_values(&[outcome.as_str()]).get() }

    pub fn latency_samples(&self) -> u64 { self.latency.get_sample_count() }

    /// Prometheus text exposition of every series in this recorder.
    pub fn render(&self) -> ServeResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| ServeError::Internal(format!("metrics encoding: {e}")))
    }
}
