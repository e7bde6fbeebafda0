//! Model Handle: a fitted classifier loaded once at startup and shared
//! read-only by every caller.
//!
//! The on-disk artifact is a JSON logistic-regression description:
//! - binary: two classes, one coefficient row, `P(classes[1]) = sigmoid(w·x + b)`
//! - multinomial: one coefficient row per class, softmax over the logits
//!
//! A failed load does not abort the process. [`ModelHandle::load`] keeps the
//! diagnostic and every later prediction fails with `ModelUnavailable`.

use crate::error::{ServeError, ServeResult};
use crate::features::{FeatureRow, FeatureSchema};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Bulk predictions at or above this many rows fan out over the rayon pool.
pub const PARALLEL_THRESHOLD: usize = 1024;

pub trait Classifier: Send + Sync {
    fn version(&self) -> &str;
    fn schema(&self) -> &FeatureSchema;
    fn classes(&self) -> &[i64];

    /// One probability vector per row, ordered like [`Classifier::classes`].
    fn predict_proba(&self, rows: &[FeatureRow]) -> ServeResult<Vec<Vec<f64>>>;

    fn predict(&self, rows: &[FeatureRow]) -> ServeResult<Vec<i64>> {
        let classes = self.classes();
        self.predict_proba(rows)?
            .iter()
            .map(|probs| {
                argmax(probs)
                    .and_then(|i| classes.get(i).copied())
                    .ok_or_else(|| ServeError::PredictionFailure("model returned no class probabilities".into()))
            })
            .collect()
    }

    /// Probability of the positive (last) class for each row.
    fn positive_proba(&self, rows: &[FeatureRow]) -> ServeResult<Vec<f64>> {
        self.predict_proba(rows)?
            .into_iter()
            .map(|probs| {
                probs
                    .last()
                    .copied()
                    .ok_or_else(|| ServeError::PredictionFailure("model returned no class probabilities".into()))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: String,
    pub feature_names: Vec<String>,
    pub classes: Vec<i64>,
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct LogisticModel {
    version: String,
    schema: FeatureSchema,
    classes: Vec<i64>,
    coefficients: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
}

impl LogisticModel {
    /// Load and validate an artifact. `expected_sha256` pins the file digest.
    pub fn load(path: &Path, expected_sha256: Option<&str>) -> ServeResult<Self> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ServeError::not_found("model file", path)),
            Err(e) => return Err(ServeError::corrupt(path, format!("unreadable: {e}"))),
        };
        if let Some(expect) = expected_sha256.filter(|s| !s.is_empty()) {
            let got = hex::encode(Sha256::digest(&bytes));
            if !expect.eq_ignore_ascii_case(&got) {
                return Err(ServeError::corrupt(path, format!("sha256 mismatch expected={expect} got={got}")));
            }
        }
        let artifact: ModelArtifact = serde_json::from_slice(&bytes)
            .map_err(|e| ServeError::corrupt(path, format!("invalid model json: {e}")))?;
        Self::from_artifact(artifact).map_err(|reason| ServeError::corrupt(path, reason))
    }

    pub fn from_artifact(a: ModelArtifact) -> Result<Self, String> {
        let width = a.feature_names.len();
        if width == 0 { return Err("model declares no features".into()); }
        if a.classes.len() < 2 { return Err(format!("need at least two classes, got {}", a.classes.len())); }
        let rows = if a.classes.len() == 2 { 1 } else { a.classes.len() };
        if a.coefficients.len() != rows || a.intercepts.len() != rows {
            return Err(format!(
                "{} classes need {rows} coefficient rows and intercepts, got {} and {}",
                a.classes.len(), a.coefficients.len(), a.intercepts.len()
            ));
        }
        if let Some(bad) = a.coefficients.iter().find(|r| r.len() != width) {
            return Err(format!("coefficient row has {} weights, model declares {width} features", bad.len()));
        }
        if a.coefficients.iter().flatten().chain(&a.intercepts).any(|w| !w.is_finite()) {
            return Err("non-finite weight".into());
        }
        Ok(Self {
            version: a.version,
            schema: FeatureSchema::new(a.feature_names),
            classes: a.classes,
            coefficients: a.coefficients,
            intercepts: a.intercepts,
        })
    }

    fn score_row(&self, row: &FeatureRow) -> ServeResult<Vec<f64>> {
        if row.len() != self.schema.width() {
            return Err(ServeError::PredictionFailure(format!(
                "row has {} features, model expects {}", row.len(), self.schema.width()
            )));
        }
        let mut logits: Vec<f64> = self
            .coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(w, b)| w.iter().zip(row.values()).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect();
        let probs = if self.classes.len() == 2 {
            let p = sigmoid(logits[0]);
            vec![1.0 - p, p]
        } else {
            softmax(&mut logits);
            logits
        };
        if probs.iter().any(|p| !p.is_finite()) {
            return Err(ServeError::PredictionFailure("non-finite probability".into()));
        }
        Ok(probs)
    }
}

impl Classifier for LogisticModel {
    fn version(&self) -> &str { &self.version }
    fn schema(&self) -> &FeatureSchema { &self.schema }
    fn classes(&self) -> &[i64] { &self.classes }

    fn predict_proba(&self, rows: &[FeatureRow]) -> ServeResult<Vec<Vec<f64>>> {
        if rows.len() >= PARALLEL_THRESHOLD {
            rows.par_iter().map(|r| self.score_row(r)).collect()
        } else {
            rows.iter().map(|r| self.score_row(r)).collect()
        }
    }
}

#[derive(Clone)]
enum ModelState {
    Ready(Arc<dyn Classifier>),
    Unavailable(String),
}

/// Startup-constructed handle; either ready or carrying the load diagnostic.
#[derive(Clone)]
pub struct ModelHandle {
    state: ModelState,
}

impl ModelHandle {
    pub fn load(path: &Path, expected_sha256: Option<&str>) -> Self {
        match LogisticModel::load(path, expected_sha256) {
            Ok(m) => {
                info!(path = %path.display(), version = m.version(), "model loaded");
                Self::ready(Arc::new(m))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "model load failed - serving degraded");
                Self::unavailable(e.to_string())
            }
        }
    }

    pub fn ready(classifier: Arc<dyn Classifier>) -> Self { Self { state: ModelState::Ready(classifier) } }

    pub fn unavailable(reason: impl Into<String>) -> Self { Self { state: ModelState::Unavailable(reason.into()) } }

    pub fn is_usable(&self) -> bool { matches!(self.state, ModelState::Ready(_)) }

    pub fn classifier(&self) -> ServeResult<&Arc<dyn Classifier>> {
        match &self.state {
            ModelState::Ready(c) => Ok(c),
            ModelState::Unavailable(reason) => Err(ServeError::ModelUnavailable(reason.clone())),
        }
    }

    pub fn version(&self) -> Option<&str> { self.classifier().ok().map(|c| c.version()) }

    pub fn predict(&self, rows: &[FeatureRow]) -> ServeResult<Vec<i64>> { self.classifier()?.predict(rows) }

    pub fn predict_proba(&self, rows: &[FeatureRow]) -> ServeResult<Vec<Vec<f64>>> { self.classifier()?.predict_proba(rows) }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            ModelState::Ready(c) => f.debug_struct("ModelHandle").field("version", &c.version()).finish(),
            ModelState::Unavailable(r) => f.debug_struct("ModelHandle").field("unavailable", r).finish(),
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 { 1.0 / (1.0 + (-z).exp()) } else { let e = z.exp(); e / (1.0 + e) }
}

fn softmax(v: &mut [f64]) {
    if v.is_empty() { return; }
    let max = v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for x in v.iter_mut() { *x = (*x - max).exp(); sum += *x; }
    if sum > 0.0 { for x in v.iter_mut() { *x /= sum; } }
}

/// First index of the maximum; ties resolve to the lowest class index.
pub fn argmax(v: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &p) in v.iter().enumerate() {
        if best.map_or(true, |(_, b)| p > b) { best = Some((i, p)); }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn baseline() -> LogisticModel {
        LogisticModel::from_artifact(ModelArtifact {
            version: "test-v1".into(),
            feature_names: vec!["x1".into(), "x2".into()],
            classes: vec![0, 1],
            coefficients: vec![vec![0.739057798632823, 0.739057798632823]],
            intercepts: vec![-5.912462389062584],
        })
        .unwrap()
    }

    fn rows(v: &[[f64; 2]]) -> Vec<FeatureRow> { v.iter().map(|r| FeatureRow::new(r.to_vec())).collect() }

    #[test]
    fn binary_probabilities() {
        let m = baseline();
        let p = m.predict_proba(&rows(&[[1.0, 2.0], [5.0, 6.0]])).unwrap();
        assert!((p[0][1] - 0.024238).abs() < 1e-5);
        assert!((p[1][1] - 0.901781).abs() < 1e-5);
        assert!((p[0][0] + p[0][1] - 1.0).abs() < 1e-12);
        assert_eq!(m.predict(&rows(&[[1.0, 2.0], [5.0, 6.0]])).unwrap(), vec![0, 1]);
    }

    #[test]
    fn multinomial_softmax() {
        let m = LogisticModel::from_artifact(ModelArtifact {
            version: "mc".into(),
            feature_names: vec!["x1".into()],
            classes: vec![3, 5, 7],
            coefficients: vec![vec![1.0], vec![0.0], vec![-1.0]],
            intercepts: vec![0.0, 0.0, 0.0],
        })
        .unwrap();
        let p = m.predict_proba(&[FeatureRow::new(vec![2.0])]).unwrap();
        assert!((p[0].iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(m.predict(&[FeatureRow::new(vec![2.0]), FeatureRow::new(vec![-2.0])]).unwrap(), vec![3, 7]);
    }

    #[test]
    fn wrong_width_is_prediction_failure() {
        let err = baseline().predict_proba(&[FeatureRow::new(vec![1.0])]).unwrap_err();
        assert!(matches!(err, ServeError::PredictionFailure(_)));
    }

    #[test]
    fn parallel_path_preserves_order() {
        let m = baseline();
        let big: Vec<FeatureRow> = (0..PARALLEL_THRESHOLD * 2)
            .map(|i| FeatureRow::new(vec![(i % 13) as f64, (i % 7) as f64]))
            .collect();
        let bulk = m.predict_proba(&big).unwrap();
        for (row, probs) in big.iter().zip(&bulk) {
            assert_eq!(&m.score_row(row).unwrap(), probs);
        }
    }

    #[test]
    fn load_missing_is_not_found() {
        let err = LogisticModel::load(Path::new("definitely/missing/model.json"), None).unwrap_err();
        assert!(matches!(err, ServeError::NotFound { .. }));
    }

    #[test]
    fn load_garbage_is_corrupt() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"\x80\x04not-json").unwrap();
        assert!(matches!(LogisticModel::load(f.path(), None), Err(ServeError::Corrupt { .. })));
    }

    #[test]
    fn load_inconsistent_is_corrupt() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        let body = r#"{"version":"v","feature_names":["x1","x2"],"classes":[0,1],"coefficients":[[1.0]],"intercepts":[0.0]}"#;
        f.write_all(body.as_bytes()).unwrap();
        let err = LogisticModel::load(f.path(), None).unwrap_err();
        assert!(err.to_string().contains("declares 2 features"), "{err}");
    }

    #[test]
    fn sha_pin() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        let body = serde_json::to_vec(&ModelArtifact {
            version: "pinned".into(),
            feature_names: vec!["x1".into()],
            classes: vec![0, 1],
            coefficients: vec![vec![1.0]],
            intercepts: vec![0.0],
        })
        .unwrap();
        f.write_all(&body).unwrap();
        let digest = hex::encode(Sha256::digest(&body));
        assert!(LogisticModel::load(f.path(), Some(&digest.to_uppercase())).is_ok());
        assert!(matches!(LogisticModel::load(f.path(), Some("00ff")), Err(ServeError::Corrupt { .. })));
    }

    #[test]
    fn degraded_handle_fails_fast() {
        let h = ModelHandle::load(Path::new("no/such/model.json"), None);
        assert!(!h.is_usable());
        assert!(h.version().is_none());
        let err = h.predict(&rows(&[[1.0, 2.0]])).unwrap_err();
        assert!(matches!(err, ServeError::ModelUnavailable(ref m) if m.contains("no/such/model.json")));
    }

    #[test]
    fn ready_handle_delegates() {
        let h = ModelHandle::ready(Arc::new(baseline()));
        assert_eq!(h.version(), Some("test-v1"));
        assert_eq!(h.predict(&rows(&[[6.0, 7.0]])).unwrap(), vec![1]);
    }

    #[test]
    fn argmax_ties_pick_lowest() {
        assert_eq!(argmax(&[0.5, 0.5]), Some(0));
        assert_eq!(argmax(&[]), None);
    }
}
