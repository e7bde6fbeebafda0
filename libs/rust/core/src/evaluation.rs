//! Classification metrics over aligned (actual, predicted) label columns.
//!
//! Precision, recall and F1 are support-weighted averages across classes.
//! A class with an empty denominator scores 0 rather than NaN.

use crate::error::{ServeError, ServeResult};
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const ACTUAL_COLUMN: &str = "actual";
pub const PREDICTED_COLUMN: &str = "predicted";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

#[derive(Default)]
struct ClassTally { tp: u64, fp: u64, fn_: u64, support: u64 }

pub fn evaluate<A, P>(actual: &[A], predicted: &[P]) -> ServeResult<MetricsSnapshot>
where
    A: AsRef<str>,
    P: AsRef<str>,
{
    if actual.len() != predicted.len() {
        return Err(ServeError::Schema(format!(
            "label columns differ in length: {} actual vs {} predicted", actual.len(), predicted.len()
        )));
    }
    if actual.is_empty() {
        return Err(ServeError::EmptyInput("no labels to evaluate".into()));
    }

    let mut tallies: BTreeMap<String, ClassTally> = BTreeMap::new();
    let mut correct = 0u64;
    for (a, p) in actual.iter().zip(predicted) {
        let a = normalize_label(a.as_ref());
        let p = normalize_label(p.as_ref());
        if a == p {
            correct += 1;
            let t = tallies.entry(a).or_default();
            t.tp += 1;
            t.support += 1;
        } else {
            let t = tallies.entry(a).or_default();
            t.fn_ += 1;
            t.support += 1;
            tallies.entry(p).or_default().fp += 1;
        }
    }

    let n = actual.len() as f64;
    let (mut precision, mut recall, mut f1) = (0.0, 0.0, 0.0);
    for t in tallies.values() {
        let p = ratio(t.tp, t.tp + t.fp);
        let r = ratio(t.tp, t.tp + t.fn_);
        let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };
        let w = t.support as f64 / n;
        precision += p * w;
        recall += r * w;
        f1 += f * w;
    }

    Ok(MetricsSnapshot { accuracy: correct as f64 / n, precision, recall, f1_score: f1 })
}

/// Load a predictions table and evaluate its `actual`/`predicted` columns.
pub fn evaluate_file(path: &Path) -> ServeResult<MetricsSnapshot> {
    let table = Table::read(path, "predictions file")?;
    let idx = table.require_columns(&[ACTUAL_COLUMN, PREDICTED_COLUMN]).map_err(|_| {
        ServeError::Schema(format!("predictions file must contain '{ACTUAL_COLUMN}' and '{PREDICTED_COLUMN}' columns"))
    })?;
    if table.is_empty() {
        return Err(ServeError::EmptyInput(format!("predictions file at {} has no rows", path.display())));
    }
    let actual: Vec<&str> = table.column(idx[0]).collect();
    let predicted: Vec<&str> = table.column(idx[1]).collect();
    evaluate(&actual, &predicted)
}

fn ratio(num: u64, den: u64) -> f64 { if den == 0 { 0.0 } else { num as f64 / den as f64 } }

/// Integral numbers compare by value, so "1", "1.0" and " 1 " are one class.
fn normalize_label(raw: &str) -> String {
    let s = raw.trim();
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v as i64),
        _ => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool { (a - b).abs() < 1e-9 }

    #[test]
    fn binary_reference_values() {
        let m = evaluate(&["1", "0", "1", "1"], &["1", "0", "0", "1"]).unwrap();
        assert!(close(m.accuracy, 0.75));
        assert!(close(m.precision, 0.875));
        assert!(close(m.recall, 0.75));
        assert!(close(m.f1_score, (2.0 / 3.0 + 3.0 * 0.8) / 4.0));
    }

    #[test]
    fn predicted_only_class_scores_zero_not_nan() {
        // class "2" is never actual; its precision is 0 and its weight is 0
        let m = evaluate(&["0", "0"], &["0", "2"]).unwrap();
        assert!(close(m.accuracy, 0.5));
        assert!(close(m.precision, 1.0));
        assert!(close(m.recall, 0.5));
        assert!(m.f1_score.is_finite());
    }

    #[test]
    fn never_predicted_class_zero_precision() {
        let m = evaluate(&["a", "b", "b"], &["b", "b", "b"]).unwrap();
        // class a: p=0 (no predictions), r=0; class b: p=2/3, r=1
        assert!(close(m.precision, (2.0 / 3.0) * (2.0 / 3.0)));
        assert!(close(m.recall, 2.0 / 3.0));
        for v in [m.accuracy, m.precision, m.recall, m.f1_score] { assert!((0.0..=1.0).contains(&v)); }
    }

    #[test]
    fn numeric_labels_normalised() {
        let m = evaluate(&["1.0", " 0"], &["1", "0.0"]).unwrap();
        assert!(close(m.accuracy, 1.0));
        assert!(close(m.f1_score, 1.0));
    }

    #[test]
    fn empty_and_misaligned() {
        let none: [&str; 0] = [];
        assert!(matches!(evaluate(&none, &none), Err(ServeError::EmptyInput(_))));
        assert!(matches!(evaluate(&["1"], &["1", "0"]), Err(ServeError::Schema(_))));
    }

    #[test]
    fn file_checks_run_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, body: &str| {
            let p = dir.path().join(name);
            std::fs::write(&p, body).unwrap();
            p
        };
        assert!(matches!(evaluate_file(&dir.path().join("absent.csv")), Err(ServeError::NotFound { .. })));
        assert!(matches!(evaluate_file(&write("empty.csv", "")), Err(ServeError::EmptyInput(_))));
        let err = evaluate_file(&write("no_actual.csv", "predicted,label\n1,1\n")).unwrap_err();
        assert!(matches!(err, ServeError::Schema(_)));
        assert_eq!(err.to_string(), "predictions file must contain 'actual' and 'predicted' columns");
        assert!(matches!(evaluate_file(&write("header.csv", "actual,predicted\n")), Err(ServeError::EmptyInput(_))));
        let m = evaluate_file(&write("ok.csv", "actual,predicted\n1,1\n0,1\n")).unwrap();
        assert!(close(m.accuracy, 0.5));
    }
}
