//! Named numeric feature rows and the validation that produces them.

use crate::error::{ServeError, ServeResult};
use serde_json::Value;

/// Ordered feature values; positions follow the owning [`FeatureSchema`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow(Vec<f64>);

impl FeatureRow {
    pub fn new(values: Vec<f64>) -> Self { Self(values) }
    pub fn values(&self) -> &[f64] { &self.0 }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { names: names.into_iter().map(Into::into).collect() }
    }

    pub fn names(&self) -> &[String] { &self.names }
    pub fn width(&self) -> usize { self.names.len() }

    /// Validate a JSON request body. Extra keys are ignored.
    pub fn parse_json(&self, body: &Value) -> ServeResult<FeatureRow> {
        let obj = body
            .as_object()
            .ok_or_else(|| ServeError::Validation("request body must be a JSON object".into()))?;
        let mut values = Vec::with_capacity(self.names.len());
        for name in &self.names {
            let raw = obj
                .get(name)
                .ok_or_else(|| ServeError::Validation(format!("field '{name}' is required")))?;
            let v = match raw {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => parse_number(s),
                _ => None,
            };
            match v {
                Some(v) if v.is_finite() => values.push(v),
                _ => return Err(ServeError::Validation(format!("field '{name}' must be a number, got {raw}"))),
            }
        }
        Ok(FeatureRow(values))
    }

    /// Validate one CSV record. `columns[i]` is the header index of `names[i]`;
    /// `row` is the 1-based data row number used in diagnostics.
    pub fn parse_cells(&self, columns: &[usize], cells: &[String], row: usize) -> ServeResult<FeatureRow> {
        let mut values = Vec::with_capacity(columns.len());
        for (name, &idx) in self.names.iter().zip(columns) {
            let cell = cells.get(idx).map(String::as_str).unwrap_or("");
            match parse_number(cell) {
                Some(v) if v.is_finite() => values.push(v),
                _ => {
                    return Err(ServeError::Validation(format!(
                        "row {row}: column '{name}' value '{cell}' is not a number"
                    )))
                }
            }
        }
        Ok(FeatureRow(values))
    }
}

fn parse_number(s: &str) -> Option<f64> { s.trim().parse::<f64>().ok() }
