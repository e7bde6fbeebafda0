//! Batch inference over a CSV of feature rows.
//!
//! Stages run strictly in order and any failure skips the rest:
//!
//! ```text
//! Idle -> ModelLoading -> InputLoading -> Scoring -> OutputWriting -> Done
//!            \______________\______________\______________\-> Aborted
//! ```
//!
//! Every input row is validated before scoring starts and the output is
//! renamed into place only once fully written, so an aborted run never leaves
//! a partial or modified output file.

use serve_core::evaluation::{ACTUAL_COLUMN, PREDICTED_COLUMN};
use serve_core::model::argmax;
use serve_core::{Classifier, FeatureRow, FeatureSchema, LogisticModel, ServeError, ServeResult, Table};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

pub const SERVICE_NAME: &str = "batch-runner";
pub const DEFAULT_INPUT: &str = "data/input.csv";
pub const DEFAULT_OUTPUT: &str = "data/predictions.csv";
pub const DEFAULT_LABEL_COLUMN: &str = "label";
pub const PREDICTION_COLUMN: &str = "prediction";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStage {
    Idle,
    ModelLoading,
    InputLoading,
    Scoring,
    OutputWriting,
    Done,
    Aborted,
}

impl fmt::Display for BatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchStage::Idle => "idle",
            BatchStage::ModelLoading => "model loading",
            BatchStage::InputLoading => "input loading",
            BatchStage::Scoring => "scoring",
            BatchStage::OutputWriting => "output writing",
            BatchStage::Done => "done",
            BatchStage::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub model_path: PathBuf,
    pub model_sha256: Option<String>,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub label_column: String,
}

/// One scored row. `index` is the 0-based data row position.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub index: usize,
    pub label: i64,
    pub probability: Option<f64>,
    pub actual: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub rows: usize,
    pub elapsed: Duration,
    pub throughput: f64,
    pub labelled: bool,
    pub output_path: PathBuf,
}

#[derive(Debug, Error)]
#[error("batch aborted during {stage}: {error}")]
pub struct BatchFailure {
    pub stage: BatchStage,
    pub error: ServeError,
}

/// Rows per second; 0 when no time has elapsed.
pub fn throughput(rows: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 { 0.0 } else { rows as f64 / secs }
}

struct LoadedInput {
    table: Table,
    rows: Vec<FeatureRow>,
    actual: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct BatchRunner {
    stage: BatchStage,
    history: Vec<BatchStage>,
}

impl Default for BatchRunner {
    fn default() -> Self { Self::new() }
}

impl BatchRunner {
    pub fn new() -> Self { Self { stage: BatchStage::Idle, history: Vec::new() } }

    pub fn stage(&self) -> BatchStage { self.stage }

    /// Stages entered so far, in order.
    pub fn history(&self) -> &[BatchStage] { &self.history }

    fn advance(&mut self, next: BatchStage) {
        info!(from = %self.stage, to = %next, "batch stage");
        self.stage = next;
        self.history.push(next);
    }

    fn abort(&mut self, error: ServeError) -> BatchFailure {
        let stage = self.stage;
        warn!(%stage, kind = error.kind(), error = %error, "batch aborted");
        self.stage = BatchStage::Aborted;
        self.history.push(BatchStage::Aborted);
        BatchFailure { stage, error }
    }

    /// Load the model from `opts.model_path`, then score the input.
    pub fn run(&mut self, opts: &BatchOptions) -> Result<BatchReport, BatchFailure> {
        self.advance(BatchStage::ModelLoading);
        let model = LogisticModel::load(&opts.model_path, opts.model_sha256.as_deref()).map_err(|e| self.abort(e))?;
        info!(path = %opts.model_path.display(), version = model.version(), "model loaded");
        self.run_with_model(&model, opts)
    }

    /// Score the input with an already-loaded classifier.
    pub fn run_with_model(&mut self, model: &dyn Classifier, opts: &BatchOptions) -> Result<BatchReport, BatchFailure> {
        let started = Instant::now();

        self.advance(BatchStage::InputLoading);
        let input = load_input(model.schema(), opts).map_err(|e| self.abort(e))?;
        info!(rows = input.rows.len(), columns = input.table.headers().len(), labelled = input.actual.is_some(), "input loaded");

        self.advance(BatchStage::Scoring);
        let results = score_rows(model, &input).map_err(|e| self.abort(e))?;

        self.advance(BatchStage::OutputWriting);
        let output = build_output(&input, &results);
        output.write_atomic(&opts.output_path).map_err(|e| self.abort(e))?;

        self.advance(BatchStage::Done);
        let elapsed = started.elapsed();
        let report = BatchReport {
            rows: results.len(),
            elapsed,
            throughput: throughput(results.len(), elapsed),
            labelled: input.actual.is_some(),
            output_path: opts.output_path.clone(),
        };
        info!(rows = report.rows, elapsed_ms = elapsed.as_secs_f64() * 1000.0, rows_per_sec = report.throughput, "batch complete");
        Ok(report)
    }
}

fn load_input(schema: &FeatureSchema, opts: &BatchOptions) -> ServeResult<LoadedInput> {
    let table = Table::read(&opts.input_path, "input file")?;
    if table.is_empty() {
        return Err(ServeError::EmptyInput(format!("input file at {} has no rows", opts.input_path.display())));
    }
    let columns = table.require_columns(schema.names())?;
    let rows = table
        .rows()
        .iter()
        .enumerate()
        .map(|(i, cells)| schema.parse_cells(&columns, cells, i + 1))
        .collect::<ServeResult<Vec<_>>>()?;
    let actual = table.column_index(&opts.label_column).map(|i| table.column(i).map(str::to_string).collect());
    Ok(LoadedInput { table, rows, actual })
}

fn score_rows(model: &dyn Classifier, input: &LoadedInput) -> ServeResult<Vec<PredictionResult>> {
    let probs = model.predict_proba(&input.rows)?;
    if probs.len() != input.rows.len() {
        return Err(ServeError::PredictionFailure(format!(
            "model returned {} results for {} rows", probs.len(), input.rows.len()
        )));
    }
    let classes = model.classes();
    probs
        .into_iter()
        .enumerate()
        .map(|(index, p)| {
            let label = argmax(&p)
                .and_then(|i| classes.get(i).copied())
                .ok_or_else(|| ServeError::PredictionFailure(format!("row {}: no class probabilities", index + 1)))?;
            Ok(PredictionResult {
                index,
                label,
                probability: p.last().copied(),
                actual: input.actual.as_ref().and_then(|a| a.get(index).cloned()),
            })
        })
        .collect()
}

/// Original columns, minus the ones regenerated here, followed by
/// `prediction`, `predicted` and (when labelled) `actual`. An existing
/// `actual` column is only replaced when the label column is present.
fn build_output(input: &LoadedInput, results: &[PredictionResult]) -> Table {
    let labelled = input.actual.is_some();
    let regenerated = |h: &str| h == PREDICTION_COLUMN || h == PREDICTED_COLUMN || (labelled && h == ACTUAL_COLUMN);
    let keep: Vec<usize> = input
        .table
        .headers()
        .iter()
        .enumerate()
        .filter(|(_, h)| !regenerated(h.as_str()))
        .map(|(i, _)| i)
        .collect();

    let mut headers: Vec<String> = keep.iter().map(|&i| input.table.headers()[i].clone()).collect();
    headers.push(PREDICTION_COLUMN.into());
    headers.push(PREDICTED_COLUMN.into());
    if labelled { headers.push(ACTUAL_COLUMN.into()); }

    let rows = input
        .table
        .rows()
        .iter()
        .zip(results)
        .map(|(cells, r)| {
            let mut out: Vec<String> = keep.iter().map(|&i| cells.get(i).cloned().unwrap_or_default()).collect();
            out.push(r.probability.map(|p| p.to_string()).unwrap_or_default());
            out.push(r.label.to_string());
            if let Some(a) = &r.actual { out.push(a.clone()); }
            out
        })
        .collect();
    Table::new(headers, rows)
}
