use anyhow::Result;
use batch_runner::{
    BatchOptions, BatchReport, BatchRunner, DEFAULT_INPUT, DEFAULT_LABEL_COLUMN, DEFAULT_OUTPUT, SERVICE_NAME,
};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use serve_core::{init_tracing, load_config};
use std::path::PathBuf;
use std::process::ExitCode;

/// Apply the serving model to every row of a CSV file.
///
/// Input and output may be given positionally or with --input/--output.
/// Positionals fill whichever of the two slots no flag has claimed, in order.
#[derive(Debug, Parser)]
#[command(name = "batch-runner", version)]
struct Cli {
    /// [INPUT_CSV] [OUTPUT_CSV], alternatives to --input and --output
    #[arg(value_name = "CSV", num_args = 0..=2)]
    paths: Vec<PathBuf>,

    /// Model artifact; defaults to the configured model_path
    #[arg(long)]
    model: Option<PathBuf>,

    #[arg(long)]
    input: Option<PathBuf>,

    #[arg(long)]
    output: Option<PathBuf>,

    /// Column holding ground-truth labels, copied to `actual` when present
    #[arg(long, default_value = DEFAULT_LABEL_COLUMN)]
    label_column: String,
}

impl Cli {
    /// Resolve (input, output) from flags and positionals. A positional left
    /// over once both slots are taken is a usage error.
    fn io_paths(&self) -> Result<(PathBuf, PathBuf), clap::Error> {
        let mut positional = self.paths.iter().cloned();
        let input = match &self.input {
            Some(p) => Some(p.clone()),
            None => positional.next(),
        };
        let output = match &self.output {
            Some(p) => Some(p.clone()),
            None => positional.next(),
        };
        if let Some(extra) = positional.next() {
            return Err(Cli::command().error(
                ErrorKind::ArgumentConflict,
                format!("'{}' given positionally but --input and --output are both set", extra.display()),
            ));
        }
        Ok((
            input.unwrap_or_else(|| DEFAULT_INPUT.into()),
            output.unwrap_or_else(|| DEFAULT_OUTPUT.into()),
        ))
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let (input_path, output_path) = cli.io_paths().unwrap_or_else(|e| e.exit());
    match run(cli, input_path, output_path) {
        Ok(report) => {
            println!("Scored {} rows in {:.3}s ({:.1} rows/s)", report.rows, report.elapsed.as_secs_f64(), report.throughput);
            println!("Predictions saved to {}", report.output_path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, input_path: PathBuf, output_path: PathBuf) -> Result<BatchReport> {
    let cfg = load_config(SERVICE_NAME)?;
    init_tracing(&cfg.service_name, &cfg.log_level)?;

    let opts = BatchOptions {
        model_path: cli.model.unwrap_or(cfg.model_path),
        model_sha256: cfg.model_sha256,
        input_path,
        output_path,
        label_column: cli.label_column,
    };
    let mut runner = BatchRunner::new();
    Ok(runner.run(&opts)?)
}
