//! Runs the built binary the way operators do and checks exit codes and files.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn shipped_model() -> PathBuf { PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../models/baseline.json") }

fn batch_runner(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_batch-runner"))
        .current_dir(dir)
        .env("MLSERVE__MODEL_PATH", shipped_model())
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("failed to spawn batch-runner")
}

#[test]
fn positional_invocation() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("in.csv"), "x1,x2\n1,2\n5,6\n").unwrap();
    let out = batch_runner(dir.path(), &["in.csv", "out.csv"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Scored 2 rows"), "{stdout}");
    let written = std::fs::read_to_string(dir.path().join("out.csv")).unwrap();
    assert!(written.starts_with("x1,x2,prediction,predicted\n"), "{written}");
    assert_eq!(written.lines().count(), 3);
}

#[test]
fn flagged_invocation_with_labels() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("data.csv"), "x1,x2,y\n1,2,0\n6,7,1\n").unwrap();
    let model = shipped_model();
    let out = batch_runner(
        dir.path(),
        &["--model", model.to_str().unwrap(), "--input", "data.csv", "--output", "preds/p.csv", "--label-column", "y"],
    );
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let written = std::fs::read_to_string(dir.path().join("preds/p.csv")).unwrap();
    assert!(written.starts_with("x1,x2,y,prediction,predicted,actual\n"), "{written}");
}

#[test]
fn malformed_row_exits_nonzero_without_output() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("in.csv"), "x1,x2\nabc,2\n").unwrap();
    let out = batch_runner(dir.path(), &["in.csv", "out.csv"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("error: batch aborted during input loading"), "{stderr}");
    assert!(!dir.path().join("out.csv").exists());
}

#[test]
fn missing_model_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("in.csv"), "x1,x2\n1,2\n").unwrap();
    let out = batch_runner(dir.path(), &["--model", "nowhere.json", "in.csv", "out.csv"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("model file not found at nowhere.json"));
}

#[test]
fn flag_input_with_positional_output() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.csv"), "x1,x2\n1,2\n").unwrap();
    let out = batch_runner(dir.path(), &["--input", "a.csv", "out.csv"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert!(dir.path().join("out.csv").exists());
}

#[test]
fn positional_left_over_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let out = batch_runner(dir.path(), &["--input", "a.csv", "--output", "b.csv", "c.csv"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(!dir.path().join("b.csv").exists());
}
