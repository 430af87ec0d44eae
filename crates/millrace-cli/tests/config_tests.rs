//! Integration tests for run file loading and validation
//!
//! These go through the same path the binary uses: write a run file to
//! disk, load it by extension, and validate the engine settings and the
//! process chain without running anything.

use millrace_cli::config::{OutputFormat, RunFile};
use millrace_cli::validate_run_file;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_run_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write run file");
    path
}

#[test]
fn valid_yaml_run_file_validates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_run_file(
        &dir,
        "run.yaml",
        r#"
inputs:
  - events.jsonl
engine:
  workers: 4
  chain:
    - type: scale
      params: { field: x, factor: 2.0 }
    - type: modulo_cut
      params: { every: 3 }
output:
  format: csv
"#,
    );

    let (run_file, chain, probe) = validate_run_file(&path).expect("run file should validate");
    assert_eq!(run_file.engine.workers, 4);
    assert_eq!(chain.len(), 2);
    assert!(!chain.single_worker_only());
    assert_eq!(run_file.output.format, OutputFormat::Csv);
    // Synthetic probe events carry no fields, so nothing is learned yet.
    assert!(probe.trials >= 2);
}

#[test]
fn toml_run_file_loads_by_extension() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_run_file(
        &dir,
        "run.toml",
        r#"
inputs = ["events.jsonl"]

[engine]
workers = 2

[[engine.chain]]
type = "shift"

[engine.chain.params]
field = "x"
offset = 1.0
"#,
    );

    let (run_file, chain, _) = validate_run_file(&path).expect("run file should validate");
    assert_eq!(run_file.engine.workers, 2);
    assert_eq!(chain.len(), 1);
}

#[test]
fn extensionless_file_falls_back_to_content_detection() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_run_file(
        &dir,
        "runfile",
        r#"
engine:
  chain:
    - type: scale
      params: { field: x, factor: 1.0 }
"#,
    );

    let run_file = RunFile::load(&path).expect("should fall back to YAML");
    assert_eq!(run_file.engine.chain.len(), 1);
}

#[test]
fn unknown_process_type_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_run_file(
        &dir,
        "run.yaml",
        r#"
engine:
  chain:
    - type: frobnicate
"#,
    );

    let err = validate_run_file(&path).expect_err("unknown stage must fail");
    assert!(err.to_string().contains("frobnicate"));
}

#[test]
fn empty_chain_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_run_file(
        &dir,
        "run.yaml",
        r#"
engine:
  workers: 4
"#,
    );

    let err = validate_run_file(&path).expect_err("empty chain must fail");
    assert!(err.to_string().contains("empty"));
}

#[test]
fn missing_required_parameter_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_run_file(
        &dir,
        "run.yaml",
        r#"
engine:
  chain:
    - type: scale
      params: { field: x }
"#,
    );

    let err = validate_run_file(&path).expect_err("scale without factor must fail");
    assert!(err.to_string().contains("scale"));
}

#[test]
fn declared_type_mismatch_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_run_file(
        &dir,
        "run.yaml",
        r#"
engine:
  chain:
    - type: emit_as
      params: { event_type: Calibrated }
    - type: expect_type
      params: { event_type: Raw }
"#,
    );

    let err = validate_run_file(&path).expect_err("type mismatch must fail");
    assert!(err.to_string().contains("Calibrated"));
}

#[test]
fn print_stage_forces_single_worker() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_run_file(
        &dir,
        "run.yaml",
        r#"
engine:
  workers: 8
  chain:
    - type: scale
      params: { field: x, factor: 1.0 }
    - type: print
"#,
    );

    let (_, chain, _) = validate_run_file(&path).expect("run file should validate");
    assert!(chain.single_worker_only());
}

#[test]
fn chain_that_cuts_everything_fails_probe() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_run_file(
        &dir,
        "run.yaml",
        r#"
engine:
  chain:
    - type: modulo_cut
      params: { every: 1 }
"#,
    );

    let err = validate_run_file(&path).expect_err("all-cut chain must fail the probe");
    assert!(err.to_string().contains("probe trials"));
}
