//! JSONL file sources end to end: parsing shapes, limits, offsets, and
//! feeding a full engine run from disk.

use millrace_runtime::{
    open_input, Engine, EngineConfig, EngineError, EventSource, ProcessRegistry, ProcessSpec,
};
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write test file");
    path
}

#[test]
fn test_structured_and_bare_lines_with_comments() {
    let dir = tempdir().expect("tempdir");
    let path = write_file(
        &dir,
        "events.jsonl",
        r#"# calibration run 12
{"event_type": "Hit", "data": {"x": 1.5, "n": 2}}

{"x": 2.5, "n": 3}
"#,
    );

    let mut source = open_input(&[path]).expect("open");
    let first = source.fetch_next().expect("fetch").expect("first");
    assert_eq!(&*first.event_type, "Hit");
    assert_eq!(first.id, 0);
    assert_eq!(first.get_float("x"), Some(1.5));

    // Bare field maps become default-typed events; blank and comment lines
    // are not entries.
    let second = source.fetch_next().expect("fetch").expect("second");
    assert_eq!(&*second.event_type, "Event");
    assert_eq!(second.id, 1);
    assert_eq!(second.get_int("n"), Some(3));

    assert!(source.fetch_next().expect("fetch").is_none());
}

#[test]
fn test_multiple_files_concatenate_in_order() {
    let dir = tempdir().expect("tempdir");
    let a = write_file(&dir, "a.jsonl", "{\"x\": 0}\n{\"x\": 1}\n");
    let b = write_file(&dir, "b.jsonl", "{\"x\": 2}\n");

    let mut source = open_input(&[a, b]).expect("open");
    let mut ids = Vec::new();
    while let Some(ev) = source.fetch_next().expect("fetch") {
        ids.push((ev.id, ev.get_int("x").unwrap()));
    }
    assert_eq!(ids, vec![(0, 0), (1, 1), (2, 2)]);
}

#[test]
fn test_malformed_line_names_file_and_line() {
    let dir = tempdir().expect("tempdir");
    let path = write_file(&dir, "bad.jsonl", "{\"x\": 1}\n{not json\n");

    let mut source = open_input(&[path]).expect("open");
    assert!(source.fetch_next().expect("fetch").is_some());
    let err = source.fetch_next().expect_err("malformed line");
    match err {
        EngineError::Source(msg) => {
            assert!(msg.contains("bad.jsonl:2"), "unhelpful message: {msg}");
        }
        other => panic!("expected source error, got {other}"),
    }
}

#[test]
fn test_oversized_line_is_refused() {
    let dir = tempdir().expect("tempdir");
    let huge = format!("{{\"s\": \"{}\"}}\n", "a".repeat(1_100_000));
    let path = write_file(&dir, "huge.jsonl", &huge);

    let mut source = open_input(&[path]).expect("open");
    let err = source.fetch_next().expect_err("oversized line");
    assert!(matches!(err, EngineError::Source(msg) if msg.contains("exceeds")));
}

#[test]
fn test_rewind_replays_from_offset() {
    let dir = tempdir().expect("tempdir");
    let path = write_file(&dir, "events.jsonl", "{\"x\": 0}\n{\"x\": 1}\n{\"x\": 2}\n");

    let mut source = open_input(&[path]).expect("open");
    while source.fetch_next().expect("fetch").is_some() {}

    source.rewind(1).expect("rewind");
    let ev = source.fetch_next().expect("fetch").expect("entry 1");
    assert_eq!(ev.id, 1);
    assert_eq!(ev.get_int("x"), Some(1));
}

#[test]
fn test_engine_runs_from_file_source() {
    let dir = tempdir().expect("tempdir");
    let lines: String = (0..100).map(|i| format!("{{\"x\": {i}.0}}\n")).collect();
    let path = write_file(&dir, "run.jsonl", &lines);

    let config = EngineConfig::default()
        .with_chain(vec![ProcessSpec::new("scale")
            .with_param("field", "x")
            .with_param("factor", 3.0)])
        .with_workers(4);
    let source = open_input(&[path]).expect("open");
    let mut engine =
        Engine::new(config, ProcessRegistry::with_builtins(), Box::new(source)).expect("engine");

    let summary = engine.run().expect("run");
    assert_eq!(summary.events_processed, 100);
    assert_eq!(summary.rows_committed, 100);

    let table = engine.output_table().expect("table");
    assert_eq!(table.rows()[10].event.get_float("x"), Some(30.0));

    // File sources cannot cheaply count entries, so progress is unknown.
    assert_eq!(engine.progress(), None);
}

#[test]
fn test_reset_rewinds_file_source_for_identical_rerun() {
    let dir = tempdir().expect("tempdir");
    let lines: String = (0..50).map(|i| format!("{{\"x\": {i}.0}}\n")).collect();
    let path = write_file(&dir, "run.jsonl", &lines);

    let config = EngineConfig::default().with_chain(vec![ProcessSpec::new("scale")
        .with_param("field", "x")
        .with_param("factor", 2.0)]);
    let source = open_input(&[path]).expect("open");
    let mut engine =
        Engine::new(config, ProcessRegistry::with_builtins(), Box::new(source)).expect("engine");

    engine.run().expect("first run");
    let rows_first = engine.output_table().expect("table").rows().to_vec();

    engine.reset().expect("reset");
    engine.run().expect("second run");
    let rows_second = engine.output_table().expect("table").rows().to_vec();
    assert_eq!(rows_first, rows_second);
}
