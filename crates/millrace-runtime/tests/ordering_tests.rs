//! Ordered-mode guarantees under contention: rows come out in strictly
//! increasing sequence order regardless of pool size or cuts.

use millrace_runtime::{Engine, EngineConfig, Event, MemorySource, ProcessRegistry, ProcessSpec};

fn source(n: u64) -> Box<MemorySource> {
    Box::new(MemorySource::new(
        (0..n)
            .map(|i| Event::new("Sample").with_field("x", i as f64))
            .collect(),
    ))
}

#[test]
fn test_ordered_output_strictly_increasing_under_pool_eight() {
    let config = EngineConfig::default()
        .with_chain(vec![ProcessSpec::new("scale")
            .with_param("field", "x")
            .with_param("factor", 1.0)])
        .with_workers(8);
    let mut engine =
        Engine::new(config, ProcessRegistry::with_builtins(), source(2000)).expect("engine");
    engine.run().expect("run");

    let table = engine.output_table().expect("table");
    assert_eq!(table.len(), 2000);
    for pair in table.rows().windows(2) {
        assert!(pair[0].seq < pair[1].seq, "sequence order violated");
    }
    assert_eq!(table.rows()[0].seq, 0);
    assert_eq!(table.rows()[1999].seq, 1999);
}

#[test]
fn test_ordered_output_with_cuts_keeps_survivor_order() {
    let config = EngineConfig::default()
        .with_chain(vec![ProcessSpec::new("modulo_cut").with_param("every", 3i64)])
        .with_workers(8);
    let mut engine =
        Engine::new(config, ProcessRegistry::with_builtins(), source(2000)).expect("engine");
    let summary = engine.run().expect("run");

    let expected: Vec<u64> = (0..2000).filter(|id| (id + 1) % 3 != 0).collect();
    let table = engine.output_table().expect("table");
    let ids: Vec<u64> = table.rows().iter().map(|r| r.event.id).collect();
    assert_eq!(ids, expected);
    assert_eq!(summary.events_cut, 2000 - expected.len() as u64);
}

#[test]
fn test_tight_reorder_bound_still_orders() {
    // A two-slot buffer forces workers to run in near lockstep; the output
    // contract must not change.
    let mut config = EngineConfig::default()
        .with_chain(vec![ProcessSpec::new("scale")
            .with_param("field", "x")
            .with_param("factor", 1.0)])
        .with_workers(4);
    config.max_reorder_lag = 2;
    let mut engine =
        Engine::new(config, ProcessRegistry::with_builtins(), source(500)).expect("engine");
    let summary = engine.run().expect("run");

    assert_eq!(summary.rows_committed, 500);
    assert!(summary.reorder_high_water <= 2);
    let table = engine.output_table().expect("table");
    for (i, row) in table.rows().iter().enumerate() {
        assert_eq!(row.seq, i as u64);
    }
}

#[test]
fn test_output_event_stream_matches_table_order() {
    let config = EngineConfig::default()
        .with_chain(vec![ProcessSpec::new("modulo_cut").with_param("every", 5i64)])
        .with_workers(3);
    let mut engine =
        Engine::new(config, ProcessRegistry::with_builtins(), source(100)).expect("engine");
    engine.run().expect("run");

    let from_stream: Vec<u64> = engine
        .output_events()
        .expect("stream")
        .map(|ev| ev.id)
        .collect();
    let from_table: Vec<u64> = engine
        .output_table()
        .expect("table")
        .rows()
        .iter()
        .map(|r| r.event.id)
        .collect();
    assert_eq!(from_stream, from_table);
}
