//! Pause, resume, and stop against a live pool.

use millrace_runtime::{
    Engine, EngineConfig, Event, MemorySource, ParamMap, Process, ProcessRegistry, ProcessSpec,
    RunPhase,
};
use std::thread;
use std::time::Duration;

/// Passes events through after a short sleep, slowing the run enough for
/// control calls to land mid-flight.
struct Throttle {
    delay: Duration,
}

impl Process for Throttle {
    fn name(&self) -> &str {
        "throttle"
    }
    fn process_event(&mut self, event: Event) -> Option<Event> {
        thread::sleep(self.delay);
        Some(event)
    }
}

fn slow_engine(events: u64, workers: usize, delay_us: u64) -> Engine {
    let mut registry = ProcessRegistry::with_builtins();
    registry.register("throttle", move |_: &ParamMap| {
        Ok(Box::new(Throttle {
            delay: Duration::from_micros(delay_us),
        }) as _)
    });
    let config = EngineConfig::default()
        .with_chain(vec![
            ProcessSpec::new("throttle"),
            ProcessSpec::new("set_field")
                .with_param("field", "x")
                .with_param("value", 1.0),
        ])
        .with_workers(workers);
    let source = MemorySource::new((0..events).map(|_| Event::new("Sample")).collect());
    Engine::new(config, registry, Box::new(source)).expect("engine")
}

#[test]
fn test_pause_parks_every_worker_and_freezes_dispatch() {
    let mut engine = slow_engine(20_000, 4, 100);
    engine.start().expect("start");
    thread::sleep(Duration::from_millis(50));

    engine.pause().expect("pause");
    let status = engine.status();
    assert_eq!(status.phase, RunPhase::Paused);
    assert_eq!(status.paused_workers, 4);

    // No dispatch while paused: the counter must hold still.
    let before = engine.processed_events();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(engine.processed_events(), before);

    engine.resume().expect("resume");
    assert_eq!(engine.status().phase, RunPhase::Running);
    thread::sleep(Duration::from_millis(50));
    assert!(engine.processed_events() > before, "dispatch did not resume");

    engine.stop().expect("stop");
    engine.join().expect("join");
}

#[test]
fn test_stop_drains_in_flight_events() {
    let mut engine = slow_engine(50_000, 4, 50);
    engine.start().expect("start");
    thread::sleep(Duration::from_millis(40));
    engine.stop().expect("stop");
    let summary = engine.join().expect("join");

    // Cancelled well before exhaustion, but everything dispatched was
    // finished and committed: stop cancels, it does not discard.
    assert!(summary.events_processed < 50_000);
    assert_eq!(summary.rows_committed, summary.events_processed);

    let table = engine.output_table().expect("table");
    for (i, row) in table.rows().iter().enumerate() {
        assert_eq!(row.seq, i as u64);
    }
}

#[test]
fn test_stop_while_paused_still_drains() {
    let mut engine = slow_engine(20_000, 2, 100);
    engine.start().expect("start");
    thread::sleep(Duration::from_millis(30));
    engine.pause().expect("pause");
    engine.stop().expect("stop");
    let summary = engine.join().expect("join");
    assert!(summary.events_processed < 20_000);
    assert_eq!(summary.rows_committed, summary.events_processed);
    assert_eq!(engine.status().phase, RunPhase::Finished);
}

#[test]
fn test_pause_resume_does_not_lose_or_duplicate_rows() {
    let mut engine = slow_engine(400, 4, 50);
    engine.start().expect("start");
    thread::sleep(Duration::from_millis(5));
    engine.pause().expect("pause");
    engine.resume().expect("resume");
    let summary = engine.join().expect("join");

    assert_eq!(summary.events_processed, 400);
    assert_eq!(summary.rows_committed, 400);
    let table = engine.output_table().expect("table");
    let seqs: Vec<u64> = table.rows().iter().map(|r| r.seq).collect();
    let expected: Vec<u64> = (0..400).collect();
    assert_eq!(seqs, expected);
}

#[test]
fn test_progress_reaches_one_on_completion() {
    let mut engine = slow_engine(200, 2, 20);
    assert_eq!(engine.progress(), Some(0.0));
    engine.start().expect("start");
    engine.join().expect("join");
    assert_eq!(engine.progress(), Some(1.0));
    assert_eq!(engine.status().expected_events, Some(200));
}
