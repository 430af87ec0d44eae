//! Property-based checks over the whole engine: conservation and ordering
//! must hold for any pool size, input length, and cut pattern.

use millrace_runtime::{Engine, EngineConfig, Event, MemorySource, ProcessRegistry, ProcessSpec};
use proptest::prelude::*;

fn run(events: u64, workers: usize, cut_every: Option<u64>, ordered: bool) -> (Vec<u64>, u64, u64) {
    let mut chain = vec![ProcessSpec::new("scale")
        .with_param("field", "x")
        .with_param("factor", 2.0)];
    if let Some(every) = cut_every {
        chain.insert(
            0,
            ProcessSpec::new("modulo_cut").with_param("every", every as i64),
        );
    }
    let mut config = EngineConfig::default().with_chain(chain).with_workers(workers);
    if !ordered {
        config.ordered = false;
    }
    let source = MemorySource::new(
        (0..events)
            .map(|i| Event::new("Sample").with_field("x", i as f64))
            .collect(),
    );
    let mut engine = Engine::new(config, ProcessRegistry::with_builtins(), Box::new(source))
        .expect("engine construction");
    let summary = engine.run().expect("run");
    let ids = engine
        .output_table()
        .expect("table")
        .rows()
        .iter()
        .map(|r| r.event.id)
        .collect();
    (ids, summary.events_processed, summary.events_cut)
}

fn survivors(events: u64, cut_every: Option<u64>) -> Vec<u64> {
    (0..events)
        .filter(|id| match cut_every {
            Some(every) => (id + 1) % every != 0,
            None => true,
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Ordered output is exactly the survivor list, in input order.
    #[test]
    fn prop_ordered_output_is_survivor_list(
        events in 0u64..300,
        workers in 1usize..8,
        every in prop::option::of(2u64..7),
    ) {
        let (ids, processed, cut) = run(events, workers, every, true);
        let expected = survivors(events, every);
        prop_assert_eq!(processed, events);
        prop_assert_eq!(cut as usize, events as usize - expected.len());
        prop_assert_eq!(ids, expected);
    }

    /// Unordered output is the same multiset of survivors.
    #[test]
    fn prop_unordered_output_is_survivor_multiset(
        events in 0u64..300,
        workers in 1usize..8,
        every in prop::option::of(2u64..7),
    ) {
        let (mut ids, processed, _) = run(events, workers, every, false);
        ids.sort_unstable();
        prop_assert_eq!(processed, events);
        prop_assert_eq!(ids, survivors(events, every));
    }
}
