//! Process chain construction, validation, and the pre-flight probe

use crate::error::EngineError;
use crate::event::{Event, DEFAULT_EVENT_TYPE};
use crate::process::{Process, ProcessRegistry, ProcessSpec};
use millrace_core::limits::MAX_PROBE_TRIALS;
use millrace_core::{Schema, ValueKind};
use tracing::{debug, trace};

/// Result of a successful pre-flight probe.
#[derive(Debug)]
pub struct ProbeOutcome {
    /// Observable schema discovered from the stabilized output, still in the
    /// Learning state (new names may appear during the run until the first
    /// row commits).
    pub schema: Schema,
    /// Trials consumed before the output stabilized.
    pub trials: usize,
}

/// One ordered sequence of constructed stages.
///
/// Each worker builds its own chain through the registry, so no stage
/// instance is ever shared between threads.
#[derive(Debug)]
pub struct Chain {
    stages: Vec<Box<dyn Process>>,
}

impl Chain {
    /// Build and validate a chain from its configured specs.
    pub fn build(registry: &ProcessRegistry, specs: &[ProcessSpec]) -> Result<Self, EngineError> {
        if specs.is_empty() {
            return Err(EngineError::EmptyChain);
        }
        let mut stages = Vec::with_capacity(specs.len());
        for spec in specs {
            stages.push(registry.build(spec)?);
        }
        validate_types(&stages)?;
        Ok(Self { stages })
    }

    /// Run every stage's `init` hook, in chain order.
    pub fn init(&mut self) -> Result<(), EngineError> {
        for stage in &mut self.stages {
            stage.init()?;
        }
        Ok(())
    }

    /// Run every stage's `end` hook, in chain order.
    pub fn end(&mut self) {
        for stage in &mut self.stages {
            stage.end();
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// True if any stage demands the whole pool collapse to one worker.
    pub fn single_worker_only(&self) -> bool {
        self.stages.iter().any(|s| s.single_worker_only())
    }

    /// Event type fed to the probe: the first explicit expectation upstream
    /// of any retype, else the default type.
    fn probe_input_type(&self) -> &str {
        for stage in &self.stages {
            if let Some(t) = stage.input_type() {
                return t;
            }
            if stage.output_type().is_some() {
                break;
            }
        }
        DEFAULT_EVENT_TYPE
    }

    /// Run one event through the chain. `None` means some stage cut it.
    pub fn run_event(&mut self, event: Event) -> Option<Event> {
        let mut current = event;
        for stage in &mut self.stages {
            current = stage.process_event(current)?;
        }
        Some(current)
    }

    /// Pre-flight probe: feed bounded synthetic trial events through the
    /// chain until its output is non-null and its observable shape stops
    /// changing between consecutive successful trials.
    ///
    /// Never consumes from the source gate. A chain that produces no output
    /// in any trial can never produce a row, which is a fatal configuration
    /// error. If the bound is reached with at least one successful trial the
    /// last shape seeds the schema; learning continues during the run.
    pub fn probe(&mut self) -> Result<ProbeOutcome, EngineError> {
        let input_type = self.probe_input_type().to_string();
        let mut last_shape: Option<Vec<(String, ValueKind)>> = None;

        for trial in 0..MAX_PROBE_TRIALS {
            let event = Event::new(input_type.as_str()).with_id(trial as u64);
            let Some(output) = self.run_event(event) else {
                trace!(trial, "probe trial produced no output");
                continue;
            };

            let shape: Vec<(String, ValueKind)> = output
                .data
                .iter()
                .filter_map(|(name, value)| value.kind().map(|k| (name.clone(), k)))
                .collect();

            if last_shape.as_ref() == Some(&shape) {
                debug!(trials = trial + 1, observables = shape.len(), "probe stabilized");
                return Ok(ProbeOutcome {
                    schema: shape_schema(&shape),
                    trials: trial + 1,
                });
            }
            last_shape = Some(shape);
        }

        match last_shape {
            Some(shape) => {
                debug!(
                    trials = MAX_PROBE_TRIALS,
                    observables = shape.len(),
                    "probe bound reached; seeding from last output"
                );
                Ok(ProbeOutcome {
                    schema: shape_schema(&shape),
                    trials: MAX_PROBE_TRIALS,
                })
            }
            None => Err(EngineError::ProbeFailed {
                trials: MAX_PROBE_TRIALS,
            }),
        }
    }
}

fn shape_schema(shape: &[(String, ValueKind)]) -> Schema {
    let mut schema = Schema::new();
    for (name, kind) in shape {
        // Duplicate names cannot occur: the shape came from one field map.
        let _ = schema.observe(name, *kind);
    }
    schema
}

/// Check event-type compatibility between consecutive stages: each stage's
/// declared input must match what upstream emits, where `None` on either
/// side is the "any event" wildcard.
fn validate_types(stages: &[Box<dyn Process>]) -> Result<(), EngineError> {
    let mut current: Option<&str> = None;
    for (index, stage) in stages.iter().enumerate() {
        if let (Some(expected), Some(found)) = (stage.input_type(), current) {
            if expected != found {
                return Err(EngineError::TypeMismatch {
                    index,
                    stage: stage.name().to_string(),
                    expected: expected.to_string(),
                    found: found.to_string(),
                });
            }
        }
        if let Some(output) = stage.output_type() {
            current = Some(output);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ParamMap;

    fn registry() -> ProcessRegistry {
        ProcessRegistry::with_builtins()
    }

    fn spec(type_name: &str) -> ProcessSpec {
        ProcessSpec::new(type_name)
    }

    #[test]
    fn test_empty_chain_is_an_error() {
        let err = Chain::build(&registry(), &[]).unwrap_err();
        assert!(matches!(err, EngineError::EmptyChain));
    }

    #[test]
    fn test_unknown_stage_fails_build() {
        let err = Chain::build(&registry(), &[spec("warp_drive")]).unwrap_err();
        assert!(matches!(err, EngineError::UnknownProcess(_)));
    }

    #[test]
    fn test_compatible_types_validate() {
        let specs = vec![
            spec("emit_as").with_param("event_type", "Track"),
            spec("expect_type").with_param("event_type", "Track"),
            spec("scale").with_param("field", "x").with_param("factor", 2.0),
        ];
        assert!(Chain::build(&registry(), &specs).is_ok());
    }

    #[test]
    fn test_type_mismatch_fails_validation() {
        let specs = vec![
            spec("emit_as").with_param("event_type", "Track"),
            spec("expect_type").with_param("event_type", "Shower"),
        ];
        let err = Chain::build(&registry(), &specs).unwrap_err();
        match err {
            EngineError::TypeMismatch {
                index,
                expected,
                found,
                ..
            } => {
                assert_eq!(index, 1);
                assert_eq!(expected, "Shower");
                assert_eq!(found, "Track");
            }
            other => panic!("expected type mismatch, got {other}"),
        }
    }

    #[test]
    fn test_leading_expectation_is_wildcarded() {
        // The source's event type is unknown at validation time, so a chain
        // may open with any expectation.
        let specs = vec![spec("expect_type").with_param("event_type", "Hit")];
        assert!(Chain::build(&registry(), &specs).is_ok());
    }

    #[test]
    fn test_single_worker_collapse_detection() {
        let specs = vec![
            spec("scale").with_param("field", "x").with_param("factor", 1.0),
            spec("print"),
        ];
        let chain = Chain::build(&registry(), &specs).unwrap();
        assert!(chain.single_worker_only());
    }

    #[test]
    fn test_run_event_applies_stages_in_order() {
        let specs = vec![
            spec("set_field").with_param("field", "x").with_param("value", 3.0),
            spec("scale").with_param("field", "x").with_param("factor", 2.0),
            spec("shift").with_param("field", "x").with_param("offset", 1.0),
        ];
        let mut chain = Chain::build(&registry(), &specs).unwrap();
        let out = chain.run_event(Event::new("E")).unwrap();
        assert_eq!(out.get_float("x"), Some(7.0));
    }

    #[test]
    fn test_probe_discovers_schema() {
        let specs = vec![
            spec("set_field").with_param("field", "x").with_param("value", 1.5),
            spec("set_field").with_param("field", "n").with_param("value", 2i64),
        ];
        let mut chain = Chain::build(&registry(), &specs).unwrap();
        let outcome = chain.probe().unwrap();
        assert_eq!(outcome.trials, 2);
        let names: Vec<_> = outcome.schema.names().collect();
        assert_eq!(names, vec!["x", "n"]);
        assert_eq!(outcome.schema.kind_of("x"), Some(ValueKind::Float));
        assert_eq!(outcome.schema.kind_of("n"), Some(ValueKind::Int));
    }

    #[test]
    fn test_probe_fails_when_chain_always_cuts() {
        struct NullStage;
        impl Process for NullStage {
            fn name(&self) -> &str {
                "null"
            }
            fn process_event(&mut self, _event: Event) -> Option<Event> {
                None
            }
        }
        let mut reg = registry();
        reg.register("null", |_: &ParamMap| Ok(Box::new(NullStage) as _));
        let mut chain = Chain::build(&reg, &[spec("null")]).unwrap();
        let err = chain.probe().unwrap_err();
        assert!(matches!(err, EngineError::ProbeFailed { trials: MAX_PROBE_TRIALS }));
    }

    #[test]
    fn test_probe_tolerates_warmup() {
        // Output appears only after two swallowed trials, then stabilizes.
        struct Warmup {
            seen: usize,
        }
        impl Process for Warmup {
            fn name(&self) -> &str {
                "warmup"
            }
            fn process_event(&mut self, mut event: Event) -> Option<Event> {
                self.seen += 1;
                if self.seen <= 2 {
                    return None;
                }
                event.set("ready", true);
                Some(event)
            }
        }
        let mut reg = registry();
        reg.register("warmup", |_: &ParamMap| Ok(Box::new(Warmup { seen: 0 }) as _));
        let mut chain = Chain::build(&reg, &[spec("warmup")]).unwrap();
        let outcome = chain.probe().unwrap();
        assert_eq!(outcome.trials, 4);
        assert_eq!(outcome.schema.kind_of("ready"), Some(ValueKind::Bool));
    }

    #[test]
    fn test_probe_uses_declared_input_type() {
        let specs = vec![spec("expect_type").with_param("event_type", "Hit")];
        let chain = Chain::build(&registry(), &specs).unwrap();
        assert_eq!(chain.probe_input_type(), "Hit");

        let specs = vec![
            spec("emit_as").with_param("event_type", "Track"),
            spec("expect_type").with_param("event_type", "Track"),
        ];
        let chain = Chain::build(&registry(), &specs).unwrap();
        // The retype upstream means the Track expectation is not the
        // source's type.
        assert_eq!(chain.probe_input_type(), DEFAULT_EVENT_TYPE);
    }
}
