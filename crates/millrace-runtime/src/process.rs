//! Process trait and registry
//!
//! A process is one transformation stage in the chain. Stages declare the
//! event type they accept and emit (`None` = any / pass-through), whether
//! they tolerate concurrent clones, and transform events one at a time;
//! returning `None` filters the event out (a cut, not an error).

use crate::error::EngineError;
use millrace_core::{FxIndexMap, Value};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::event::Event;

/// Ordered parameter map from the configuration collaborator.
pub type ParamMap = FxIndexMap<String, Value>;

/// One transformation stage.
///
/// Implementations must be `Send` (each worker owns its clone on its own
/// thread) but never need to be `Sync`: a clone is exclusively owned and no
/// lock is held while it runs.
pub trait Process: Send {
    /// Stage name for diagnostics; defaults to the registered type name
    /// in builtin stages.
    fn name(&self) -> &str;

    /// Event type this stage accepts; `None` accepts any event.
    fn input_type(&self) -> Option<&str> {
        None
    }

    /// Event type this stage emits; `None` passes the input type through.
    fn output_type(&self) -> Option<&str> {
        None
    }

    /// True for stages with non-reentrant external resources; forces the
    /// whole pool down to one worker.
    fn single_worker_only(&self) -> bool {
        false
    }

    /// Called once per clone before any event is processed.
    fn init(&mut self) -> Result<(), EngineError> {
        let _ = self;
        Ok(())
    }

    /// Transform one event; `None` cuts it.
    fn process_event(&mut self, event: Event) -> Option<Event>;

    /// Called once per clone after the last event.
    fn end(&mut self) {}
}

impl std::fmt::Debug for dyn Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process").field("name", &self.name()).finish()
    }
}

/// One configured chain entry: a process type name plus its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub params: ParamMap,
}

impl ProcessSpec {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            params: ParamMap::default(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

type Factory = dyn Fn(&ParamMap) -> Result<Box<dyn Process>, EngineError> + Send + Sync;

/// Named process factories.
///
/// Every worker builds its own chain clone through the registry, which is
/// what makes clones deep: no constructed stage is ever shared. External
/// crates register custom types next to the builtins.
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    factories: FxHashMap<String, Arc<Factory>>,
}

impl ProcessRegistry {
    /// Empty registry, no builtins.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the builtin stages.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::builtins::register_builtins(&mut registry);
        registry
    }

    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(&ParamMap) -> Result<Box<dyn Process>, EngineError> + Send + Sync + 'static,
    {
        self.factories.insert(type_name.into(), Arc::new(factory));
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Construct one stage instance from its spec.
    pub fn build(&self, spec: &ProcessSpec) -> Result<Box<dyn Process>, EngineError> {
        match self.factories.get(&spec.type_name) {
            Some(factory) => factory(&spec.params),
            None => Err(EngineError::UnknownProcess(spec.type_name.clone())),
        }
    }
}
