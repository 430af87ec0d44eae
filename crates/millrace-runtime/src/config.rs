//! Engine run configuration.

use crate::error::EngineError;
use crate::process::ProcessSpec;
use millrace_core::limits::MAX_REORDER_LAG;
use serde::{Deserialize, Serialize};

/// Everything a run needs besides the source: the chain and the pool knobs.
///
/// Deserializes from the `engine` section of a run file. All knobs default,
/// so a minimal configuration is just the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker pool size. Collapses to 1 when any stage is single-worker.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Stop after this many events, `None` for the whole input.
    #[serde(default)]
    pub max_events: Option<u64>,
    /// First input entry to process; earlier entries are never fetched.
    #[serde(default)]
    pub first_entry: u64,
    /// Emit rows in sequence order (`true`) or arrival order (`false`).
    #[serde(default = "default_ordered")]
    pub ordered: bool,
    /// Reorder-buffer bound for ordered runs.
    #[serde(default = "default_max_reorder_lag")]
    pub max_reorder_lag: usize,
    /// The process chain, applied in order.
    #[serde(default)]
    pub chain: Vec<ProcessSpec>,
}

fn default_workers() -> usize {
    1
}

fn default_ordered() -> bool {
    true
}

fn default_max_reorder_lag() -> usize {
    MAX_REORDER_LAG
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_events: None,
            first_entry: 0,
            ordered: default_ordered(),
            max_reorder_lag: default_max_reorder_lag(),
            chain: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.workers == 0 {
            return Err(EngineError::Config("workers must be at least 1".into()));
        }
        if self.max_reorder_lag == 0 {
            return Err(EngineError::Config(
                "max_reorder_lag must be at least 1".into(),
            ));
        }
        if self.chain.is_empty() {
            return Err(EngineError::EmptyChain);
        }
        if let Some(0) = self.max_events {
            return Err(EngineError::Config("max_events must be at least 1".into()));
        }
        Ok(())
    }

    pub fn with_chain(mut self, chain: Vec<ProcessSpec>) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_events(mut self, max_events: u64) -> Self {
        self.max_events = Some(max_events);
        self
    }

    pub fn unordered(mut self) -> Self {
        self.ordered = false;
        self
    }
}
