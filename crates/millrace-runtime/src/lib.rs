//! Millrace Runtime - Concurrent event-processing engine
//!
//! This crate runs a configured process chain over an event source with a
//! fixed pool of worker threads. Each worker owns a deep clone of the chain;
//! a mutex-serialized source gate pairs every dispatched event with a
//! strictly increasing sequence number, and the collector reconciles worker
//! output into one schema-checked record table, optionally restoring input
//! order.

pub mod builtins;
pub mod chain;
pub mod collector;
pub mod config;
mod control;
pub mod error;
pub mod event;
pub mod gate;
pub mod process;
pub mod runner;
pub mod source;
pub mod stats;
pub mod table;
mod worker;

pub use chain::{Chain, ProbeOutcome};
pub use collector::{CollectMode, Collector};
pub use config::EngineConfig;
pub use error::EngineError;
pub use event::{Event, DEFAULT_EVENT_TYPE};
pub use gate::SourceGate;
pub use process::{ParamMap, Process, ProcessRegistry, ProcessSpec};
pub use runner::{Engine, EngineStatus, RunPhase, RunSummary};
pub use source::{open_input, EventSource, JsonlSource, MemorySource};
pub use stats::{RunStats, StatsSnapshot};
pub use table::{RecordTable, Row};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a panicking thread poisoned it.
/// Stage panics are contained per event and shared state is only mutated
/// all-or-nothing, so a poisoned lock is still consistent.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
