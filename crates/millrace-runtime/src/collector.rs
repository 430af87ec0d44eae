//! Result collector: schema reconciliation, row commit, and reordering
//!
//! All workers deliver into one mutex-held critical section, the second of
//! the two locks on the event path (the first is the source gate; a worker
//! never holds both). In ordered mode deliveries park in a buffer keyed by
//! sequence number and flush strictly in sequence; cuts and skips occupy
//! their number so a missing event can never stall the stream.
//!
//! The buffer is bounded: a worker running more than `max_lag` sequence
//! numbers ahead of the emit counter blocks on a condvar until stragglers
//! catch up. This cannot deadlock: sequence numbers are dense, so whenever
//! the buffer is non-empty some worker holds the next expected number, and
//! that worker is never far enough ahead to block.

use crate::error::EngineError;
use crate::event::Event;
use crate::gate::SourceGate;
use crate::stats::RunStats;
use crate::table::RecordTable;
use millrace_core::limits::{MAX_RETAINED_VIOLATIONS, REORDER_LAG_WARN};
use millrace_core::{Schema, SchemaError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use tracing::{error, warn};

/// Output ordering discipline for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectMode {
    /// Rows commit in arrival order; cheapest, nondeterministic row order.
    Unordered,
    /// Rows commit in sequence order via the reorder buffer.
    Ordered,
}

enum Slot {
    Row { worker: usize, event: Event },
    /// A sequence number with no row: the chain cut the event, or the
    /// worker skipped it after a stage failure.
    Hole,
}

struct CollectorState {
    table: RecordTable,
    pending: BTreeMap<u64, Slot>,
    next_seq: u64,
    fatal: Option<EngineError>,
    violations: Vec<String>,
    lag_warned: bool,
}

/// Everything the collector hands back after the workers are joined.
pub struct CollectorOutput {
    pub table: RecordTable,
    /// Retained schema-violation descriptions (first few only).
    pub violations: Vec<String>,
    pub violations_total: u64,
}

pub struct Collector {
    state: Mutex<CollectorState>,
    space: Condvar,
    mode: CollectMode,
    max_lag: u64,
    violations_total: AtomicU64,
    gate: Arc<SourceGate>,
    stats: Arc<RunStats>,
}

impl Collector {
    /// Collector over a probe-seeded schema. `max_lag` bounds the reorder
    /// buffer in ordered mode and must be at least 1.
    pub fn new(
        mode: CollectMode,
        max_lag: usize,
        schema: Schema,
        gate: Arc<SourceGate>,
        stats: Arc<RunStats>,
    ) -> Self {
        Self {
            state: Mutex::new(CollectorState {
                table: RecordTable::new(schema),
                pending: BTreeMap::new(),
                next_seq: 0,
                fatal: None,
                violations: Vec::new(),
                lag_warned: false,
            }),
            space: Condvar::new(),
            mode,
            max_lag: max_lag.max(1) as u64,
            violations_total: AtomicU64::new(0),
            gate,
            stats,
        }
    }

    /// Deliver a surviving event under its sequence number.
    pub fn submit_row(&self, worker: usize, seq: u64, event: Event) -> Result<(), EngineError> {
        self.deliver(seq, Slot::Row { worker, event })
    }

    /// Record that the chain cut the event holding `seq`.
    pub fn note_cut(&self, seq: u64) -> Result<(), EngineError> {
        self.stats.record_cut();
        self.deliver(seq, Slot::Hole)
    }

    /// Release `seq` with no row and no cut, after a stage failure.
    pub fn note_skip(&self, seq: u64) -> Result<(), EngineError> {
        self.deliver(seq, Slot::Hole)
    }

    fn deliver(&self, seq: u64, slot: Slot) -> Result<(), EngineError> {
        let mut state = crate::lock(&self.state);
        if state.fatal.is_some() {
            return Err(EngineError::Aborted);
        }

        match self.mode {
            CollectMode::Unordered => self.apply(&mut state, seq, slot),
            CollectMode::Ordered => {
                debug_assert!(seq >= state.next_seq, "sequence delivered twice");
                while seq - state.next_seq >= self.max_lag {
                    state = self
                        .space
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                    if state.fatal.is_some() {
                        return Err(EngineError::Aborted);
                    }
                }
                state.pending.insert(seq, slot);
                self.stats.note_reorder_lag(state.pending.len() as u64);
                if state.pending.len() >= REORDER_LAG_WARN && !state.lag_warned {
                    state.lag_warned = true;
                    warn!(
                        buffered = state.pending.len(),
                        next = state.next_seq,
                        "reorder buffer growing; a straggling worker is holding back the stream"
                    );
                }
                self.flush(&mut state)
            }
        }
    }

    /// Drain every consecutively-numbered slot starting at `next_seq`.
    fn flush(&self, state: &mut CollectorState) -> Result<(), EngineError> {
        let mut advanced = false;
        while let Some(slot) = state.pending.remove(&state.next_seq) {
            let seq = state.next_seq;
            state.next_seq += 1;
            advanced = true;
            self.apply(state, seq, slot)?;
        }
        if advanced {
            if state.pending.len() < REORDER_LAG_WARN {
                state.lag_warned = false;
            }
            self.space.notify_all();
        }
        Ok(())
    }

    /// Validate and commit one slot. Row payloads reconcile against the
    /// shared schema here: an unknown name after the freeze rejects the whole
    /// row (reported, non-fatal); a kind disagreement is fatal for the run.
    fn apply(
        &self,
        state: &mut CollectorState,
        seq: u64,
        slot: Slot,
    ) -> Result<(), EngineError> {
        let Slot::Row { worker, event } = slot else {
            return Ok(());
        };

        for (name, value) in &event.data {
            let Some(kind) = value.kind() else { continue };
            match state.table.schema_mut().observe(name, kind) {
                Ok(()) => {}
                Err(err @ SchemaError::Frozen { .. }) => {
                    let total = self.violations_total.fetch_add(1, Ordering::Relaxed) + 1;
                    if state.violations.len() < MAX_RETAINED_VIOLATIONS {
                        state.violations.push(format!("seq {seq}: {err}"));
                    }
                    warn!(seq, worker, total, %err, "row rejected: schema violation");
                    self.stats.record_rejected();
                    return Ok(());
                }
                Err(source @ SchemaError::KindConflict { .. }) => {
                    error!(seq, worker, %source, "fatal schema divergence; stopping run");
                    state.fatal = Some(EngineError::SchemaDiverged { worker, source });
                    self.gate.stop();
                    // Wake blocked deliverers so they can observe the abort.
                    self.space.notify_all();
                    return Err(EngineError::Aborted);
                }
            }
        }

        state.table.push(seq, event);
        self.stats.record_commit();
        Ok(())
    }

    /// Record a fatal raised outside a delivery (first one wins), stop the
    /// gate, and wake anyone parked on the buffer.
    pub(crate) fn abort(&self, error: EngineError) {
        let mut state = crate::lock(&self.state);
        if state.fatal.is_none() {
            state.fatal = Some(error);
        }
        self.gate.stop();
        self.space.notify_all();
    }

    /// Clone of the table as committed so far.
    pub fn table_snapshot(&self) -> RecordTable {
        crate::lock(&self.state).table.clone()
    }

    /// Move the stored fatal error out, if a delivery raised one.
    pub fn take_fatal(&self) -> Option<EngineError> {
        crate::lock(&self.state).fatal.take()
    }

    /// Move the run product out. Call once, after every worker is joined.
    pub fn take_output(&self) -> CollectorOutput {
        let mut state = crate::lock(&self.state);
        if !state.pending.is_empty() && state.fatal.is_none() {
            // Only an aborted run may leave holes behind.
            error!(
                buffered = state.pending.len(),
                "reorder buffer not empty at end of run"
            );
        }
        state.pending.clear();
        CollectorOutput {
            table: std::mem::take(&mut state.table),
            violations: std::mem::take(&mut state.violations),
            violations_total: self.violations_total.load(Ordering::Relaxed),
        }
    }
}
