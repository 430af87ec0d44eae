//! Source gate: the single serialization point for input dispatch
//!
//! All workers call [`SourceGate::next`] concurrently; one mutex-held
//! critical section fetches from the underlying source and pairs the event
//! with the next sequence number, so numbers are issued exactly once and in
//! increasing order regardless of call interleaving. This is one of only two
//! locks in the engine (the other is the collector's) and they are never
//! nested.

use crate::error::EngineError;
use crate::event::Event;
use crate::source::EventSource;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

struct GateState {
    source: Box<dyn EventSource>,
    next_seq: u64,
    exhausted: bool,
}

pub struct SourceGate {
    state: Mutex<GateState>,
    stop: AtomicBool,
    /// Mirror of the dispatch count for lock-free progress reads.
    dispatched: AtomicU64,
    first_entry: u64,
    limit: Option<u64>,
    /// Events this run is expected to dispatch, when the source length is
    /// known; fixed at construction.
    expected: Option<u64>,
}

impl SourceGate {
    /// Wrap a source, positioning it at `first_entry`.
    pub fn new(
        mut source: Box<dyn EventSource>,
        first_entry: u64,
        limit: Option<u64>,
    ) -> Result<Self, EngineError> {
        source.rewind(first_entry)?;
        let expected = source
            .len_hint()
            .map(|n| n.saturating_sub(first_entry))
            .map(|n| match limit {
                Some(l) => n.min(l),
                None => n,
            })
            .or(limit);
        Ok(Self {
            state: Mutex::new(GateState {
                source,
                next_seq: 0,
                exhausted: false,
            }),
            stop: AtomicBool::new(false),
            dispatched: AtomicU64::new(0),
            first_entry,
            limit,
            expected,
        })
    }

    /// Dispatch the next event with its sequence number, or `Ok(None)` at
    /// end of stream (source exhausted, event limit reached, or stopped).
    pub fn next(&self) -> Result<Option<(u64, Event)>, EngineError> {
        if self.stop.load(Ordering::Acquire) {
            return Ok(None);
        }
        let mut state = crate::lock(&self.state);
        // Re-check under the lock so a stop during a blocked acquire still
        // returns end-of-stream promptly.
        if self.stop.load(Ordering::Acquire) || state.exhausted {
            return Ok(None);
        }
        if let Some(limit) = self.limit {
            if state.next_seq >= limit {
                state.exhausted = true;
                debug!(dispatched = state.next_seq, "event limit reached");
                return Ok(None);
            }
        }
        match state.source.fetch_next()? {
            Some(event) => {
                let seq = state.next_seq;
                state.next_seq += 1;
                self.dispatched.store(state.next_seq, Ordering::Release);
                Ok(Some((seq, event)))
            }
            None => {
                state.exhausted = true;
                debug!(dispatched = state.next_seq, "source exhausted");
                Ok(None)
            }
        }
    }

    /// Make all subsequent and blocked `next` calls return end-of-stream.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Restart the sequence from zero. Only legal when no worker holds an
    /// in-flight event; the runner guarantees that by resetting between runs.
    pub fn reset(&self) -> Result<(), EngineError> {
        let mut state = crate::lock(&self.state);
        state.source.rewind(self.first_entry)?;
        state.next_seq = 0;
        state.exhausted = false;
        self.dispatched.store(0, Ordering::Release);
        self.stop.store(false, Ordering::Release);
        Ok(())
    }

    /// Events dispatched so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Acquire)
    }

    /// Expected dispatch total for this run, when known.
    pub fn expected(&self) -> Option<u64> {
        self.expected
    }

    /// True once the underlying stream has reported end-of-stream or the
    /// event limit was reached (not set by `stop`).
    pub fn is_exhausted(&self) -> bool {
        crate::lock(&self.state).exhausted
    }
}
