//! Worker threads: one OS thread per chain clone.
//!
//! A worker owns its chain outright. Per event it takes exactly two locks,
//! the source gate's and the collector's, one after the other and never
//! together. Stage panics are contained to the event being processed: the
//! worker releases the sequence number so ordered output cannot stall, then
//! terminates and lets the pool run degraded.

use crate::chain::Chain;
use crate::collector::Collector;
use crate::control::ControlBlock;
use crate::error::EngineError;
use crate::gate::SourceGate;
use crate::process::{ProcessRegistry, ProcessSpec};
use crossbeam_channel::Sender;
use millrace_core::ValueKind;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

/// Final word from a worker thread, sent on the completion channel.
pub(crate) struct WorkerReport {
    pub worker: usize,
    /// Events processed, or why the worker terminated early.
    pub result: Result<u64, EngineError>,
}

pub(crate) struct Worker {
    pub id: usize,
    pub registry: ProcessRegistry,
    pub specs: Arc<Vec<ProcessSpec>>,
    /// Observable shape the runner's reference chain stabilized on; every
    /// clone must reproduce it.
    pub reference_shape: Arc<Vec<(String, ValueKind)>>,
    pub gate: Arc<SourceGate>,
    pub collector: Arc<Collector>,
    pub control: Arc<ControlBlock>,
}

impl Worker {
    /// Thread entry point.
    pub fn run(self, reports: Sender<WorkerReport>) {
        let id = self.id;
        let result = self.event_loop();
        match &result {
            Ok(events) => debug!(worker = id, events, "worker finished"),
            Err(EngineError::Aborted) => debug!(worker = id, "worker released by abort"),
            Err(err) => error!(worker = id, %err, "worker terminated"),
        }
        self.control.worker_exited();
        let _ = reports.send(WorkerReport { worker: id, result });
    }

    fn event_loop(&self) -> Result<u64, EngineError> {
        // A clone that does not reproduce the reference shape would make the
        // output depend on worker scheduling; that sinks the whole run, not
        // just this thread.
        if let Err(err) = self.verify_clone() {
            self.collector.abort(err);
            return Err(EngineError::Aborted);
        }

        let mut chain = Chain::build(&self.registry, &self.specs)?;
        chain.init()?;

        let mut events = 0u64;
        loop {
            self.control.pause_point();
            let Some((seq, event)) = self.gate.next()? else {
                break;
            };
            match catch_unwind(AssertUnwindSafe(|| chain.run_event(event))) {
                Ok(Some(out)) => self.collector.submit_row(self.id, seq, out)?,
                Ok(None) => self.collector.note_cut(seq)?,
                Err(payload) => {
                    let message = panic_text(payload.as_ref());
                    // Release the number first or the ordered stream would
                    // wait forever on it. End hooks are skipped: the stages
                    // may be mid-mutation.
                    self.collector.note_skip(seq)?;
                    return Err(EngineError::StagePanicked {
                        worker: self.id,
                        seq,
                        message,
                    });
                }
            }
            events += 1;
        }
        chain.end();
        Ok(events)
    }

    /// Probe a scratch clone and compare its stabilized shape against the
    /// reference. The scratch chain is discarded so synthetic trials never
    /// leak state into the chain that processes real events.
    fn verify_clone(&self) -> Result<(), EngineError> {
        let mut scratch = Chain::build(&self.registry, &self.specs)?;
        scratch.init()?;
        let outcome = scratch.probe().map_err(|err| EngineError::ProbeDiverged {
            worker: self.id,
            message: err.to_string(),
        })?;
        scratch.end();

        let shape: Vec<(String, ValueKind)> = outcome
            .schema
            .slots()
            .map(|(name, kind)| (name.to_string(), kind))
            .collect();
        if shape != *self.reference_shape {
            let found: Vec<&str> = shape.iter().map(|(n, _)| n.as_str()).collect();
            let expected: Vec<&str> = self
                .reference_shape
                .iter()
                .map(|(n, _)| n.as_str())
                .collect();
            return Err(EngineError::ProbeDiverged {
                worker: self.id,
                message: format!("observables {found:?} do not match {expected:?}"),
            });
        }
        Ok(())
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
