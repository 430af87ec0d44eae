//! Run orchestration: probe, spawn, supervise, finalize.
//!
//! The engine owns one source gate for its whole lifetime (so `reset` can
//! replay the exact same input) and builds the collector, control block, and
//! worker pool fresh for every run. The pre-flight probe runs on a reference
//! chain before any worker thread exists: a chain that cannot stabilize
//! aborts here, with the gate untouched.

use crate::chain::Chain;
use crate::collector::{CollectMode, Collector};
use crate::config::EngineConfig;
use crate::control::ControlBlock;
use crate::error::EngineError;
use crate::event::Event;
use crate::gate::SourceGate;
use crate::process::{ProcessRegistry, ProcessSpec};
use crate::source::EventSource;
use crate::stats::RunStats;
use crate::table::RecordTable;
use crate::worker::{Worker, WorkerReport};
use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use millrace_core::limits::PAUSE_ACK_TIMEOUT_MS;
use millrace_core::ValueKind;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Lifecycle phase of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Idle,
    Running,
    Paused,
    Stopping,
    Finished,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Idle => "idle",
            RunPhase::Running => "running",
            RunPhase::Paused => "paused",
            RunPhase::Stopping => "stopping",
            RunPhase::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a run, cheap enough to poll.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub phase: RunPhase,
    pub live_workers: usize,
    pub paused_workers: usize,
    pub processed_events: u64,
    pub expected_events: Option<u64>,
    pub rows_committed: u64,
    pub events_cut: u64,
    pub rows_rejected: u64,
}

/// What a finished run reports next to its table.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    /// Pool size actually used (after any single-worker collapse).
    pub workers: usize,
    pub ordered: bool,
    pub probe_trials: usize,
    /// Events dispatched from the source.
    pub events_processed: u64,
    pub rows_committed: u64,
    pub events_cut: u64,
    pub rows_rejected: u64,
    pub schema_violations: u64,
    /// First few violation descriptions, verbatim.
    pub violation_samples: Vec<String>,
    /// Why each failed worker terminated, empty on a clean run.
    pub worker_failures: Vec<String>,
    pub reorder_high_water: u64,
    pub pause_timeouts: u64,
}

struct ActiveRun {
    collector: Arc<Collector>,
    control: Arc<ControlBlock>,
    handles: Vec<JoinHandle<()>>,
    reports: Receiver<WorkerReport>,
    pool: usize,
    probe_trials: usize,
    started_at: DateTime<Utc>,
    started: Instant,
}

struct FinishedRun {
    table: RecordTable,
    summary: RunSummary,
}

/// The concurrent event-processing engine.
///
/// One engine drives one configured chain over one source, possibly many
/// times: `run` (or `start` + `join`), then `reset` to replay the identical
/// input from the top.
pub struct Engine {
    config: EngineConfig,
    registry: ProcessRegistry,
    specs: Arc<Vec<ProcessSpec>>,
    gate: Arc<SourceGate>,
    stats: Arc<RunStats>,
    phase: RunPhase,
    active: Option<ActiveRun>,
    finished: Option<FinishedRun>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        registry: ProcessRegistry,
        source: Box<dyn EventSource>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let gate = Arc::new(SourceGate::new(
            source,
            config.first_entry,
            config.max_events,
        )?);
        let specs = Arc::new(config.chain.clone());
        Ok(Self {
            config,
            registry,
            specs,
            gate,
            stats: Arc::new(RunStats::new()),
            phase: RunPhase::Idle,
            active: None,
            finished: None,
        })
    }

    /// Probe the reference chain, then launch the pool. If the probe fails
    /// the error returns with no thread spawned and no event consumed.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.phase != RunPhase::Idle {
            return Err(EngineError::AlreadyStarted);
        }

        let mut reference = Chain::build(&self.registry, &self.specs)?;
        let single = reference.single_worker_only();
        reference.init()?;
        let outcome = reference.probe();
        reference.end();
        let outcome = outcome?;

        let mut pool = self.config.workers;
        if single && pool > 1 {
            warn!(
                configured = pool,
                "chain contains single-worker stages; collapsing pool to 1"
            );
            pool = 1;
        }

        let shape: Arc<Vec<(String, ValueKind)>> = Arc::new(
            outcome
                .schema
                .slots()
                .map(|(n, k)| (n.to_string(), k))
                .collect(),
        );
        let mode = if self.config.ordered {
            CollectMode::Ordered
        } else {
            CollectMode::Unordered
        };
        let collector = Arc::new(Collector::new(
            mode,
            self.config.max_reorder_lag,
            outcome.schema,
            Arc::clone(&self.gate),
            Arc::clone(&self.stats),
        ));
        let control = Arc::new(ControlBlock::new(pool));
        let (tx, rx) = crossbeam_channel::bounded(pool);

        let mut handles = Vec::with_capacity(pool);
        for id in 0..pool {
            let worker = Worker {
                id,
                registry: self.registry.clone(),
                specs: Arc::clone(&self.specs),
                reference_shape: Arc::clone(&shape),
                gate: Arc::clone(&self.gate),
                collector: Arc::clone(&collector),
                control: Arc::clone(&control),
            };
            let tx = tx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("millrace-worker-{id}"))
                .spawn(move || worker.run(tx));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    self.gate.stop();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(EngineError::Io(err));
                }
            }
        }
        info!(
            workers = pool,
            ordered = self.config.ordered,
            probe_trials = outcome.trials,
            "run started"
        );

        self.active = Some(ActiveRun {
            collector,
            control,
            handles,
            reports: rx,
            pool,
            probe_trials: outcome.trials,
            started_at: Utc::now(),
            started: Instant::now(),
        });
        self.phase = RunPhase::Running;
        Ok(())
    }

    /// Block until the pool drains, then finalize the run product. Implies
    /// resume: a paused run is released so it can finish.
    pub fn join(&mut self) -> Result<RunSummary, EngineError> {
        let run = self.active.take().ok_or(EngineError::NotRunning)?;

        run.control.resume();
        for handle in run.handles {
            if handle.join().is_err() {
                // run() contains stage panics; reaching here means the
                // thread died outside the event loop.
                error!("worker thread panicked outside the event loop");
            }
        }

        let mut failures = Vec::new();
        for report in run.reports.try_iter() {
            match report.result {
                Ok(_) => {}
                Err(EngineError::Aborted) => {}
                Err(err) => {
                    self.stats.record_worker_failure();
                    failures.push(format!("worker {}: {}", report.worker, err));
                }
            }
        }

        // A fatal recorded at the collector outranks everything else.
        if let Some(fatal) = run.collector.take_fatal() {
            self.phase = RunPhase::Finished;
            self.finished = None;
            error!(%fatal, "run aborted");
            return Err(fatal);
        }

        if !failures.is_empty() {
            if failures.len() >= run.pool && !self.gate.is_exhausted() && !self.gate.is_stopped() {
                for failure in &failures {
                    error!("{failure}");
                }
                self.phase = RunPhase::Finished;
                self.finished = None;
                return Err(EngineError::AllWorkersDead { workers: run.pool });
            }
            warn!(
                failed = failures.len(),
                pool = run.pool,
                "run finished degraded"
            );
        }

        let output = run.collector.take_output();
        let snap = self.stats.snapshot();
        let summary = RunSummary {
            started_at: run.started_at,
            elapsed_secs: run.started.elapsed().as_secs_f64(),
            workers: run.pool,
            ordered: self.config.ordered,
            probe_trials: run.probe_trials,
            events_processed: self.gate.dispatched(),
            rows_committed: snap.rows_committed,
            events_cut: snap.events_cut,
            rows_rejected: snap.rows_rejected,
            schema_violations: output.violations_total,
            violation_samples: output.violations,
            worker_failures: failures,
            reorder_high_water: snap.reorder_high_water,
            pause_timeouts: snap.pause_timeouts,
        };
        info!(
            rows = summary.rows_committed,
            events = summary.events_processed,
            cut = summary.events_cut,
            elapsed_secs = summary.elapsed_secs,
            "run complete"
        );
        self.finished = Some(FinishedRun {
            table: output.table,
            summary: summary.clone(),
        });
        self.phase = RunPhase::Finished;
        Ok(summary)
    }

    /// Start and block to completion.
    pub fn run(&mut self) -> Result<RunSummary, EngineError> {
        self.start()?;
        self.join()
    }

    /// Two-phase pause: raise the flag, wait for every worker to park. If
    /// the ack wait times out the engine proceeds as paused with a warning;
    /// stragglers park at their next safe point. Idempotent while paused.
    pub fn pause(&mut self) -> Result<(), EngineError> {
        let run = self.active.as_ref().ok_or(EngineError::NotRunning)?;
        if self.phase == RunPhase::Paused {
            return Ok(());
        }
        let acked = run
            .control
            .request_pause(Duration::from_millis(PAUSE_ACK_TIMEOUT_MS));
        if !acked {
            self.stats.record_pause_timeout();
            warn!(
                timeout_ms = PAUSE_ACK_TIMEOUT_MS,
                "pause not acknowledged by every worker; proceeding as paused"
            );
        }
        self.phase = RunPhase::Paused;
        Ok(())
    }

    /// Release paused workers. Idempotent while running.
    pub fn resume(&mut self) -> Result<(), EngineError> {
        let run = self.active.as_ref().ok_or(EngineError::NotRunning)?;
        run.control.resume();
        if self.phase == RunPhase::Paused {
            self.phase = RunPhase::Running;
        }
        Ok(())
    }

    /// Cancel the gate so the run winds down: in-flight events finish,
    /// nothing further is dispatched. Completion still goes through `join`.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        let run = self.active.as_ref().ok_or(EngineError::NotRunning)?;
        info!("stop requested");
        self.phase = RunPhase::Stopping;
        run.control.resume();
        self.gate.stop();
        Ok(())
    }

    pub fn status(&self) -> EngineStatus {
        let (live, paused) = match &self.active {
            Some(run) => (run.control.live_workers(), run.control.paused_workers()),
            None => (0, 0),
        };
        let snap = self.stats.snapshot();
        EngineStatus {
            phase: self.phase,
            live_workers: live,
            paused_workers: paused,
            processed_events: self.gate.dispatched(),
            expected_events: self.gate.expected(),
            rows_committed: snap.rows_committed,
            events_cut: snap.events_cut,
            rows_rejected: snap.rows_rejected,
        }
    }

    /// Fraction of the expected input dispatched so far, when the source
    /// size is known.
    pub fn progress(&self) -> Option<f64> {
        let expected = self.gate.expected()?;
        if expected == 0 {
            return Some(1.0);
        }
        Some((self.gate.dispatched() as f64 / expected as f64).min(1.0))
    }

    /// Events dispatched from the source so far.
    pub fn processed_events(&self) -> u64 {
        self.gate.dispatched()
    }

    /// Table of the last finished run.
    pub fn output_table(&self) -> Option<&RecordTable> {
        self.finished.as_ref().map(|f| &f.table)
    }

    /// Committed rows of the last finished run, viewed as an event stream.
    pub fn output_events(&self) -> Option<impl Iterator<Item = &Event>> {
        self.finished.as_ref().map(|f| f.table.events())
    }

    /// Clone of the table as committed so far, usable mid-run.
    pub fn table_snapshot(&self) -> Option<RecordTable> {
        match (&self.active, &self.finished) {
            (Some(run), _) => Some(run.collector.table_snapshot()),
            (None, Some(f)) => Some(f.table.clone()),
            _ => None,
        }
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        self.finished.as_ref().map(|f| &f.summary)
    }

    /// Rewind the gate for a re-run over the identical input. Legal only
    /// between runs.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        if self.active.is_some() {
            return Err(EngineError::ResetWhileActive);
        }
        self.gate.reset()?;
        self.stats.reset();
        self.finished = None;
        self.phase = RunPhase::Idle;
        Ok(())
    }
}
