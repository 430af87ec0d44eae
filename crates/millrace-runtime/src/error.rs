//! Engine error taxonomy
//!
//! Configuration errors (unknown stage, type mismatch, failed probe, schema
//! divergence across clones) are fatal and abort the run. Filter cuts are not
//! errors at all; pause timeouts and reorder-buffer pressure are warnings
//! logged where they occur.

use millrace_core::schema::SchemaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown process type '{0}'")]
    UnknownProcess(String),

    #[error("invalid parameter for process '{process}': {message}")]
    InvalidParameter { process: String, message: String },

    #[error("process chain is empty")]
    EmptyChain,

    #[error(
        "chain stage {index} ('{stage}') accepts event type '{expected}' \
         but upstream emits '{found}'"
    )]
    TypeMismatch {
        index: usize,
        stage: String,
        expected: String,
        found: String,
    },

    #[error(
        "chain produced no output in {trials} probe trials; \
         it can never produce a row"
    )]
    ProbeFailed { trials: usize },

    #[error("worker {worker} probe diverged from the reference chain: {message}")]
    ProbeDiverged { worker: usize, message: String },

    #[error("schema: {0}")]
    Schema(#[from] SchemaError),

    #[error("worker {worker} schema diverged from shared schema: {source}")]
    SchemaDiverged { worker: usize, source: SchemaError },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("source: {0}")]
    Source(String),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("stage panicked in worker {worker} at sequence {seq}: {message}")]
    StagePanicked {
        worker: usize,
        seq: u64,
        message: String,
    },

    #[error("all {workers} workers terminated before end of stream")]
    AllWorkersDead { workers: usize },

    #[error("run already started")]
    AlreadyStarted,

    #[error("no run in progress")]
    NotRunning,

    #[error("reset is only legal between runs")]
    ResetWhileActive,

    #[error("run aborted after a fatal error")]
    Aborted,
}
