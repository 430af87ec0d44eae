//! Millrace CLI library - run files and table output
//!
//! The binary in `main.rs` stays thin; run file parsing and the table
//! writers live here where they can be tested.

pub mod config;
pub mod output;

use anyhow::Result;
use millrace_runtime::{Chain, ProbeOutcome, ProcessRegistry};
use std::path::Path;

use config::RunFile;

/// Load a run file and validate it end to end without consuming any
/// input: engine settings, chain construction and type compatibility,
/// then the pre-flight probe over synthetic events. Returns the run
/// file, the reference chain, and the probe outcome.
pub fn validate_run_file(path: &Path) -> Result<(RunFile, Chain, ProbeOutcome)> {
    let run_file = RunFile::load(path).map_err(|e| anyhow::anyhow!("{}", e))?;
    run_file.engine.validate()?;
    let mut chain = Chain::build(&ProcessRegistry::with_builtins(), &run_file.engine.chain)?;
    chain.init()?;
    let probe = chain.probe();
    chain.end();
    Ok((run_file, chain, probe?))
}
