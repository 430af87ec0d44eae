//! Millrace CLI - Command line interface for the Millrace event processing engine

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use millrace_cli::config::{OutputFormat, RunFile};
use millrace_cli::output;
use millrace_runtime::{open_input, Engine, ProcessRegistry, RunSummary};

#[derive(Parser)]
#[command(name = "millrace")]
#[command(author = "Millrace Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Millrace - Concurrent event processing engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a process chain over input files
    Run {
        /// Path to the run file (YAML or TOML)
        file: PathBuf,

        /// Extra input files, appended after the run file's inputs
        #[arg(short, long)]
        input: Vec<PathBuf>,

        /// Number of worker threads (overrides the run file)
        #[arg(long, short = 'w', env = "MILLRACE_WORKERS")]
        workers: Option<usize>,

        /// Stop after this many events
        #[arg(long)]
        max_events: Option<u64>,

        /// Skip this many input entries before the first event
        #[arg(long)]
        first_entry: Option<u64>,

        /// Collect rows in completion order instead of source order
        #[arg(long)]
        unordered: bool,

        /// Output file path (overrides the run file, stdout if neither is set)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format (table, csv, jsonl)
        #[arg(short, long)]
        format: Option<String>,

        /// Print each committed row
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a run file and its process chain without running it
    Check {
        /// Path to the run file (YAML or TOML)
        file: PathBuf,
    },

    /// Generate an example run file
    ConfigGen {
        /// Output format (yaml, toml)
        #[arg(short, long, default_value = "yaml")]
        format: String,

        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            input,
            workers,
            max_events,
            first_entry,
            unordered,
            output,
            format,
            verbose,
        } => {
            run_chain(
                &file,
                input,
                workers,
                max_events,
                first_entry,
                unordered,
                output,
                format,
                verbose,
            )?;
        }

        Commands::Check { file } => {
            check_run_file(&file);
        }

        Commands::ConfigGen { format, output } => {
            let content = match format.to_lowercase().as_str() {
                "yaml" | "yml" => RunFile::example_yaml(),
                "toml" => RunFile::example_toml(),
                _ => anyhow::bail!("Unsupported format: {}. Use 'yaml' or 'toml'", format),
            };

            if let Some(path) = output {
                std::fs::write(&path, &content)?;
                println!("Run file written to: {}", path.display());
            } else {
                println!("{}", content);
            }
        }
    }

    Ok(())
}

fn init_logging(level: &str, timestamps: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if timestamps {
        builder.try_init()
    } else {
        builder.without_time().try_init()
    }
    .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_chain(
    file: &PathBuf,
    extra_inputs: Vec<PathBuf>,
    workers: Option<usize>,
    max_events: Option<u64>,
    first_entry: Option<u64>,
    unordered: bool,
    output_path: Option<PathBuf>,
    format: Option<String>,
    verbose: bool,
) -> Result<()> {
    let run_file = RunFile::load(file).map_err(|e| anyhow::anyhow!("{}", e))?;
    init_logging(&run_file.logging.level, run_file.logging.timestamps)?;

    // Command line flags win over the run file
    let mut config = run_file.engine.clone();
    if let Some(workers) = workers {
        config.workers = workers;
    }
    if let Some(limit) = max_events {
        config.max_events = Some(limit);
    }
    if let Some(first) = first_entry {
        config.first_entry = first;
    }
    if unordered {
        config.ordered = false;
    }

    let mut inputs = run_file.inputs.clone();
    inputs.extend(extra_inputs);
    if inputs.is_empty() {
        anyhow::bail!("No input files: list them under 'inputs' in the run file or pass --input");
    }

    let format = match format {
        Some(name) => OutputFormat::from_name(&name).ok_or_else(|| {
            anyhow::anyhow!("Unsupported format: {}. Use 'table', 'csv' or 'jsonl'", name)
        })?,
        None => run_file.output.format,
    };
    let output_path = output_path.or_else(|| run_file.output.path.clone());

    let stages: Vec<&str> = config.chain.iter().map(|s| s.type_name.as_str()).collect();

    println!("Millrace Run");
    println!("================");
    println!("Run file: {}", file.display());
    for (i, input) in inputs.iter().enumerate() {
        if i == 0 {
            println!("Inputs:   {}", input.display());
        } else {
            println!("          {}", input.display());
        }
    }
    println!("Chain:    {}", stages.join(" -> "));
    println!("Workers:  {}", config.workers);
    println!(
        "Mode:     {}",
        if config.ordered { "ordered" } else { "unordered" }
    );
    if let Some(limit) = config.max_events {
        println!("Limit:    {} events", limit);
    }
    if config.first_entry > 0 {
        println!("Offset:   {} entries", config.first_entry);
    }
    println!();

    let source = open_input(&inputs)?;
    let mut engine = Engine::new(config, ProcessRegistry::with_builtins(), Box::new(source))?;

    info!("Starting run over {} input file(s)", inputs.len());
    engine.start()?;
    while engine.status().live_workers > 0 {
        std::thread::sleep(std::time::Duration::from_millis(200));
        if engine.status().live_workers == 0 {
            break;
        }
        match engine.progress() {
            Some(p) => info!(
                "progress: {:.0}% ({} events)",
                p * 100.0,
                engine.processed_events()
            ),
            None => info!("processed {} events", engine.processed_events()),
        }
    }
    let summary = engine.join()?;

    if verbose {
        if let Some(events) = engine.output_events() {
            for event in events {
                println!("OUTPUT ROW: {} - {:?}", event.event_type, event.data);
            }
            println!();
        }
    }

    print_summary(&summary);

    let table = engine
        .output_table()
        .ok_or_else(|| anyhow::anyhow!("Run finished without an output table"))?;
    match output_path {
        Some(path) => {
            let mut out = std::fs::File::create(&path)?;
            output::write_table(&mut out, table, format)?;
            println!("\nTable written to: {}", path.display());
        }
        None => {
            println!();
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            output::write_table(&mut out, table, format)?;
        }
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("Run Complete");
    println!("======================");
    println!("Duration:         {:.3}s", summary.elapsed_secs);
    println!("Events processed: {}", summary.events_processed);
    println!("Rows committed:   {}", summary.rows_committed);
    println!("Events cut:       {}", summary.events_cut);
    if summary.rows_rejected > 0 {
        println!("Rows rejected:    {}", summary.rows_rejected);
    }
    println!("Workers used:     {}", summary.workers);
    if summary.elapsed_secs > 0.0 {
        println!(
            "Event rate:       {:.1} events/sec",
            summary.events_processed as f64 / summary.elapsed_secs
        );
    }

    for sample in &summary.violation_samples {
        warn!("schema violation: {}", sample);
    }
    for failure in &summary.worker_failures {
        warn!("worker failure: {}", failure);
    }
    if summary.pause_timeouts > 0 {
        warn!(
            "{} pause request(s) timed out waiting for worker acks",
            summary.pause_timeouts
        );
    }
}

fn check_run_file(file: &PathBuf) {
    match millrace_cli::validate_run_file(file) {
        Ok((run_file, chain, probe)) => {
            println!("Run file OK");
            println!("   Stages:  {}", chain.len());
            println!("   Workers: {}", run_file.engine.workers);
            println!(
                "   Probe:   stabilized after {} trial(s), {} observable(s)",
                probe.trials,
                probe.schema.len()
            );
            if chain.single_worker_only() && run_file.engine.workers > 1 {
                println!("   Note: a stage requires a single worker, the pool will collapse to 1");
            }
            if run_file.inputs.is_empty() {
                println!("   Note: no inputs listed, --input will be required to run");
            }
        }
        Err(e) => {
            println!("Validation failed: {}", e);
            std::process::exit(1);
        }
    }
}
