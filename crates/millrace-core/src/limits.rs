//! Resource limits for the engine and its input readers.
//!
//! These constants bound memory use and retry counts; the runtime and the
//! file sources enforce them. Per-run overrides exist where a limit is a
//! tuning knob rather than a hard safety bound.

/// Maximum number of synthetic trial events fed through a chain during the
/// pre-flight probe. A chain that produces no output in any trial aborts the
/// run; one still fluctuating at the bound seeds its schema from the last
/// successful trial.
pub const MAX_PROBE_TRIALS: usize = 8;

/// Default reorder-buffer cap: a worker more than this many sequence numbers
/// ahead of the emit counter blocks until the straggler catches up.
/// Overridable per run.
pub const MAX_REORDER_LAG: usize = 65_536;

/// Reorder-buffer lag that triggers a warning (once per crossing).
pub const REORDER_LAG_WARN: usize = MAX_REORDER_LAG / 2;

/// How long the runner waits for every worker to acknowledge a pause before
/// force-proceeding with a warning, in milliseconds.
pub const PAUSE_ACK_TIMEOUT_MS: u64 = 5_000;

/// Schema-violation descriptions retained verbatim for the run summary.
/// Violations past this count are still counted, just not kept.
pub const MAX_RETAINED_VIOLATIONS: usize = 16;

/// Maximum line length for the streaming event file reader (1 MB).
/// Longer lines are rejected with an error naming the line number.
pub const MAX_LINE_LENGTH: usize = 1_048_576;

/// Maximum number of top-level fields per event.
/// Prevents OOM from events with millions of keys.
pub const MAX_FIELDS_PER_EVENT: usize = 1_024;

/// Maximum number of elements in an array value.
pub const MAX_ARRAY_ELEMENTS: usize = 10_000;
