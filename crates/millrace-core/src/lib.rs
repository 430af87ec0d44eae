//! # Millrace Core
//!
//! Foundational data model for the Millrace event-processing engine.
//!
//! This crate holds the storage-agnostic pieces shared by the runtime and
//! the CLI:
//!
//! - [`value`]: runtime values carried by event fields and observables
//! - [`schema`]: the Empty -> Learning -> Frozen reconciliation state machine
//! - [`limits`]: resource-limit constants enforced by the runtime
//!
//! Nothing in here knows about threads, sources, or persistence; the engine
//! lives in `millrace-runtime`.

pub mod limits;
pub mod schema;
pub mod value;

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

/// IndexMap with FxBuildHasher: insertion-ordered with fast hashing, used
/// for event fields, observable slots, and parameter maps.
pub type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;

pub use schema::{Schema, SchemaError, SchemaState};
pub use value::{Value, ValueKind};
