//! Observable schema reconciliation
//!
//! The schema is a pure state machine, independent of any storage layer:
//! Empty (nothing observed) -> Learning (names append as stages first set
//! them) -> Frozen (the first committed row fixes the column set). Adding a
//! name past the freeze is a reportable violation; changing the kind of an
//! existing name is a consistency error at any state.

use crate::value::ValueKind;
use crate::FxIndexMap;
use thiserror::Error;

/// Lifecycle state of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    /// No observable has been registered yet.
    Empty,
    /// Names are still being discovered; new slots may append.
    Learning,
    /// The column set is fixed; new names are violations.
    Frozen,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema is frozen; cannot add observable '{name}'")]
    Frozen { name: String },

    #[error("observable '{name}' kind conflict: declared {existing}, got {incoming}")]
    KindConflict {
        name: String,
        existing: ValueKind,
        incoming: ValueKind,
    },
}

/// Append-only mapping from observable name to its typed slot.
///
/// Slot order is insertion order and defines the column order of the output
/// table.
#[derive(Debug, Clone)]
pub struct Schema {
    state: SchemaState,
    slots: FxIndexMap<String, ValueKind>,
}

impl Schema {
    pub fn new() -> Self {
        Self {
            state: SchemaState::Empty,
            slots: FxIndexMap::default(),
        }
    }

    pub fn state(&self) -> SchemaState {
        self.state
    }

    pub fn is_frozen(&self) -> bool {
        self.state == SchemaState::Frozen
    }

    /// Number of registered slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn kind_of(&self, name: &str) -> Option<ValueKind> {
        self.slots.get(name).copied()
    }

    /// Slot names in column order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// `(name, kind)` pairs in column order.
    pub fn slots(&self) -> impl Iterator<Item = (&str, ValueKind)> {
        self.slots.iter().map(|(n, k)| (n.as_str(), *k))
    }

    /// Register one observation of `name` with the given kind.
    ///
    /// Callers skip null values entirely: a null never creates a slot, and a
    /// null stored into an existing slot is a missing value, not an
    /// observation. First observation moves Empty -> Learning.
    pub fn observe(&mut self, name: &str, kind: ValueKind) -> Result<(), SchemaError> {
        if let Some(existing) = self.slots.get(name) {
            if *existing != kind {
                return Err(SchemaError::KindConflict {
                    name: name.to_string(),
                    existing: *existing,
                    incoming: kind,
                });
            }
            return Ok(());
        }
        if self.state == SchemaState::Frozen {
            return Err(SchemaError::Frozen {
                name: name.to_string(),
            });
        }
        self.state = SchemaState::Learning;
        self.slots.insert(name.to_string(), kind);
        Ok(())
    }

    /// Merge every slot of `other` into `self`, in `other`'s column order.
    ///
    /// Used when reconciling a worker's privately-learned schema into the
    /// shared one. Subject to the same freeze and kind-conflict rules as
    /// [`observe`](Self::observe).
    pub fn merge(&mut self, other: &Schema) -> Result<(), SchemaError> {
        for (name, kind) in other.slots() {
            self.observe(name, kind)?;
        }
        Ok(())
    }

    /// Fix the column set. Idempotent; legal from any state (a chain that
    /// commits rows with zero observables freezes an empty schema).
    pub fn freeze(&mut self) {
        self.state = SchemaState::Frozen;
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}
