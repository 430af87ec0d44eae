//! The committed output of a run: a schema plus its rows.

use crate::event::Event;
use millrace_core::{Schema, Value};

/// One committed row: the sequence number it was emitted under and the
/// final-stage event whose payload holds the observables.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub seq: u64,
    pub event: Event,
}

impl Row {
    /// Input entry id of the event this row came from.
    pub fn event_id(&self) -> u64 {
        self.event.id
    }
}

/// Append-only record table.
///
/// The schema freezes when the first row commits; the collector validates
/// every row against it before pushing, so stored payloads never carry a
/// name outside the column set. In ordered mode rows land in sequence
/// order, in unordered mode in arrival order.
#[derive(Debug, Clone, Default)]
pub struct RecordTable {
    schema: Schema,
    rows: Vec<Row>,
}

impl RecordTable {
    /// Table over a schema seeded by the pre-flight probe.
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn schema_mut(&mut self) -> &mut Schema {
        &mut self.schema
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// The committed rows viewed as an event stream.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.rows.iter().map(|r| &r.event)
    }

    /// Commit one validated row. The first commit freezes the schema.
    pub(crate) fn push(&mut self, seq: u64, event: Event) {
        if self.rows.is_empty() {
            self.schema.freeze();
        }
        self.rows.push(Row { seq, event });
    }

    /// Values of `row` aligned to the column order; a slot the event never
    /// set reads as null.
    pub fn row_values(&self, row: &Row) -> Vec<Value> {
        self.schema
            .names()
            .map(|name| row.event.get(name).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// One whole column, `None` if the name is not a slot.
    pub fn column(&self, name: &str) -> Option<Vec<Value>> {
        if !self.schema.contains(name) {
            return None;
        }
        Some(
            self.rows
                .iter()
                .map(|r| r.event.get(name).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }

    /// A numeric column as floats; non-numeric or missing cells are `None`.
    pub fn column_f64(&self, name: &str) -> Option<Vec<Option<f64>>> {
        if !self.schema.contains(name) {
            return None;
        }
        Some(
            self.rows
                .iter()
                .map(|r| r.event.get(name).and_then(|v| v.as_float()))
                .collect(),
        )
    }
}
