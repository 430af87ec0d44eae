//! Builtin process stages
//!
//! A small set of general-purpose stages registered under well-known type
//! names. Numeric stages read and write event fields; cut stages return
//! `None` to filter an event out. Stages never error per event: an event
//! lacking the configured field passes through unchanged, which also lets
//! the pre-flight probe traverse a chain with synthetic payloads.

use crate::error::EngineError;
use crate::event::Event;
use crate::process::{ParamMap, Process, ProcessRegistry};
use millrace_core::Value;
use std::sync::Arc;

pub(crate) fn register_builtins(registry: &mut ProcessRegistry) {
    registry.register("scale", |p| Ok(Box::new(Scale::from_params(p)?) as _));
    registry.register("shift", |p| Ok(Box::new(Shift::from_params(p)?) as _));
    registry.register("modulo_cut", |p| Ok(Box::new(ModuloCut::from_params(p)?) as _));
    registry.register("threshold_cut", |p| {
        Ok(Box::new(ThresholdCut::from_params(p)?) as _)
    });
    registry.register("set_field", |p| Ok(Box::new(SetField::from_params(p)?) as _));
    registry.register("rename", |p| Ok(Box::new(Rename::from_params(p)?) as _));
    registry.register("select", |p| Ok(Box::new(Select::from_params(p)?) as _));
    registry.register("expect_type", |p| {
        Ok(Box::new(ExpectType::from_params(p)?) as _)
    });
    registry.register("emit_as", |p| Ok(Box::new(EmitAs::from_params(p)?) as _));
    registry.register("print", |p| Ok(Box::new(Print::from_params(p)?) as _));
}

// ── Parameter helpers ──

fn invalid(process: &str, message: impl Into<String>) -> EngineError {
    EngineError::InvalidParameter {
        process: process.to_string(),
        message: message.into(),
    }
}

fn require_str(params: &ParamMap, process: &str, key: &str) -> Result<String, EngineError> {
    match params.get(key) {
        Some(Value::Str(s)) if !s.is_empty() => Ok(s.clone()),
        Some(v) => Err(invalid(
            process,
            format!("'{}' must be a non-empty string, got {}", key, v.type_name()),
        )),
        None => Err(invalid(process, format!("missing '{}'", key))),
    }
}

fn require_float(params: &ParamMap, process: &str, key: &str) -> Result<f64, EngineError> {
    match params.get(key) {
        Some(v) => v
            .as_float()
            .ok_or_else(|| invalid(process, format!("'{}' must be numeric", key))),
        None => Err(invalid(process, format!("missing '{}'", key))),
    }
}

fn require_int(params: &ParamMap, process: &str, key: &str) -> Result<i64, EngineError> {
    match params.get(key) {
        Some(Value::Int(n)) => Ok(*n),
        Some(_) => Err(invalid(process, format!("'{}' must be an integer", key))),
        None => Err(invalid(process, format!("missing '{}'", key))),
    }
}

fn optional_float(params: &ParamMap, process: &str, key: &str) -> Result<Option<f64>, EngineError> {
    match params.get(key) {
        Some(v) => v
            .as_float()
            .map(Some)
            .ok_or_else(|| invalid(process, format!("'{}' must be numeric", key))),
        None => Ok(None),
    }
}

// ── Numeric stages ──

/// Multiplies a numeric field by a constant factor.
pub struct Scale {
    field: String,
    factor: f64,
}

impl Scale {
    fn from_params(params: &ParamMap) -> Result<Self, EngineError> {
        Ok(Self {
            field: require_str(params, "scale", "field")?,
            factor: require_float(params, "scale", "factor")?,
        })
    }
}

impl Process for Scale {
    fn name(&self) -> &str {
        "scale"
    }

    fn process_event(&mut self, mut event: Event) -> Option<Event> {
        if let Some(x) = event.get_float(&self.field) {
            event.set(self.field.clone(), x * self.factor);
        }
        Some(event)
    }
}

/// Adds a constant offset to a numeric field.
pub struct Shift {
    field: String,
    offset: f64,
}

impl Shift {
    fn from_params(params: &ParamMap) -> Result<Self, EngineError> {
        Ok(Self {
            field: require_str(params, "shift", "field")?,
            offset: require_float(params, "shift", "offset")?,
        })
    }
}

impl Process for Shift {
    fn name(&self) -> &str {
        "shift"
    }

    fn process_event(&mut self, mut event: Event) -> Option<Event> {
        if let Some(x) = event.get_float(&self.field) {
            event.set(self.field.clone(), x + self.offset);
        }
        Some(event)
    }
}

// ── Cut stages ──

/// Cuts every Nth event by entry id: the 3rd, 6th, 9th... for `every = 3`.
pub struct ModuloCut {
    every: u64,
}

impl ModuloCut {
    fn from_params(params: &ParamMap) -> Result<Self, EngineError> {
        let every = require_int(params, "modulo_cut", "every")?;
        if every < 1 {
            return Err(invalid("modulo_cut", "'every' must be at least 1"));
        }
        Ok(Self {
            every: every as u64,
        })
    }
}

impl Process for ModuloCut {
    fn name(&self) -> &str {
        "modulo_cut"
    }

    fn process_event(&mut self, event: Event) -> Option<Event> {
        if (event.id + 1) % self.every == 0 {
            None
        } else {
            Some(event)
        }
    }
}

/// Cuts events whose numeric field falls outside `[min, max]`.
/// Events lacking the field pass.
pub struct ThresholdCut {
    field: String,
    min: Option<f64>,
    max: Option<f64>,
}

impl ThresholdCut {
    fn from_params(params: &ParamMap) -> Result<Self, EngineError> {
        let field = require_str(params, "threshold_cut", "field")?;
        let min = optional_float(params, "threshold_cut", "min")?;
        let max = optional_float(params, "threshold_cut", "max")?;
        if min.is_none() && max.is_none() {
            return Err(invalid("threshold_cut", "needs 'min' and/or 'max'"));
        }
        Ok(Self { field, min, max })
    }
}

impl Process for ThresholdCut {
    fn name(&self) -> &str {
        "threshold_cut"
    }

    fn process_event(&mut self, event: Event) -> Option<Event> {
        let Some(x) = event.get_float(&self.field) else {
            return Some(event);
        };
        if self.min.is_some_and(|m| x < m) || self.max.is_some_and(|m| x > m) {
            None
        } else {
            Some(event)
        }
    }
}

// ── Field stages ──

/// Sets a field to a constant value.
pub struct SetField {
    field: String,
    value: Value,
}

impl SetField {
    fn from_params(params: &ParamMap) -> Result<Self, EngineError> {
        let field = require_str(params, "set_field", "field")?;
        let value = params
            .get("value")
            .cloned()
            .ok_or_else(|| invalid("set_field", "missing 'value'"))?;
        Ok(Self { field, value })
    }
}

impl Process for SetField {
    fn name(&self) -> &str {
        "set_field"
    }

    fn process_event(&mut self, mut event: Event) -> Option<Event> {
        event.set(self.field.clone(), self.value.clone());
        Some(event)
    }
}

/// Renames a field when present.
pub struct Rename {
    from: String,
    to: String,
}

impl Rename {
    fn from_params(params: &ParamMap) -> Result<Self, EngineError> {
        Ok(Self {
            from: require_str(params, "rename", "from")?,
            to: require_str(params, "rename", "to")?,
        })
    }
}

impl Process for Rename {
    fn name(&self) -> &str {
        "rename"
    }

    fn process_event(&mut self, mut event: Event) -> Option<Event> {
        if let Some(value) = event.remove(&self.from) {
            event.set(self.to.clone(), value);
        }
        Some(event)
    }
}

/// Keeps only the listed fields, in the listed order.
pub struct Select {
    fields: Vec<String>,
}

impl Select {
    fn from_params(params: &ParamMap) -> Result<Self, EngineError> {
        let fields = match params.get("fields") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    Value::Str(s) => Ok(s.clone()),
                    other => Err(invalid(
                        "select",
                        format!("'fields' entries must be strings, got {}", other.type_name()),
                    )),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(invalid("select", "'fields' must be an array")),
            None => return Err(invalid("select", "missing 'fields'")),
        };
        if fields.is_empty() {
            return Err(invalid("select", "'fields' must not be empty"));
        }
        Ok(Self { fields })
    }
}

impl Process for Select {
    fn name(&self) -> &str {
        "select"
    }

    fn process_event(&mut self, mut event: Event) -> Option<Event> {
        let mut data = millrace_core::FxIndexMap::default();
        for name in &self.fields {
            if let Some(value) = event.remove(name) {
                data.insert(name.clone(), value);
            }
        }
        event.data = data;
        Some(event)
    }
}

// ── Type stages ──

/// Guard stage: declares the event type it accepts and passes it through.
pub struct ExpectType {
    event_type: String,
}

impl ExpectType {
    fn from_params(params: &ParamMap) -> Result<Self, EngineError> {
        Ok(Self {
            event_type: require_str(params, "expect_type", "event_type")?,
        })
    }
}

impl Process for ExpectType {
    fn name(&self) -> &str {
        "expect_type"
    }

    fn input_type(&self) -> Option<&str> {
        Some(&self.event_type)
    }

    fn process_event(&mut self, event: Event) -> Option<Event> {
        Some(event)
    }
}

/// Retypes events, declaring the new type to downstream stages.
pub struct EmitAs {
    event_type: String,
}

impl EmitAs {
    fn from_params(params: &ParamMap) -> Result<Self, EngineError> {
        Ok(Self {
            event_type: require_str(params, "emit_as", "event_type")?,
        })
    }
}

impl Process for EmitAs {
    fn name(&self) -> &str {
        "emit_as"
    }

    fn output_type(&self) -> Option<&str> {
        Some(&self.event_type)
    }

    fn process_event(&mut self, mut event: Event) -> Option<Event> {
        event.event_type = Arc::from(self.event_type.as_str());
        Some(event)
    }
}

// ── Interactive stages ──

/// Prints each event to stdout. Interactive output does not interleave
/// sanely across threads, so this stage is single-worker-only.
pub struct Print {
    prefix: String,
}

impl Print {
    fn from_params(params: &ParamMap) -> Result<Self, EngineError> {
        let prefix = match params.get("prefix") {
            Some(Value::Str(s)) => format!("[{}] ", s),
            Some(v) => {
                return Err(invalid(
                    "print",
                    format!("'prefix' must be a string, got {}", v.type_name()),
                ))
            }
            None => String::new(),
        };
        Ok(Self { prefix })
    }
}

impl Process for Print {
    fn name(&self) -> &str {
        "print"
    }

    fn single_worker_only(&self) -> bool {
        true
    }

    fn process_event(&mut self, event: Event) -> Option<Event> {
        let mut fields = String::new();
        for (key, value) in &event.data {
            if !fields.is_empty() {
                fields.push_str(", ");
            }
            fields.push_str(&format!("{}={}", key, value));
        }
        println!("{}{} #{}: {}", self.prefix, event.event_type, event.id, fields);
        Some(event)
    }
}
