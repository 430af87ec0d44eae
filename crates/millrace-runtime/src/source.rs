//! Event sources
//!
//! A source yields the canonical copies of input events; the gate serializes
//! access to it and every fetched entry gets the next entry index as its
//! event identifier. Blank lines and `#` comments in event files are not
//! entries.

use crate::error::EngineError;
use crate::event::{Event, DEFAULT_EVENT_TYPE};
use millrace_core::{limits, FxIndexMap, Value};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// One underlying iterator of input events.
///
/// `fetch_next` returns `Ok(None)` at end of stream. `rewind` restarts the
/// source so the next fetch yields entry `first_entry`; the gate calls it
/// only between runs.
pub trait EventSource: Send {
    fn fetch_next(&mut self) -> Result<Option<Event>, EngineError>;

    fn rewind(&mut self, first_entry: u64) -> Result<(), EngineError>;

    /// Total number of entries, when cheaply known (used for progress).
    fn len_hint(&self) -> Option<u64> {
        None
    }
}

/// Open the configured input locations as one concatenated source.
///
/// This is the boundary to the external event-store collaborator; today it
/// understands JSONL files (one event per line).
pub fn open_input(locations: &[PathBuf]) -> Result<JsonlSource, EngineError> {
    JsonlSource::open(locations)
}

// ── In-memory source ──

/// Source over a pre-built event list. Fetches hand out clones; the canonical
/// copies stay here, which makes the source trivially rewindable.
pub struct MemorySource {
    events: Vec<Event>,
    cursor: usize,
}

impl MemorySource {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventSource for MemorySource {
    fn fetch_next(&mut self) -> Result<Option<Event>, EngineError> {
        match self.events.get(self.cursor) {
            Some(ev) => {
                let entry = self.cursor as u64;
                self.cursor += 1;
                Ok(Some(ev.clone().with_id(entry)))
            }
            None => Ok(None),
        }
    }

    fn rewind(&mut self, first_entry: u64) -> Result<(), EngineError> {
        self.cursor = first_entry as usize;
        Ok(())
    }

    fn len_hint(&self) -> Option<u64> {
        Some(self.events.len() as u64)
    }
}

// ── JSONL file source ──

/// Wire form of one event line. Two shapes are accepted:
/// a structured record `{"event_type": "Hit", "data": {...}}`, or a bare
/// field map `{"x": 1.5, "n": 2}` which becomes the payload of a
/// default-typed event.
#[derive(Deserialize)]
struct EventLine {
    #[serde(default)]
    event_type: Option<String>,
    #[serde(default)]
    data: Option<FxIndexMap<String, Value>>,
    #[serde(flatten)]
    rest: FxIndexMap<String, Value>,
}

/// Streaming JSONL reader over one or more files, in order.
///
/// Lines are read through a 64 KiB buffer and parsed one event at a time;
/// nothing is preloaded. Oversized or malformed lines are errors naming the
/// file and line, not silent skips.
pub struct JsonlSource {
    paths: Vec<PathBuf>,
    reader: Option<BufReader<File>>,
    file_idx: usize,
    line_no: u64,
    entry: u64,
    line_buffer: String,
}

impl JsonlSource {
    pub fn open(locations: &[PathBuf]) -> Result<Self, EngineError> {
        if locations.is_empty() {
            return Err(EngineError::Source("no input locations given".into()));
        }
        let mut source = Self {
            paths: locations.to_vec(),
            reader: None,
            file_idx: 0,
            line_no: 0,
            entry: 0,
            line_buffer: String::new(),
        };
        source.open_file(0)?;
        Ok(source)
    }

    fn open_file(&mut self, idx: usize) -> Result<(), EngineError> {
        let path = &self.paths[idx];
        let file = File::open(path).map_err(|e| {
            EngineError::Source(format!("failed to open {}: {}", path.display(), e))
        })?;
        debug!(file = %path.display(), "reading events");
        self.reader = Some(BufReader::with_capacity(64 * 1024, file));
        self.file_idx = idx;
        self.line_no = 0;
        Ok(())
    }

    fn current_path(&self) -> &Path {
        &self.paths[self.file_idx]
    }

    /// Read the next non-blank, non-comment line, advancing through the file
    /// list. Returns `None` when every file is exhausted.
    fn next_line(&mut self) -> Result<Option<()>, EngineError> {
        loop {
            let reader = match self.reader.as_mut() {
                Some(r) => r,
                None => return Ok(None),
            };
            self.line_buffer.clear();
            let n = reader.read_line(&mut self.line_buffer)?;
            if n == 0 {
                if self.file_idx + 1 < self.paths.len() {
                    let next = self.file_idx + 1;
                    self.open_file(next)?;
                    continue;
                }
                self.reader = None;
                return Ok(None);
            }
            self.line_no += 1;
            if self.line_buffer.len() > limits::MAX_LINE_LENGTH {
                return Err(EngineError::Source(format!(
                    "{}:{}: line exceeds {} bytes",
                    self.current_path().display(),
                    self.line_no,
                    limits::MAX_LINE_LENGTH
                )));
            }
            let trimmed = self.line_buffer.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            return Ok(Some(()));
        }
    }

    fn parse_current_line(&self) -> Result<Event, EngineError> {
        let trimmed = self.line_buffer.trim();
        let line: EventLine = serde_json::from_str(trimmed).map_err(|e| {
            EngineError::Source(format!(
                "{}:{}: {}",
                self.current_path().display(),
                self.line_no,
                e
            ))
        })?;

        let data = match line.data {
            Some(data) => data,
            None => line.rest,
        };
        if data.len() > limits::MAX_FIELDS_PER_EVENT {
            return Err(EngineError::Source(format!(
                "{}:{}: event has {} fields (max {})",
                self.current_path().display(),
                self.line_no,
                data.len(),
                limits::MAX_FIELDS_PER_EVENT
            )));
        }
        for (name, value) in &data {
            if let Value::Array(items) = value {
                if items.len() > limits::MAX_ARRAY_ELEMENTS {
                    return Err(EngineError::Source(format!(
                        "{}:{}: array field '{}' has {} elements (max {})",
                        self.current_path().display(),
                        self.line_no,
                        name,
                        items.len(),
                        limits::MAX_ARRAY_ELEMENTS
                    )));
                }
            }
        }

        let event_type: Arc<str> = match line.event_type {
            Some(t) => Arc::from(t.as_str()),
            None => Arc::from(DEFAULT_EVENT_TYPE),
        };
        Ok(Event::from_fields(event_type, data))
    }
}

impl EventSource for JsonlSource {
    fn fetch_next(&mut self) -> Result<Option<Event>, EngineError> {
        if self.next_line()?.is_none() {
            return Ok(None);
        }
        let event = self.parse_current_line()?;
        let entry = self.entry;
        self.entry += 1;
        Ok(Some(event.with_id(entry)))
    }

    fn rewind(&mut self, first_entry: u64) -> Result<(), EngineError> {
        self.open_file(0)?;
        self.entry = 0;
        // Entries are counted, not byte-addressed; skip by reading.
        for _ in 0..first_entry {
            if self.next_line()?.is_none() {
                break;
            }
            self.entry += 1;
        }
        Ok(())
    }
}
