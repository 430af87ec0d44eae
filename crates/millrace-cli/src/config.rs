//! Run file support for Millrace
//!
//! A run file bundles everything one invocation needs: the input files,
//! the engine settings with the process chain, and where the output table
//! goes. Both YAML and TOML are supported.
//!
//! # Example YAML run file:
//! ```yaml
//! # Millrace run file
//!
//! inputs:
//!   - data/readings.jsonl
//!
//! engine:
//!   workers: 4
//!   ordered: true
//!   chain:
//!     - type: scale
//!       params: { field: flux, factor: 1.5 }
//!     - type: threshold_cut
//!       params: { field: flux, min: 0.0 }
//!
//! output:
//!   path: results.csv
//!   format: csv
//! ```

use millrace_runtime::{EngineConfig, ProcessSpec};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main run file structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RunFile {
    /// Input files (JSON Lines), consumed in order as one stream
    pub inputs: Vec<PathBuf>,

    /// Engine configuration (pool size, ordering, process chain)
    pub engine: EngineConfig,

    /// Output configuration
    pub output: OutputConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Output file path (stdout if not set)
    pub path: Option<PathBuf>,

    /// Output format
    pub format: OutputFormat,
}

/// How the committed table is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Aligned text table
    #[default]
    Table,
    /// Comma separated values with a header row
    Csv,
    /// One JSON object per row
    Jsonl,
}

impl OutputFormat {
    /// Parse a format name as given on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "table" | "txt" => Some(Self::Table),
            "csv" => Some(Self::Csv),
            "jsonl" | "json" => Some(Self::Jsonl),
            _ => None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Include timestamps
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            timestamps: true,
        }
    }
}

impl RunFile {
    /// Load a run file (YAML or TOML, auto-detected by extension)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml(&content),
            "toml" => Self::from_toml(&content),
            _ => {
                // Try YAML first, then TOML
                Self::from_yaml(&content).or_else(|_| Self::from_toml(&content))
            }
        }
    }

    /// Parse a run file from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse a run file from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Create an example run file
    pub fn example() -> Self {
        Self {
            inputs: vec![PathBuf::from("data/readings.jsonl")],
            engine: EngineConfig {
                workers: 4,
                chain: vec![
                    ProcessSpec::new("scale")
                        .with_param("field", "flux")
                        .with_param("factor", 1.5),
                    ProcessSpec::new("threshold_cut")
                        .with_param("field", "flux")
                        .with_param("min", 0.0),
                    ProcessSpec::new("emit_as").with_param("event_type", "Calibrated"),
                ],
                ..EngineConfig::default()
            },
            output: OutputConfig {
                path: Some(PathBuf::from("results.csv")),
                format: OutputFormat::Csv,
            },
            logging: LoggingConfig::default(),
        }
    }

    /// Generate an example YAML run file
    pub fn example_yaml() -> String {
        serde_yaml::to_string(&Self::example()).unwrap_or_default()
    }

    /// Generate an example TOML run file
    pub fn example_toml() -> String {
        toml::to_string_pretty(&Self::example()).unwrap_or_default()
    }
}

/// Run file error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read run file {0}: {1}")]
    IoError(PathBuf, String),

    #[error("Failed to parse run file: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_run_file() {
        let run_file = RunFile::default();
        assert!(run_file.inputs.is_empty());
        assert_eq!(run_file.engine.workers, 1);
        assert_eq!(run_file.output.format, OutputFormat::Table);
        assert_eq!(run_file.logging.level, "info");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
inputs:
  - events.jsonl
engine:
  workers: 8
  ordered: false
  chain:
    - type: scale
      params: { field: x, factor: 2.0 }
    - type: modulo_cut
      params: { every: 3 }
output:
  format: jsonl
"#;
        let run_file = RunFile::from_yaml(yaml).unwrap();
        assert_eq!(run_file.inputs, vec![PathBuf::from("events.jsonl")]);
        assert_eq!(run_file.engine.workers, 8);
        assert!(!run_file.engine.ordered);
        assert_eq!(run_file.engine.chain.len(), 2);
        assert_eq!(run_file.engine.chain[0].type_name, "scale");
        assert_eq!(run_file.output.format, OutputFormat::Jsonl);
        assert!(run_file.output.path.is_none());
    }

    #[test]
    fn test_toml_parsing() {
        let toml = r#"
inputs = ["events.jsonl", "more.jsonl"]

[engine]
workers = 4
max_events = 1000

[[engine.chain]]
type = "shift"

[engine.chain.params]
field = "x"
offset = -3.5

[output]
path = "out.csv"
format = "csv"
"#;
        let run_file = RunFile::from_toml(toml).unwrap();
        assert_eq!(run_file.inputs.len(), 2);
        assert_eq!(run_file.engine.workers, 4);
        assert_eq!(run_file.engine.max_events, Some(1000));
        assert_eq!(run_file.engine.chain.len(), 1);
        assert_eq!(run_file.engine.chain[0].type_name, "shift");
        assert_eq!(run_file.output.path, Some(PathBuf::from("out.csv")));
        assert_eq!(run_file.output.format, OutputFormat::Csv);
    }

    #[test]
    fn test_format_from_name() {
        assert_eq!(OutputFormat::from_name("CSV"), Some(OutputFormat::Csv));
        assert_eq!(OutputFormat::from_name("jsonl"), Some(OutputFormat::Jsonl));
        assert_eq!(OutputFormat::from_name("table"), Some(OutputFormat::Table));
        assert_eq!(OutputFormat::from_name("parquet"), None);
    }

    #[test]
    fn test_example_parses_back() {
        let yaml = RunFile::example_yaml();
        let parsed = RunFile::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.engine.chain.len(), 3);
        assert_eq!(parsed.output.format, OutputFormat::Csv);
    }
}
