//! Configuration for collsplit.
//!
//! A run is configured from a YAML file, command-line flags, or both; flags
//! take precedence over file values.
//!
//! ```yaml
//! sources:
//!   - path: events.ndjson.gz
//! output:
//!   dir: ./out
//! split:
//!   guid_file: guids.txt
//!   min_events: 1000
//! ```

mod cli;

pub use cli::CliArgs;
pub use collsplit_core::config::MetricsConfig;

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use collsplit_core::config::{load_yaml, parse_yaml};

use crate::error::ConfigError;
use crate::pipeline::{
    DEFAULT_MAX_OPEN, DEFAULT_MAX_PARTITIONS, DEFAULT_ROWS_CACHED, SplitOptions,
};
use crate::source::{CompressionFormat, DEFAULT_PRIMARY_REF, NdjsonSource};

/// One input collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Path to an NDJSON record file.
    pub path: PathBuf,
    #[serde(default)]
    pub compression: CompressionFormat,
    /// Name of the source's primary reference column.
    #[serde(default = "default_primary_ref")]
    pub primary_ref: String,
}

impl SourceConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            compression: CompressionFormat::Auto,
            primary_ref: default_primary_ref(),
        }
    }

    /// Build the record source for this entry.
    pub fn to_source(&self) -> NdjsonSource {
        NdjsonSource::new(&self.path)
            .with_compression(self.compression)
            .with_primary_ref(&self.primary_ref)
    }
}

fn default_primary_ref() -> String {
    DEFAULT_PRIMARY_REF.to_string()
}

/// Where and how sub-collections are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory receiving `<name>.ndjson` and `<name>.meta.json` files.
    pub dir: PathBuf,
    /// Destination reference column. Defaults to each source's primary
    /// reference column.
    #[serde(default)]
    pub dst_ref: Option<String>,
    /// Rows each sink may hold in memory before writing.
    #[serde(default)]
    pub sink_rows_cached: usize,
    #[serde(default = "default_write_metadata")]
    pub write_metadata: bool,
    /// Extra key/values stored in every metadata sidecar.
    #[serde(default)]
    pub metadata: IndexMap<String, String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::new(),
            dst_ref: None,
            sink_rows_cached: 0,
            write_metadata: default_write_metadata(),
            metadata: IndexMap::new(),
        }
    }
}

fn default_write_metadata() -> bool {
    true
}

/// Partitioning and pooling limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitConfig {
    /// Key lookup file.
    #[serde(default)]
    pub guid_file: Option<PathBuf>,
    /// Ceiling on synthesized sub-collections per source (at least 1).
    #[serde(default = "default_max_split")]
    pub max_split: usize,
    /// Pending buffer length that opens a sink.
    #[serde(default = "default_rows_cached")]
    pub rows_cached: usize,
    /// Minimum records per synthesized sub-collection.
    #[serde(default)]
    pub min_events: Option<u64>,
    /// Column holding the partition key.
    #[serde(default)]
    pub split_ref: Option<String>,
    /// Most sinks open at once (at least 2).
    #[serde(default = "default_max_open")]
    pub max_open: usize,
    /// Commit each sink every this many rows.
    #[serde(default)]
    pub events_per_commit: Option<u64>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            guid_file: None,
            max_split: default_max_split(),
            rows_cached: default_rows_cached(),
            min_events: None,
            split_ref: None,
            max_open: default_max_open(),
            events_per_commit: None,
        }
    }
}

fn default_max_split() -> usize {
    DEFAULT_MAX_PARTITIONS
}

fn default_rows_cached() -> usize {
    DEFAULT_ROWS_CACHED
}

fn default_max_open() -> usize {
    DEFAULT_MAX_OPEN
}

/// Main configuration for collsplit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Input collections, split in order.
    pub sources: Vec<SourceConfig>,
    pub output: OutputConfig,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config: Config = load_yaml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = parse_yaml(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the configuration for a CLI invocation: the `--config` file (if
    /// any) with flag overrides applied, then validated.
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => load_yaml(path)?,
            None => Config::default(),
        };
        args.apply_to(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        for (index, source) in self.sources.iter().enumerate() {
            if source.path.as_os_str().is_empty() {
                return Err(ConfigError::EmptySourcePath { index });
            }
            if source.primary_ref.is_empty() {
                return Err(invalid("sources.primary_ref", "must not be empty"));
            }
        }
        if self.output.dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyOutputDir);
        }
        if self.split.rows_cached == 0 {
            return Err(invalid("split.rows_cached", "must be at least 1"));
        }
        if self.split.events_per_commit == Some(0) {
            return Err(invalid("split.events_per_commit", "must be at least 1"));
        }
        if self.split.split_ref.as_deref() == Some("") {
            return Err(invalid("split.split_ref", "must not be empty"));
        }
        if self.output.dst_ref.as_deref() == Some("") {
            return Err(invalid("output.dst_ref", "must not be empty"));
        }
        Ok(())
    }

    /// Record sources, in configuration order.
    pub fn record_sources(&self) -> Vec<NdjsonSource> {
        self.sources.iter().map(SourceConfig::to_source).collect()
    }

    /// Splitter options derived from the `split` and `output` sections.
    pub fn split_options(&self) -> SplitOptions {
        SplitOptions {
            guid_file: self.split.guid_file.clone(),
            max_split: self.split.max_split,
            rows_cached: self.split.rows_cached,
            min_events: self.split.min_events,
            split_ref: self.split.split_ref.clone(),
            dst_ref: self.output.dst_ref.clone(),
            max_open: self.split.max_open,
            events_per_commit: self.split.events_per_commit,
            sink_rows_cached: self.output.sink_rows_cached,
        }
    }
}

fn invalid(option: &str, message: &str) -> ConfigError {
    ConfigError::InvalidOption {
        option: option.to_string(),
        message: message.to_string(),
    }
}
