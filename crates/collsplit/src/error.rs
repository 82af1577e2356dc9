//! Error types for the collection splitter.

use std::path::PathBuf;

use snafu::prelude::*;

// Re-export common errors
pub use collsplit_core::error::ConfigError;

/// Errors that can occur while reading records from a source.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// Failed to open the source file.
    #[snafu(display("Failed to open source {}: {source}", path.display()))]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to set up decompression for the source file.
    #[snafu(display("Failed to decompress {} ({codec}): {source}", path.display()))]
    Decompression {
        path: PathBuf,
        codec: &'static str,
        source: std::io::Error,
    },

    /// Failed to read a line.
    #[snafu(display("Failed to read {} at line {line}: {source}", path.display()))]
    ReadLine {
        path: PathBuf,
        line: usize,
        source: std::io::Error,
    },

    /// A line is not a valid record.
    #[snafu(display("Invalid record in {} at line {line}: {source}", path.display()))]
    ParseRecord {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
}

/// Errors that can occur while writing to a sink.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// Failed to create or open the output file.
    #[snafu(display("Failed to open output {}: {source}", path.display()))]
    CreateOutput {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write or sync the output file.
    #[snafu(display("Failed to write output {}: {source}", path.display()))]
    WriteOutput {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to serialize a row.
    #[snafu(display("Failed to serialize row for '{name}': {source}"))]
    SerializeRow {
        name: String,
        source: serde_json::Error,
    },

    /// Failed to write the metadata sidecar.
    #[snafu(display("Failed to write metadata {}: {source}", path.display()))]
    WriteMetadata {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read a metadata sidecar back.
    #[snafu(display("Failed to read metadata {}: {source}", path.display()))]
    ReadMetadata {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to serialize the metadata sidecar.
    #[snafu(display("Failed to serialize metadata for '{name}': {source}"))]
    SerializeMetadata {
        name: String,
        source: serde_json::Error,
    },

    /// The partition name cannot be used as an output file name.
    #[snafu(display("Invalid partition name '{name}'"))]
    InvalidName { name: String },

    /// A row was inserted while the sink was not open.
    #[snafu(display("Sink '{name}' is not open"))]
    NotOpen { name: String },
}

/// Errors raised by the resource pool.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PoolError {
    /// The key is already registered; the planner assigned it twice.
    #[snafu(display("Partition key '{key}' is already registered with the pool"))]
    DuplicateKey { key: String },

    /// The key was never registered.
    #[snafu(display("Partition key '{key}' is not registered with the pool"))]
    UnknownKey { key: String },

    /// The sink id does not belong to this pool.
    #[snafu(display("Sink #{id} is not registered with the pool"))]
    UnknownSink { id: usize },

    /// A sink operation failed.
    #[snafu(display("Sink '{name}' failed: {source}"))]
    SinkFailed { name: String, source: SinkError },
}

/// Top-level splitter errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SplitError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// The key lookup file could not be read.
    #[snafu(display("Failed to read key lookup file {}: {source}", path.display()))]
    Lookup {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Source error.
    #[snafu(display("Source error: {source}"))]
    Source { source: SourceError },

    /// Sink creation error.
    #[snafu(display("Sink error: {source}"))]
    Sink { source: SinkError },

    /// Resource pool error.
    #[snafu(display("Pool error: {source}"))]
    Pool { source: PoolError },

    /// A record lacks the reference field used for splitting.
    #[snafu(display(
        "Record {record} of '{source_name}' has no reference field '{field}'"
    ))]
    SchemaMismatch {
        field: String,
        source_name: String,
        record: u64,
    },

    /// Pass 2 produced a key that pass 1 never saw.
    #[snafu(display(
        "Key '{key}' in '{source_name}' was not seen while planning; the source changed between passes"
    ))]
    UnknownKeyAtWriteTime { key: String, source_name: String },

    /// Failed to render the plan report.
    #[snafu(display("Failed to render plan report: {source}"))]
    Report { source: serde_json::Error },
}

impl From<ConfigError> for SplitError {
    fn from(source: ConfigError) -> Self {
        SplitError::Config { source }
    }
}

impl From<SourceError> for SplitError {
    fn from(source: SourceError) -> Self {
        SplitError::Source { source }
    }
}

impl From<SinkError> for SplitError {
    fn from(source: SinkError) -> Self {
        SplitError::Sink { source }
    }
}

impl From<PoolError> for SplitError {
    fn from(source: PoolError) -> Self {
        SplitError::Pool { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_key_message_names_source() {
        let err = SplitError::UnknownKeyAtWriteTime {
            key: "ABC".into(),
            source_name: "events.ndjson".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ABC"));
        assert!(msg.contains("events.ndjson"));
    }

    #[test]
    fn test_pool_error_converts() {
        let err: SplitError = PoolError::DuplicateKey { key: "K".into() }.into();
        assert!(matches!(
            err,
            SplitError::Pool {
                source: PoolError::DuplicateKey { .. }
            }
        ));
    }
}
