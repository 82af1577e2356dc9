//! Error types shared by the collsplit crates.

use std::path::PathBuf;

use snafu::prelude::*;

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// No input source was configured.
    #[snafu(display("At least one source must be configured"))]
    NoSources,

    /// A source entry has an empty path.
    #[snafu(display("Source #{index} has an empty path"))]
    EmptySourcePath { index: usize },

    /// Output directory is empty.
    #[snafu(display("Output directory cannot be empty"))]
    EmptyOutputDir,

    /// A numeric option is outside its allowed range.
    #[snafu(display("Invalid value for '{option}': {message}"))]
    InvalidOption { option: String, message: String },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Unsupported config file format.
    #[snafu(display("Unsupported config format for {}: only .yaml/.yml supported", path.display()))]
    UnsupportedFormat { path: PathBuf },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization and export.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Recorder already installed (double-init attempted).
    #[snafu(display("Metrics recorder already initialized"))]
    AlreadyInitialized,

    /// Controller accessed before init.
    #[snafu(display("Metrics recorder not initialized"))]
    NotInitialized,

    /// Failed to write the metrics snapshot.
    #[snafu(display("Failed to write metrics snapshot to {}: {source}", path.display()))]
    WriteSnapshot {
        path: PathBuf,
        source: std::io::Error,
    },
}
