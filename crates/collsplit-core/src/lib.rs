//! collsplit-core: Shared plumbing for the collsplit collection splitter.
//!
//! This crate holds the pieces that are not specific to partitioning:
//!
//! - `config/` - YAML loading with environment variable interpolation
//! - `metrics/` - Internal events, the `emit!` macro and the Prometheus recorder
//! - `error` - Configuration and metrics error types
//! - `tracing` - Subscriber initialization for the CLI

pub mod config;
pub mod error;
pub mod metrics;
pub mod tracing;

// Re-export commonly used items
pub use config::{InterpolationResult, MetricsConfig, interpolate, load_yaml, parse_yaml};
pub use error::{ConfigError, MetricsError};
pub use metrics::{MetricsController, init_global as init_metrics};
pub use tracing::init_tracing;
