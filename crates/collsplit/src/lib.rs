//! collsplit: split event collections into sub-collections by file GUID.
//!
//! This crate handles:
//! - Reading NDJSON record files (plain, gzip or zstd)
//! - Planning sub-collections from per-GUID event counts and an optional
//!   GUID lookup file
//! - Writing every event to its sub-collection while keeping the number of
//!   open outputs bounded
//! - Committing outputs with a `.meta.json` sidecar

pub mod config;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod sink;
pub mod source;

// Re-export commonly used items
pub use config::{CliArgs, Config};
pub use error::SplitError;
pub use pipeline::{PlanReport, SplitOptions, SplitSummary, Splitter};
pub use record::{Record, Row, Token};
pub use sink::{FileSinkFactory, Sink, SinkFactory};
pub use source::{NdjsonSource, RecordSource};

// Re-export from collsplit-core
pub use collsplit_core::{MetricsController, init_metrics, init_tracing};

/// Result of a CLI run.
#[derive(Debug)]
pub enum RunOutcome {
    /// Sub-collections were written.
    Split(SplitSummary),
    /// Dry run: only the plan was computed.
    Planned(PlanReport),
}

/// Run the configured split.
///
/// With `dry_run`, every source is planned and nothing is written.
pub fn run(config: &Config, dry_run: bool) -> Result<RunOutcome, SplitError> {
    let sources = config.record_sources();
    let sources: Vec<&dyn RecordSource> = sources.iter().map(|s| s as &dyn RecordSource).collect();

    let mut factory = FileSinkFactory::new(&config.output.dir)
        .with_metadata(config.output.metadata.clone());
    if !config.output.write_metadata {
        factory = factory.without_metadata();
    }

    let mut splitter = Splitter::new(config.split_options(), factory);
    if dry_run {
        splitter.plan_only(&sources).map(RunOutcome::Planned)
    } else {
        splitter.run(&sources).map(RunOutcome::Split)
    }
}
