//! Split pipeline.
//!
//! A run splits one or more sources. For each source:
//!
//! 1. **Plan**: one pass over the source tallies records per key and groups
//!    keys into partitions ([`PartitionPlanner`]).
//! 2. **Sinks**: one unopened sink per planned partition is created and
//!    registered with a [`ResourcePool`] under every key of the partition.
//! 3. **Write**: a second pass routes each record to its partition's sink
//!    through the pool ([`PartitionWriter`]).
//! 4. **Teardown**: the pool flushes, commits and closes every sink.
//!
//! The key lookup and the name sequence are shared by all sources of a run.

mod lookup;
mod naming;
mod planner;
mod pool;
mod writer;

pub use lookup::KeyLookup;
pub use naming::{NameSequence, SUB_COLLECTION_PREFIX, is_valid_name};
pub use planner::{DEFAULT_MAX_PARTITIONS, KeyCounts, PartitionPlan, PartitionPlanner, PlannedPartition};
pub use pool::{
    DEFAULT_MAX_OPEN, DEFAULT_ROWS_CACHED, MIN_MAX_OPEN, PoolStats, ResourcePool, SinkId,
};
pub use writer::PartitionWriter;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use snafu::prelude::*;
use tracing::{info, warn};

use collsplit_core::emit;
use collsplit_core::metrics::events::SourceSplitCompleted;

use crate::error::{ReportSnafu, SplitError};
use crate::sink::{SinkDescription, SinkFactory};
use crate::source::RecordSource;

/// Tunables for a split run.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitOptions {
    /// Key lookup file, loaded once per run.
    pub guid_file: Option<PathBuf>,
    /// Ceiling on synthesized partitions per source.
    pub max_split: usize,
    /// Pending buffer length that triggers a flush.
    pub rows_cached: usize,
    /// Minimum records per synthesized partition.
    pub min_events: Option<u64>,
    /// Column holding the partition key. Defaults to the source's primary
    /// reference column.
    pub split_ref: Option<String>,
    /// Destination reference column. Defaults to the source's primary
    /// reference column.
    pub dst_ref: Option<String>,
    pub max_open: usize,
    /// Commit a sink every this many rows.
    pub events_per_commit: Option<u64>,
    /// Sink-side write cache.
    pub sink_rows_cached: usize,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            guid_file: None,
            max_split: DEFAULT_MAX_PARTITIONS,
            rows_cached: DEFAULT_ROWS_CACHED,
            min_events: None,
            split_ref: None,
            dst_ref: None,
            max_open: DEFAULT_MAX_OPEN,
            events_per_commit: None,
            sink_rows_cached: 0,
        }
    }
}

/// Outcome of splitting one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub source: String,
    /// Records counted while planning.
    pub records: u64,
    /// Rows routed to sinks.
    pub rows_written: u64,
    pub keys: usize,
    pub partitions: usize,
    pub mapped_partitions: usize,
    pub synthesized_partitions: usize,
    pub pool: PoolStats,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SplitSummary {
    pub sources: Vec<SourceSummary>,
}

impl SplitSummary {
    pub fn total_records(&self) -> u64 {
        self.sources.iter().map(|s| s.records).sum()
    }

    pub fn total_rows_written(&self) -> u64 {
        self.sources.iter().map(|s| s.rows_written).sum()
    }

    pub fn total_partitions(&self) -> usize {
        self.sources.iter().map(|s| s.partitions).sum()
    }

    /// Pool counters across all sources.
    pub fn pool_stats(&self) -> PoolStats {
        let mut stats = PoolStats::default();
        for source in &self.sources {
            stats.merge(&source.pool);
        }
        stats
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Plan of one source, as reported by a dry run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcePlan {
    pub source: String,
    pub split_ref: String,
    pub dst_ref: String,
    #[serde(flatten)]
    pub plan: PartitionPlan,
}

/// Plans of every source of a dry run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanReport {
    pub sources: Vec<SourcePlan>,
}

impl PlanReport {
    pub fn to_json(&self) -> Result<String, SplitError> {
        serde_json::to_string_pretty(self).context(ReportSnafu)
    }
}

/// Drives a split run over a list of sources.
pub struct Splitter<F> {
    options: SplitOptions,
    factory: F,
    lookup: Option<KeyLookup>,
    names: NameSequence,
}

impl<F: SinkFactory> Splitter<F> {
    pub fn new(options: SplitOptions, factory: F) -> Self {
        Self {
            options,
            factory,
            lookup: None,
            names: NameSequence::new(),
        }
    }

    /// Use an in-memory lookup instead of `guid_file`.
    pub fn with_lookup(mut self, lookup: KeyLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn options(&self) -> &SplitOptions {
        &self.options
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Split every source in order.
    pub fn run(&mut self, sources: &[&dyn RecordSource]) -> Result<SplitSummary, SplitError> {
        self.load_lookup()?;

        let mut summary = SplitSummary::default();
        let mut first_ref: Option<&str> = None;
        for &source in sources {
            warn_on_schema_drift(&mut first_ref, source);
            summary.sources.push(self.split_source(source)?);
        }

        let pool = summary.pool_stats();
        info!(
            sources = summary.sources.len(),
            records = summary.total_records(),
            partitions = summary.total_partitions(),
            opens = pool.opens,
            evictions = pool.evictions,
            "Split completed"
        );
        Ok(summary)
    }

    /// Plan every source without writing anything.
    pub fn plan_only(&mut self, sources: &[&dyn RecordSource]) -> Result<PlanReport, SplitError> {
        self.load_lookup()?;

        let mut report = PlanReport::default();
        let mut first_ref: Option<&str> = None;
        for &source in sources {
            warn_on_schema_drift(&mut first_ref, source);
            let (split_ref, dst_ref) = self.refs_for(source);
            let plan = self.plan_source(source, &split_ref)?;
            report.sources.push(SourcePlan {
                source: source.name().to_string(),
                split_ref,
                dst_ref,
                plan,
            });
        }
        Ok(report)
    }

    fn load_lookup(&mut self) -> Result<(), SplitError> {
        if self.lookup.is_some() {
            return Ok(());
        }
        let lookup = match &self.options.guid_file {
            Some(path) => KeyLookup::load(path, &mut self.names)?,
            None => KeyLookup::new(),
        };
        self.lookup = Some(lookup);
        Ok(())
    }

    fn refs_for(&self, source: &dyn RecordSource) -> (String, String) {
        let primary = source.primary_ref();
        let split_ref = self.options.split_ref.as_deref().unwrap_or(primary);
        let dst_ref = self.options.dst_ref.as_deref().unwrap_or(primary);
        (split_ref.to_string(), dst_ref.to_string())
    }

    fn plan_source(&mut self, source: &dyn RecordSource, split_ref: &str) -> Result<PartitionPlan, SplitError> {
        let planner = PartitionPlanner::new(self.options.min_events, self.options.max_split);
        let empty = KeyLookup::new();
        let lookup = self.lookup.as_ref().unwrap_or(&empty);
        let plan = planner.plan(source, split_ref, lookup, &mut self.names)?;

        for partition in plan.partitions() {
            info!(
                source = source.name(),
                partition = %partition.name,
                origin = partition.origin.as_str(),
                records = partition.records,
                keys = %partition.keys.join(", "),
                "Created sub-collection"
            );
        }
        info!(
            source = source.name(),
            records = plan.total_records(),
            keys = plan.key_count(),
            partitions = plan.partitions().len(),
            "Planned source"
        );
        Ok(plan)
    }

    fn split_source(&mut self, source: &dyn RecordSource) -> Result<SourceSummary, SplitError> {
        let start = Instant::now();
        let (split_ref, dst_ref) = self.refs_for(source);
        let plan = self.plan_source(source, &split_ref)?;

        let mut pool = ResourcePool::new(source.name(), self.options.max_open, self.options.rows_cached)
            .with_commit_interval(self.options.events_per_commit);

        for partition in plan.partitions() {
            let mut keys = partition.keys.iter();
            let Some(first) = keys.next() else {
                continue;
            };
            let mut sink = self
                .factory
                .create(SinkDescription::new(&partition.name, &dst_ref))?;
            sink.set_write_cache_size(self.options.sink_rows_cached);

            let id = pool.add_sink(first.as_str(), sink)?;
            for key in keys {
                pool.add_alias(key.as_str(), id)?;
            }
        }

        let rows_written = PartitionWriter::new(&plan, &split_ref, &dst_ref).write(source, &mut pool)?;
        let stats = pool.finish()?;

        let duration = start.elapsed();
        emit!(SourceSplitCompleted {
            duration,
            target: source.name().to_string(),
        });
        info!(
            source = source.name(),
            rows = rows_written,
            partitions = plan.partitions().len(),
            duration_ms = duration.as_millis() as u64,
            "Source split"
        );

        Ok(SourceSummary {
            source: source.name().to_string(),
            records: plan.total_records(),
            rows_written,
            keys: plan.key_count(),
            partitions: plan.partitions().len(),
            mapped_partitions: plan.mapped_count(),
            synthesized_partitions: plan.synthesized_count(),
            pool: stats,
            duration,
        })
    }
}

/// Sources of one run are expected to share a primary reference column.
fn warn_on_schema_drift<'s>(first_ref: &mut Option<&'s str>, source: &'s dyn RecordSource) {
    let primary = source.primary_ref();
    match *first_ref {
        None => *first_ref = Some(primary),
        Some(first) if first != primary => warn!(
            source = source.name(),
            primary_ref = primary,
            expected = first,
            "Source schema differs from the first source"
        ),
        Some(_) => {}
    }
}
