//! Internal events for collsplit metrics emission.
//!
//! Each event struct represents a measurable occurrence while splitting a
//! collection. Events implement `InternalEvent`, which records the metric.
//!
//! Metrics carry a `target` label naming the input collection being split.

use std::time::Duration;

use metrics::{counter, gauge, histogram};
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Records read from a source during the planning pass.
pub struct RecordsScanned {
    pub count: u64,
    pub target: String,
}

impl InternalEvent for RecordsScanned {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Records scanned");
        counter!("collsplit_records_scanned_total", "target" => self.target).increment(self.count);
    }
}

/// Where a planned partition's name came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionOrigin {
    /// Named by the key lookup file.
    Mapped,
    /// Named from the run's sequence.
    Synthesized,
}

impl PartitionOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionOrigin::Mapped => "mapped",
            PartitionOrigin::Synthesized => "synthesized",
        }
    }
}

/// Partitions created by the planner.
pub struct PartitionsPlanned {
    pub count: u64,
    pub origin: PartitionOrigin,
    pub target: String,
}

impl InternalEvent for PartitionsPlanned {
    fn emit(self) {
        trace!(count = self.count, origin = self.origin.as_str(), target = %self.target, "Partitions planned");
        counter!(
            "collsplit_partitions_planned_total",
            "origin" => self.origin.as_str(),
            "target" => self.target
        )
        .increment(self.count);
    }
}

/// Rows written into a sink (directly or from a flushed buffer).
pub struct RowsWritten {
    pub count: u64,
    pub target: String,
}

impl InternalEvent for RowsWritten {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Rows written");
        counter!("collsplit_rows_written_total", "target" => self.target).increment(self.count);
    }
}

/// A row parked in a pending buffer because its sink was not open.
pub struct RowBuffered {
    pub target: String,
}

impl InternalEvent for RowBuffered {
    fn emit(self) {
        counter!("collsplit_rows_buffered_total", "target" => self.target).increment(1);
    }
}

/// A sink was opened (first open or reopen).
pub struct SinkOpened {
    pub target: String,
}

impl InternalEvent for SinkOpened {
    fn emit(self) {
        trace!(target = %self.target, "Sink opened");
        counter!("collsplit_sink_opens_total", "target" => self.target).increment(1);
    }
}

/// An open sink was committed and closed to make room for another.
pub struct SinkEvicted {
    pub target: String,
}

impl InternalEvent for SinkEvicted {
    fn emit(self) {
        trace!(target = %self.target, "Sink evicted");
        counter!("collsplit_sink_evictions_total", "target" => self.target).increment(1);
    }
}

/// A sink commit.
pub struct SinkCommitted {
    pub target: String,
}

impl InternalEvent for SinkCommitted {
    fn emit(self) {
        counter!("collsplit_sink_commits_total", "target" => self.target).increment(1);
    }
}

/// Current number of sinks open in a pool.
pub struct OpenSinks {
    pub count: usize,
    pub target: String,
}

impl InternalEvent for OpenSinks {
    fn emit(self) {
        gauge!("collsplit_open_sinks", "target" => self.target).set(self.count as f64);
    }
}

/// A source finished splitting.
pub struct SourceSplitCompleted {
    pub duration: Duration,
    pub target: String,
}

impl InternalEvent for SourceSplitCompleted {
    fn emit(self) {
        trace!(duration_ms = self.duration.as_millis() as u64, target = %self.target, "Source split completed");
        histogram!("collsplit_source_split_duration_seconds", "target" => self.target)
            .record(self.duration.as_secs_f64());
    }
}
