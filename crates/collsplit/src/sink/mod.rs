//! Output sinks.
//!
//! A sink receives the rows of one partition. Sinks are created unopened and
//! go through open/close cycles driven by the resource pool:
//!
//! ```text
//! unopened --open--> open --commit/close--> closed --open--> open ...
//! ```
//!
//! The pool's final commit is terminal: after teardown the sink is dropped.

mod file;
mod memory;
mod metadata;

pub use file::{FileSink, FileSinkFactory};
pub use memory::{MemorySink, MemorySinkFactory, MemorySinkHandle};
pub use metadata::SinkMetadata;

use serde::Serialize;

use crate::error::SinkError;
use crate::record::Row;

/// Identity of a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkDescription {
    /// Partition (sub-collection) name.
    pub name: String,
    /// Name of the destination reference column.
    pub reference_column: String,
}

impl SinkDescription {
    pub fn new(name: impl Into<String>, reference_column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference_column: reference_column.into(),
        }
    }
}

/// A partition output.
///
/// `open` on an open sink and `close` on a closed sink are no-ops. Rows may
/// only be inserted while the sink is open.
pub trait Sink: Send {
    fn description(&self) -> &SinkDescription;

    /// Open (or reopen) the sink for writing.
    fn open(&mut self) -> Result<(), SinkError>;

    /// Close the sink. Rows written so far are handed to the underlying
    /// storage but not necessarily made durable.
    fn close(&mut self) -> Result<(), SinkError>;

    /// Make every row written so far durable.
    fn commit(&mut self) -> Result<(), SinkError>;

    fn is_open(&self) -> bool;

    /// Append a row.
    fn insert_row(&mut self, row: Row) -> Result<(), SinkError>;

    /// Number of rows the sink may hold in memory before writing them out.
    /// Zero writes every row immediately.
    fn set_write_cache_size(&mut self, rows: usize);
}

/// Creates sinks for planned partitions.
pub trait SinkFactory {
    /// Create an unopened sink.
    fn create(&mut self, description: SinkDescription) -> Result<Box<dyn Sink>, SinkError>;
}
