//! Record sources.
//!
//! A source is a replayable collection of records: every call to
//! [`RecordSource::records`] starts an independent pass that yields the same
//! records in the same order. The splitter reads each source twice, once to
//! plan and once to write.

mod compression;
mod ndjson;

pub use compression::{CompressionCodec, CompressionFormat, GzipCodec, NoopCodec, ZstdCodec};
pub use ndjson::NdjsonSource;

use crate::error::SourceError;
use crate::record::Record;

/// Default name of a source's primary reference column.
pub const DEFAULT_PRIMARY_REF: &str = "Token";

/// Iterator over one pass of a source.
pub type RecordIter<'a> = Box<dyn Iterator<Item = Result<Record, SourceError>> + 'a>;

/// A replayable, read-only collection of records.
pub trait RecordSource {
    /// Name used in logs, metrics and errors.
    fn name(&self) -> &str;

    /// Name of the primary reference column.
    fn primary_ref(&self) -> &str;

    /// Start a new pass over the records.
    fn records(&self) -> Result<RecordIter<'_>, SourceError>;
}

/// An in-memory source.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    primary_ref: String,
    records: Vec<Record>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            name: name.into(),
            primary_ref: DEFAULT_PRIMARY_REF.to_string(),
            records,
        }
    }

    /// Use a primary reference column other than `Token`.
    pub fn with_primary_ref(mut self, primary_ref: impl Into<String>) -> Self {
        self.primary_ref = primary_ref.into();
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn primary_ref(&self) -> &str {
        &self.primary_ref
    }

    fn records(&self) -> Result<RecordIter<'_>, SourceError> {
        Ok(Box::new(self.records.iter().cloned().map(Ok)))
    }
}
