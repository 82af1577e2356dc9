//! Newline-delimited JSON record files.
//!
//! Each non-blank line holds one record:
//! `{"tokens": {...}, "attributes": {...}}`. Files may be gzip or zstd
//! compressed. Lines are decoded lazily, so a pass never holds more than one
//! record in memory.

use std::fs::File;
use std::io::{BufRead, Lines};
use std::path::{Path, PathBuf};

use snafu::prelude::*;
use tracing::debug;

use super::compression::CompressionFormat;
use super::{DEFAULT_PRIMARY_REF, RecordIter, RecordSource};
use crate::error::{DecompressionSnafu, OpenSnafu, ParseRecordSnafu, ReadLineSnafu, SourceError};
use crate::record::Record;

/// A record source backed by an NDJSON file.
#[derive(Debug, Clone)]
pub struct NdjsonSource {
    path: PathBuf,
    name: String,
    compression: CompressionFormat,
    primary_ref: String,
}

impl NdjsonSource {
    /// Create a source reading `path`, with compression inferred from its
    /// extension.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self {
            path,
            name,
            compression: CompressionFormat::Auto,
            primary_ref: DEFAULT_PRIMARY_REF.to_string(),
        }
    }

    pub fn with_compression(mut self, compression: CompressionFormat) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_primary_ref(mut self, primary_ref: impl Into<String>) -> Self {
        self.primary_ref = primary_ref.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for NdjsonSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn primary_ref(&self) -> &str {
        &self.primary_ref
    }

    fn records(&self) -> Result<RecordIter<'_>, SourceError> {
        let file = File::open(&self.path).context(OpenSnafu { path: &self.path })?;
        let codec = self.compression.codec(&self.path);
        let reader = codec.wrap(Box::new(file)).context(DecompressionSnafu {
            path: &self.path,
            codec: codec.name(),
        })?;

        debug!(path = %self.path.display(), codec = codec.name(), "Opened source for reading");

        Ok(Box::new(NdjsonRecords {
            path: &self.path,
            lines: reader.lines(),
            line: 0,
        }))
    }
}

struct NdjsonRecords<'a> {
    path: &'a Path,
    lines: Lines<Box<dyn BufRead + 'a>>,
    line: usize,
}

impl Iterator for NdjsonRecords<'_> {
    type Item = Result<Record, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line += 1;

            let line = match line.context(ReadLineSnafu {
                path: self.path,
                line: self.line,
            }) {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            return Some(serde_json::from_str(trimmed).context(ParseRecordSnafu {
                path: self.path,
                line: self.line,
            }));
        }
    }
}
