//! Metadata sidecar for file sinks.
//!
//! Every commit rewrites `<name>.meta.json` next to the data file. The
//! sidecar is written to a temporary file in the same directory and renamed
//! over the old one, so readers never observe a partial document.

use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use tempfile::NamedTempFile;

use crate::error::{ReadMetadataSnafu, SerializeMetadataSnafu, SinkError, WriteMetadataSnafu};

/// Contents of a `.meta.json` sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkMetadata {
    pub name: String,
    pub reference_column: String,
    /// Rows committed to the data file.
    pub rows: u64,
    pub commits: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// User-supplied key/values from the output configuration.
    #[serde(default)]
    pub metadata: IndexMap<String, String>,
}

impl SinkMetadata {
    /// Atomically replace the sidecar at `path`.
    pub fn write_atomic(&self, path: &Path) -> Result<(), SinkError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let temp = NamedTempFile::new_in(dir).context(WriteMetadataSnafu { path })?;

        let mut writer = BufWriter::new(temp);
        serde_json::to_writer_pretty(&mut writer, self).context(SerializeMetadataSnafu {
            name: &self.name,
        })?;
        writer.flush().context(WriteMetadataSnafu { path })?;

        let temp = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .context(WriteMetadataSnafu { path })?;
        temp.persist(path)
            .map_err(|e| e.error)
            .context(WriteMetadataSnafu { path })?;
        Ok(())
    }

    /// Read a sidecar back.
    pub fn read(path: &Path) -> Result<Self, SinkError> {
        let contents = std::fs::read_to_string(path).context(ReadMetadataSnafu { path })?;
        serde_json::from_str(&contents).context(SerializeMetadataSnafu {
            name: path.display().to_string(),
        })
    }
}
