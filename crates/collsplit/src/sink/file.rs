//! NDJSON file sinks.
//!
//! Each partition is written to `<dir>/<name>.ndjson`, one row per line, with
//! a `<dir>/<name>.meta.json` sidecar rewritten on every commit.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use snafu::prelude::*;
use tracing::debug;

use super::metadata::SinkMetadata;
use super::{Sink, SinkDescription, SinkFactory};
use crate::error::{
    CreateOutputSnafu, InvalidNameSnafu, NotOpenSnafu, SerializeRowSnafu, SinkError, WriteOutputSnafu,
};
use crate::pipeline::is_valid_name;
use crate::record::Row;

/// Writes one partition to an NDJSON file.
pub struct FileSink {
    description: SinkDescription,
    data_path: PathBuf,
    meta_path: PathBuf,
    writer: Option<BufWriter<File>>,
    /// Truncate on the next open. Cleared after the first open.
    truncate: bool,
    /// Serialized rows held back by the write cache.
    cache: Vec<u8>,
    cached_rows: usize,
    write_cache_size: usize,
    rows: u64,
    commits: u64,
    created_at: DateTime<Utc>,
    /// `None` disables the sidecar.
    metadata: Option<Arc<IndexMap<String, String>>>,
}

impl FileSink {
    fn new(
        dir: &Path,
        description: SinkDescription,
        truncate: bool,
        metadata: Option<Arc<IndexMap<String, String>>>,
    ) -> Self {
        let data_path = dir.join(format!("{}.ndjson", description.name));
        let meta_path = dir.join(format!("{}.meta.json", description.name));
        // An appending sink continues the counts of the previous one.
        let previous = if truncate {
            None
        } else {
            SinkMetadata::read(&meta_path).ok()
        };
        Self {
            description,
            data_path,
            meta_path,
            writer: None,
            truncate,
            cache: Vec::new(),
            cached_rows: 0,
            write_cache_size: 0,
            rows: previous.as_ref().map_or(0, |m| m.rows),
            commits: previous.as_ref().map_or(0, |m| m.commits),
            created_at: previous.map_or_else(Utc::now, |m| m.created_at),
            metadata,
        }
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn meta_path(&self) -> &Path {
        &self.meta_path
    }

    /// Move cached rows into the file writer.
    fn drain_cache(&mut self) -> Result<(), SinkError> {
        if self.cache.is_empty() {
            return Ok(());
        }
        let writer = self.writer.as_mut().context(NotOpenSnafu {
            name: &self.description.name,
        })?;
        writer.write_all(&self.cache).context(WriteOutputSnafu {
            path: &self.data_path,
        })?;
        self.cache.clear();
        self.cached_rows = 0;
        Ok(())
    }

    fn write_metadata(&self) -> Result<(), SinkError> {
        let Some(extra) = &self.metadata else {
            return Ok(());
        };
        SinkMetadata {
            name: self.description.name.clone(),
            reference_column: self.description.reference_column.clone(),
            rows: self.rows,
            commits: self.commits,
            created_at: self.created_at,
            updated_at: Utc::now(),
            metadata: extra.as_ref().clone(),
        }
        .write_atomic(&self.meta_path)
    }
}

impl Sink for FileSink {
    fn description(&self) -> &SinkDescription {
        &self.description
    }

    fn open(&mut self) -> Result<(), SinkError> {
        if self.writer.is_some() {
            return Ok(());
        }

        let mut options = OpenOptions::new();
        options.create(true);
        if self.truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        let file = options.open(&self.data_path).context(CreateOutputSnafu {
            path: &self.data_path,
        })?;

        debug!(
            sink = %self.description.name,
            path = %self.data_path.display(),
            truncate = self.truncate,
            "Opened file sink"
        );
        self.truncate = false;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if self.writer.is_none() {
            return Ok(());
        }
        self.drain_cache()?;
        if let Some(mut writer) = self.writer.take() {
            writer.flush().context(WriteOutputSnafu {
                path: &self.data_path,
            })?;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SinkError> {
        self.drain_cache()?;
        if let Some(writer) = self.writer.as_mut() {
            writer.flush().context(WriteOutputSnafu {
                path: &self.data_path,
            })?;
            writer.get_ref().sync_data().context(WriteOutputSnafu {
                path: &self.data_path,
            })?;
        }
        self.commits += 1;
        self.write_metadata()
    }

    fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    fn insert_row(&mut self, row: Row) -> Result<(), SinkError> {
        ensure!(
            self.writer.is_some(),
            NotOpenSnafu {
                name: &self.description.name
            }
        );

        serde_json::to_writer(&mut self.cache, &row).context(SerializeRowSnafu {
            name: &self.description.name,
        })?;
        self.cache.push(b'\n');
        self.cached_rows += 1;
        self.rows += 1;

        if self.cached_rows >= self.write_cache_size {
            self.drain_cache()?;
        }
        Ok(())
    }

    fn set_write_cache_size(&mut self, rows: usize) {
        self.write_cache_size = rows;
    }
}

/// Creates [`FileSink`]s in an output directory.
///
/// Names that are empty or contain path separators or `..` are rejected
/// with [`SinkError::InvalidName`].
///
/// The factory remembers which names it has created. The first sink for a
/// name truncates any existing file; later sinks with the same name (a
/// partition name reused by another source in the same run) append to it.
pub struct FileSinkFactory {
    dir: PathBuf,
    metadata: Option<Arc<IndexMap<String, String>>>,
    created: HashSet<String>,
}

impl FileSinkFactory {
    /// Create a factory writing into `dir`. The directory is created with
    /// the first sink.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            metadata: Some(Arc::new(IndexMap::new())),
            created: HashSet::new(),
        }
    }

    /// Extra key/values stored in every sidecar.
    pub fn with_metadata(mut self, metadata: IndexMap<String, String>) -> Self {
        self.metadata = Some(Arc::new(metadata));
        self
    }

    /// Do not write `.meta.json` sidecars.
    pub fn without_metadata(mut self) -> Self {
        self.metadata = None;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SinkFactory for FileSinkFactory {
    fn create(&mut self, description: SinkDescription) -> Result<Box<dyn Sink>, SinkError> {
        ensure!(
            is_valid_name(&description.name),
            InvalidNameSnafu {
                name: &description.name
            }
        );
        if self.created.is_empty() {
            std::fs::create_dir_all(&self.dir).context(CreateOutputSnafu { path: &self.dir })?;
        }
        let truncate = self.created.insert(description.name.clone());
        Ok(Box::new(FileSink::new(
            &self.dir,
            description,
            truncate,
            self.metadata.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use tempfile::TempDir;

    fn row(n: i64) -> Row {
        Record::new()
            .with_token("StreamAOD_ref", format!("[DB=A][OID={n}]"))
            .with_attribute("n", n)
    }

    fn read_lines(path: &Path) -> Vec<Record> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_write_commit_and_metadata() {
        let dir = TempDir::new().unwrap();
        let mut factory = FileSinkFactory::new(dir.path())
            .with_metadata(IndexMap::from([("owner".to_string(), "ops".to_string())]));
        let mut sink = factory
            .create(SinkDescription::new("sub_collection_1", "StreamAOD_ref"))
            .unwrap();

        assert!(!sink.is_open());
        sink.open().unwrap();
        sink.insert_row(row(1)).unwrap();
        sink.insert_row(row(2)).unwrap();
        sink.commit().unwrap();
        sink.close().unwrap();

        let data = dir.path().join("sub_collection_1.ndjson");
        assert_eq!(read_lines(&data), vec![row(1), row(2)]);

        let meta = SinkMetadata::read(&dir.path().join("sub_collection_1.meta.json")).unwrap();
        assert_eq!(meta.rows, 2);
        assert_eq!(meta.commits, 1);
        assert_eq!(meta.reference_column, "StreamAOD_ref");
        assert_eq!(meta.metadata.get("owner").map(String::as_str), Some("ops"));
    }

    #[test]
    fn test_reopen_appends() {
        let dir = TempDir::new().unwrap();
        let mut factory = FileSinkFactory::new(dir.path());
        let mut sink = factory.create(SinkDescription::new("p", "Token")).unwrap();

        sink.open().unwrap();
        sink.insert_row(row(1)).unwrap();
        sink.commit().unwrap();
        sink.close().unwrap();

        sink.open().unwrap();
        sink.insert_row(row(2)).unwrap();
        sink.commit().unwrap();
        sink.close().unwrap();

        assert_eq!(read_lines(&dir.path().join("p.ndjson")), vec![row(1), row(2)]);
    }

    #[test]
    fn test_first_open_truncates_stale_output() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("p.ndjson"), "stale\n").unwrap();

        let mut factory = FileSinkFactory::new(dir.path());
        let mut sink = factory.create(SinkDescription::new("p", "Token")).unwrap();
        sink.open().unwrap();
        sink.insert_row(row(1)).unwrap();
        sink.close().unwrap();

        assert_eq!(read_lines(&dir.path().join("p.ndjson")), vec![row(1)]);
    }

    #[test]
    fn test_name_created_twice_appends() {
        let dir = TempDir::new().unwrap();
        let mut factory = FileSinkFactory::new(dir.path()).without_metadata();

        for n in 1..=2 {
            let mut sink = factory.create(SinkDescription::new("special", "Token")).unwrap();
            sink.open().unwrap();
            sink.insert_row(row(n)).unwrap();
            sink.commit().unwrap();
            sink.close().unwrap();
        }

        assert_eq!(
            read_lines(&dir.path().join("special.ndjson")),
            vec![row(1), row(2)]
        );
        assert!(!dir.path().join("special.meta.json").exists());
    }

    #[test]
    fn test_appending_sink_continues_metadata_counts() {
        let dir = TempDir::new().unwrap();
        let mut factory = FileSinkFactory::new(dir.path());

        for n in 1..=2 {
            let mut sink = factory.create(SinkDescription::new("special", "Token")).unwrap();
            sink.open().unwrap();
            sink.insert_row(row(n)).unwrap();
            sink.commit().unwrap();
            sink.close().unwrap();
        }

        let meta = SinkMetadata::read(&dir.path().join("special.meta.json")).unwrap();
        assert_eq!(meta.rows, 2);
        assert_eq!(meta.commits, 2);
    }

    #[test]
    fn test_write_cache_holds_rows_until_commit() {
        let dir = TempDir::new().unwrap();
        let mut factory = FileSinkFactory::new(dir.path()).without_metadata();
        let mut sink = factory.create(SinkDescription::new("p", "Token")).unwrap();
        sink.set_write_cache_size(10);

        sink.open().unwrap();
        sink.insert_row(row(1)).unwrap();
        sink.insert_row(row(2)).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("p.ndjson")).unwrap(), "");

        sink.commit().unwrap();
        assert_eq!(read_lines(&dir.path().join("p.ndjson")).len(), 2);
        sink.close().unwrap();
    }

    #[test]
    fn test_insert_into_unopened_sink_fails() {
        let dir = TempDir::new().unwrap();
        let mut factory = FileSinkFactory::new(dir.path());
        let mut sink = factory.create(SinkDescription::new("p", "Token")).unwrap();

        let err = sink.insert_row(row(1)).unwrap_err();
        assert!(matches!(err, SinkError::NotOpen { .. }));
        assert!(!dir.path().join("p.ndjson").exists());
    }

    #[test]
    fn test_name_outside_output_dir_rejected() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let mut factory = FileSinkFactory::new(&out);

        for name in ["../escaped", "nested/p", ""] {
            let err = factory
                .create(SinkDescription::new(name, "Token"))
                .err()
                .unwrap();
            assert!(matches!(err, SinkError::InvalidName { .. }), "{name:?}");
        }
        assert!(!dir.path().join("escaped.ndjson").exists());
        assert!(!out.exists());
    }
}
