//! In-memory sinks.
//!
//! Rows and lifecycle events are recorded in state shared by every sink of a
//! factory, so callers can inspect what was written after the sinks
//! themselves have been dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use snafu::prelude::*;

use super::{Sink, SinkDescription, SinkFactory};
use crate::error::{NotOpenSnafu, SinkError};
use crate::record::Row;

#[derive(Debug, Default)]
struct PartitionState {
    rows: Vec<Row>,
    committed_rows: usize,
    opens: u64,
    commits: u64,
    is_open: bool,
    dropped: bool,
}

#[derive(Debug, Default)]
struct OpenCounts {
    open_now: usize,
    peak_open: usize,
}

#[derive(Debug, Default)]
struct SharedState {
    partitions: IndexMap<String, PartitionState>,
    counts: OpenCounts,
}

type Shared = Arc<Mutex<SharedState>>;

fn lock(shared: &Shared) -> MutexGuard<'_, SharedState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A sink that keeps its rows in memory.
pub struct MemorySink {
    description: SinkDescription,
    shared: Shared,
    open: bool,
    cache: Vec<Row>,
    write_cache_size: usize,
}

impl MemorySink {
    fn with_state<R>(&self, f: impl FnOnce(&mut OpenCounts, &mut PartitionState) -> R) -> R {
        let mut guard = lock(&self.shared);
        let state = &mut *guard;
        let partition = state
            .partitions
            .entry(self.description.name.clone())
            .or_default();
        f(&mut state.counts, partition)
    }

    fn drain_cache(&mut self) {
        if self.cache.is_empty() {
            return;
        }
        let rows = std::mem::take(&mut self.cache);
        self.with_state(|_, partition| partition.rows.extend(rows));
    }
}

impl Sink for MemorySink {
    fn description(&self) -> &SinkDescription {
        &self.description
    }

    fn open(&mut self) -> Result<(), SinkError> {
        if self.open {
            return Ok(());
        }
        self.open = true;
        self.with_state(|counts, partition| {
            partition.opens += 1;
            partition.is_open = true;
            counts.open_now += 1;
            counts.peak_open = counts.peak_open.max(counts.open_now);
        });
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if !self.open {
            return Ok(());
        }
        self.drain_cache();
        self.open = false;
        self.with_state(|counts, partition| {
            partition.is_open = false;
            counts.open_now -= 1;
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SinkError> {
        self.drain_cache();
        self.with_state(|_, partition| {
            partition.commits += 1;
            partition.committed_rows = partition.rows.len();
        });
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn insert_row(&mut self, row: Row) -> Result<(), SinkError> {
        ensure!(
            self.open,
            NotOpenSnafu {
                name: &self.description.name
            }
        );
        self.cache.push(row);
        if self.cache.len() >= self.write_cache_size {
            self.drain_cache();
        }
        Ok(())
    }

    fn set_write_cache_size(&mut self, rows: usize) {
        self.write_cache_size = rows;
    }
}

impl Drop for MemorySink {
    fn drop(&mut self) {
        let open = self.open;
        self.with_state(|counts, partition| {
            partition.dropped = true;
            if open {
                partition.is_open = false;
                counts.open_now -= 1;
            }
        });
    }
}

/// Creates [`MemorySink`]s sharing one recording state.
#[derive(Debug, Default, Clone)]
pub struct MemorySinkFactory {
    shared: Shared,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of everything the factory's sinks recorded.
    pub fn handle(&self) -> MemorySinkHandle {
        MemorySinkHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl SinkFactory for MemorySinkFactory {
    fn create(&mut self, description: SinkDescription) -> Result<Box<dyn Sink>, SinkError> {
        lock(&self.shared)
            .partitions
            .entry(description.name.clone())
            .or_default();
        Ok(Box::new(MemorySink {
            description,
            shared: Arc::clone(&self.shared),
            open: false,
            cache: Vec::new(),
            write_cache_size: 0,
        }))
    }
}

/// Inspection handle for [`MemorySinkFactory`] state.
#[derive(Debug, Clone)]
pub struct MemorySinkHandle {
    shared: Shared,
}

impl MemorySinkHandle {
    /// Partition names in creation order.
    pub fn names(&self) -> Vec<String> {
        lock(&self.shared).partitions.keys().cloned().collect()
    }

    /// Rows written to a partition, in write order.
    pub fn rows(&self, name: &str) -> Vec<Row> {
        lock(&self.shared)
            .partitions
            .get(name)
            .map(|p| p.rows.clone())
            .unwrap_or_default()
    }

    /// Rows covered by the partition's last commit.
    pub fn committed_rows(&self, name: &str) -> usize {
        lock(&self.shared)
            .partitions
            .get(name)
            .map_or(0, |p| p.committed_rows)
    }

    /// Total rows across all partitions.
    pub fn total_rows(&self) -> usize {
        lock(&self.shared)
            .partitions
            .values()
            .map(|p| p.rows.len())
            .sum()
    }

    pub fn opens(&self, name: &str) -> u64 {
        lock(&self.shared).partitions.get(name).map_or(0, |p| p.opens)
    }

    pub fn commits(&self, name: &str) -> u64 {
        lock(&self.shared).partitions.get(name).map_or(0, |p| p.commits)
    }

    pub fn is_open(&self, name: &str) -> bool {
        lock(&self.shared)
            .partitions
            .get(name)
            .is_some_and(|p| p.is_open)
    }

    /// Whether the sink for `name` has been dropped.
    pub fn is_dropped(&self, name: &str) -> bool {
        lock(&self.shared)
            .partitions
            .get(name)
            .is_some_and(|p| p.dropped)
    }

    /// Sinks open right now.
    pub fn open_now(&self) -> usize {
        lock(&self.shared).counts.open_now
    }

    /// Most sinks ever open at the same time.
    pub fn peak_open(&self) -> usize {
        lock(&self.shared).counts.peak_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn row(n: i64) -> Row {
        Record::new().with_token("Token", "A").with_attribute("n", n)
    }

    #[test]
    fn test_records_rows_and_lifecycle() {
        let mut factory = MemorySinkFactory::new();
        let handle = factory.handle();
        let mut sink = factory.create(SinkDescription::new("p", "Token")).unwrap();

        assert!(sink.insert_row(row(0)).is_err());

        sink.open().unwrap();
        assert!(handle.is_open("p"));
        assert_eq!(handle.open_now(), 1);
        sink.insert_row(row(1)).unwrap();
        sink.commit().unwrap();
        sink.close().unwrap();

        assert_eq!(handle.rows("p"), vec![row(1)]);
        assert_eq!(handle.committed_rows("p"), 1);
        assert_eq!(handle.opens("p"), 1);
        assert_eq!(handle.commits("p"), 1);
        assert_eq!(handle.open_now(), 0);
        assert_eq!(handle.peak_open(), 1);

        drop(sink);
        assert!(handle.is_dropped("p"));
    }

    #[test]
    fn test_peak_open_across_sinks() {
        let mut factory = MemorySinkFactory::new();
        let handle = factory.handle();
        let mut a = factory.create(SinkDescription::new("a", "Token")).unwrap();
        let mut b = factory.create(SinkDescription::new("b", "Token")).unwrap();

        a.open().unwrap();
        b.open().unwrap();
        a.close().unwrap();
        a.open().unwrap();
        assert_eq!(handle.peak_open(), 2);

        drop(a);
        assert_eq!(handle.open_now(), 1);
        assert_eq!(handle.names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_write_cache_defers_rows() {
        let mut factory = MemorySinkFactory::new();
        let handle = factory.handle();
        let mut sink = factory.create(SinkDescription::new("p", "Token")).unwrap();
        sink.set_write_cache_size(3);

        sink.open().unwrap();
        sink.insert_row(row(1)).unwrap();
        sink.insert_row(row(2)).unwrap();
        assert_eq!(handle.total_rows(), 0);

        sink.insert_row(row(3)).unwrap();
        assert_eq!(handle.total_rows(), 3);

        sink.insert_row(row(4)).unwrap();
        sink.close().unwrap();
        assert_eq!(handle.rows("p"), vec![row(1), row(2), row(3), row(4)]);
    }
}
