//! Bounded pool of partition sinks.
//!
//! The pool owns every sink of a split and keeps at most `max_open` of them
//! open. Rows for a sink that is not open are parked in that sink's pending
//! buffer; once the buffer reaches `rows_cached` rows the sink is opened
//! (evicting the longest-open sink if the pool is full) and the buffer is
//! written out in arrival order.
//!
//! Eviction is FIFO on open time, not LRU: the sink at the front of the
//! open queue has its buffer flushed, is committed and closed. It is
//! reopened later if more rows arrive for it.
//!
//! The pool is not thread-safe; all operations take `&mut self`.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use snafu::prelude::*;
use tracing::{debug, error, info};

use collsplit_core::emit;
use collsplit_core::metrics::events::{
    OpenSinks, RowBuffered, RowsWritten, SinkCommitted, SinkEvicted, SinkOpened,
};

use crate::error::{
    DuplicateKeySnafu, PoolError, SinkFailedSnafu, UnknownKeySnafu, UnknownSinkSnafu,
};
use crate::record::Row;
use crate::sink::Sink;

/// Default number of simultaneously open sinks.
pub const DEFAULT_MAX_OPEN: usize = 50;

/// Smallest allowed `max_open`.
pub const MIN_MAX_OPEN: usize = 2;

/// Default pending buffer length that triggers a flush.
pub const DEFAULT_ROWS_CACHED: usize = 1000;

/// Handle to a sink registered with a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(usize);

impl SinkId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Counters collected over the life of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub opens: u64,
    pub evictions: u64,
    pub commits: u64,
    /// Rows written straight into an open sink.
    pub direct_rows: u64,
    /// Rows that went through a pending buffer.
    pub buffered_rows: u64,
    /// Most sinks open at the same time.
    pub peak_open: usize,
}

impl PoolStats {
    /// Add another pool's counters to these.
    pub fn merge(&mut self, other: &PoolStats) {
        self.opens += other.opens;
        self.evictions += other.evictions;
        self.commits += other.commits;
        self.direct_rows += other.direct_rows;
        self.buffered_rows += other.buffered_rows;
        self.peak_open = self.peak_open.max(other.peak_open);
    }
}

struct PoolEntry {
    sink: Box<dyn Sink>,
    pending: Vec<Row>,
    rows_since_commit: u64,
}

/// A bounded set of open sinks with per-sink pending buffers.
pub struct ResourcePool {
    entries: Vec<PoolEntry>,
    keys: HashMap<String, SinkId>,
    open_queue: VecDeque<SinkId>,
    max_open: usize,
    rows_cached: usize,
    commit_interval: Option<u64>,
    stats: PoolStats,
    target: String,
    finished: bool,
}

impl ResourcePool {
    /// Create a pool. `max_open` is raised to at least 2 and `rows_cached`
    /// to at least 1. `target` labels the pool's metrics.
    pub fn new(target: impl Into<String>, max_open: usize, rows_cached: usize) -> Self {
        Self {
            entries: Vec::new(),
            keys: HashMap::new(),
            open_queue: VecDeque::new(),
            max_open: max_open.max(MIN_MAX_OPEN),
            rows_cached: rows_cached.max(1),
            commit_interval: None,
            stats: PoolStats::default(),
            target: target.into(),
            finished: false,
        }
    }

    /// Commit a sink every `rows` rows written to it, in addition to the
    /// commits on eviction and teardown.
    pub fn with_commit_interval(mut self, rows: Option<u64>) -> Self {
        self.commit_interval = rows.filter(|&n| n > 0);
        self
    }

    pub fn max_open(&self) -> usize {
        self.max_open
    }

    pub fn rows_cached(&self) -> usize {
        self.rows_cached
    }

    /// Number of sinks open right now.
    pub fn open_count(&self) -> usize {
        self.open_queue.len()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Number of registered sinks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    /// Rows parked for the sink registered under `key`.
    pub fn pending_len(&self, key: &str) -> Option<usize> {
        let id = self.keys.get(key)?;
        Some(self.entries[id.0].pending.len())
    }

    /// Register a sink under `key`.
    ///
    /// A sink that arrives already open joins the open queue, evicting the
    /// longest-open sink if the pool is full.
    pub fn add_sink(&mut self, key: impl Into<String>, sink: Box<dyn Sink>) -> Result<SinkId, PoolError> {
        let key = key.into();
        ensure!(!self.keys.contains_key(&key), DuplicateKeySnafu { key });

        let id = SinkId(self.entries.len());
        let already_open = sink.is_open();
        self.entries.push(PoolEntry {
            sink,
            pending: Vec::new(),
            rows_since_commit: 0,
        });
        self.keys.insert(key, id);

        if already_open {
            if self.open_queue.len() >= self.max_open {
                self.reduce_queue()?;
            }
            self.enqueue(id);
        }
        Ok(id)
    }

    /// Register another key for an existing sink. Rows for either key share
    /// the sink and its pending buffer.
    pub fn add_alias(&mut self, key: impl Into<String>, id: SinkId) -> Result<(), PoolError> {
        let key = key.into();
        ensure!(!self.keys.contains_key(&key), DuplicateKeySnafu { key });
        ensure!(id.0 < self.entries.len(), UnknownSinkSnafu { id: id.0 });
        self.keys.insert(key, id);
        Ok(())
    }

    /// Get the sink for `key`, opening it if needed.
    pub fn get(&mut self, key: &str) -> Result<&mut dyn Sink, PoolError> {
        let id = self.resolve(key)?;
        self.ensure_open(id)?;
        self.flush_pending(id)?;
        Ok(self.entries[id.0].sink.as_mut())
    }

    /// Route a row to the sink registered under `key`.
    ///
    /// Open sinks receive the row immediately. Otherwise it is buffered; a
    /// full buffer opens the sink and is written out in order.
    pub fn insert_row(&mut self, key: &str, row: Row) -> Result<(), PoolError> {
        let id = self.resolve(key)?;

        if self.entries[id.0].sink.is_open() {
            self.write(id, row)?;
            self.stats.direct_rows += 1;
            emit!(RowsWritten {
                count: 1,
                target: self.target.clone(),
            });
            return Ok(());
        }

        let entry = &mut self.entries[id.0];
        entry.pending.push(row);
        self.stats.buffered_rows += 1;
        emit!(RowBuffered {
            target: self.target.clone(),
        });

        if entry.pending.len() >= self.rows_cached {
            self.ensure_open(id)?;
            self.flush_pending(id)?;
        }
        Ok(())
    }

    /// Flush, commit and close every sink, then drop them.
    ///
    /// Sinks that are open are finalized first. Sinks that only hold
    /// buffered rows are then opened one at a time, so teardown stays within
    /// `max_open`. Teardown continues past failures; the first error is
    /// returned.
    pub fn finish(mut self) -> Result<PoolStats, PoolError> {
        self.teardown()?;
        Ok(self.stats)
    }

    fn resolve(&self, key: &str) -> Result<SinkId, PoolError> {
        self.keys
            .get(key)
            .copied()
            .context(UnknownKeySnafu { key })
    }

    fn name(&self, id: SinkId) -> &str {
        &self.entries[id.0].sink.description().name
    }

    fn sink_failed(&self, id: SinkId) -> SinkFailedSnafu<String> {
        SinkFailedSnafu {
            name: self.name(id).to_string(),
        }
    }

    fn enqueue(&mut self, id: SinkId) {
        self.open_queue.push_back(id);
        self.stats.peak_open = self.stats.peak_open.max(self.open_queue.len());
        emit!(OpenSinks {
            count: self.open_queue.len(),
            target: self.target.clone(),
        });
    }

    /// Open the sink, making room first if the pool is full.
    fn ensure_open(&mut self, id: SinkId) -> Result<(), PoolError> {
        if self.entries[id.0].sink.is_open() {
            return Ok(());
        }

        // A sink closed behind the pool's back may still be queued.
        self.open_queue.retain(|&queued| queued != id);

        while self.open_queue.len() >= self.max_open {
            self.reduce_queue()?;
        }

        let context = self.sink_failed(id);
        self.entries[id.0].sink.open().context(context)?;
        self.stats.opens += 1;
        emit!(SinkOpened {
            target: self.target.clone(),
        });
        self.enqueue(id);
        Ok(())
    }

    /// Evict the longest-open sink.
    fn reduce_queue(&mut self) -> Result<(), PoolError> {
        let Some(id) = self.open_queue.pop_front() else {
            return Ok(());
        };
        if self.entries[id.0].sink.is_open() {
            debug!(sink = self.name(id), target = %self.target, "Evicting sink");
            self.retire(id)?;
            self.stats.evictions += 1;
            emit!(SinkEvicted {
                target: self.target.clone(),
            });
        }
        emit!(OpenSinks {
            count: self.open_queue.len(),
            target: self.target.clone(),
        });
        Ok(())
    }

    /// Flush, commit and close an open sink that has left the queue.
    fn retire(&mut self, id: SinkId) -> Result<(), PoolError> {
        self.flush_pending(id)?;
        self.commit(id)?;
        let context = self.sink_failed(id);
        self.entries[id.0].sink.close().context(context)
    }

    fn write(&mut self, id: SinkId, row: Row) -> Result<(), PoolError> {
        let context = self.sink_failed(id);
        let entry = &mut self.entries[id.0];
        entry.sink.insert_row(row).context(context)?;
        entry.rows_since_commit += 1;

        if let Some(interval) = self.commit_interval
            && entry.rows_since_commit >= interval
        {
            self.commit(id)?;
        }
        Ok(())
    }

    fn flush_pending(&mut self, id: SinkId) -> Result<(), PoolError> {
        let pending = std::mem::take(&mut self.entries[id.0].pending);
        if pending.is_empty() {
            return Ok(());
        }

        let count = pending.len() as u64;
        for row in pending {
            self.write(id, row)?;
        }
        emit!(RowsWritten {
            count,
            target: self.target.clone(),
        });
        Ok(())
    }

    fn commit(&mut self, id: SinkId) -> Result<(), PoolError> {
        let context = self.sink_failed(id);
        let entry = &mut self.entries[id.0];
        entry.sink.commit().context(context)?;
        entry.rows_since_commit = 0;
        self.stats.commits += 1;
        emit!(SinkCommitted {
            target: self.target.clone(),
        });
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), PoolError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let mut first_error = None;
        let mut record = |result: Result<(), PoolError>| {
            if let Err(e) = result {
                error!(error = %e, "Failed to finalize sink");
                first_error.get_or_insert(e);
            }
        };

        while let Some(id) = self.open_queue.pop_front() {
            if self.entries[id.0].sink.is_open() {
                record(self.retire(id));
            }
        }

        for idx in 0..self.entries.len() {
            let id = SinkId(idx);
            let entry = &self.entries[idx];
            if entry.sink.is_open() {
                // Opened outside the pool and never queued.
                record(self.retire(id));
            } else if !entry.pending.is_empty() {
                let result = self.ensure_open(id).and_then(|()| {
                    self.open_queue.retain(|&queued| queued != id);
                    self.retire(id)
                });
                record(result);
            }
        }

        emit!(OpenSinks {
            count: 0,
            target: self.target.clone(),
        });
        info!(
            target = %self.target,
            sinks = self.entries.len(),
            opens = self.stats.opens,
            evictions = self.stats.evictions,
            commits = self.stats.commits,
            peak_open = self.stats.peak_open,
            "Pool finished"
        );

        self.entries.clear();
        self.keys.clear();

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ResourcePool {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            error!(error = %e, target = %self.target, "Pool teardown on drop failed");
        }
    }
}
