//! Explicit key to partition name assignments.
//!
//! The lookup file is line oriented:
//!
//! ```text
//! # comment
//! :special
//! 6E0ED5A8-0E0B-DF11-8D1C-0030487CD906
//! 1A2B3C4D-0E0B-DF11-8D1C-0030487CD906
//! :
//! 9F8E7D6C-0E0B-DF11-8D1C-0030487CD906
//! ```
//!
//! A `:name` line starts a group; the keys that follow belong to it. A bare
//! `:` starts a group with a synthesized name. Group names may not contain
//! path separators or `..`.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use snafu::prelude::*;
use tracing::{debug, info, warn};

use super::naming::{NameSequence, is_valid_name};
use crate::error::{LookupSnafu, SplitError};

/// Key to partition name mapping loaded before planning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyLookup {
    names: HashMap<String, String>,
}

impl KeyLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a lookup file.
    ///
    /// # Errors
    ///
    /// Returns `SplitError::Lookup` if the file cannot be opened or read, or
    /// if a group name is not a valid partition name.
    pub fn load(path: &Path, names: &mut NameSequence) -> Result<Self, SplitError> {
        let file = File::open(path).context(LookupSnafu { path })?;
        let lookup = Self::from_reader(BufReader::new(file), names).context(LookupSnafu { path })?;
        info!(
            path = %path.display(),
            keys = lookup.len(),
            "Loaded partition key lookup"
        );
        Ok(lookup)
    }

    /// Parse lookup lines from any reader.
    ///
    /// An invalid group name fails with [`io::ErrorKind::InvalidData`].
    pub fn from_reader(reader: impl BufRead, names: &mut NameSequence) -> io::Result<Self> {
        let mut lookup = Self::new();
        let mut current: Option<String> = None;

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix(':') {
                let name = name.trim();
                let name = if name.is_empty() {
                    names.next_name()
                } else if is_valid_name(name) {
                    name.to_string()
                } else {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("line {}: invalid partition name '{name}'", index + 1),
                    ));
                };
                debug!(partition = %name, "Lookup group");
                current = Some(name);
                continue;
            }

            match &current {
                Some(name) => {
                    lookup.insert(line, name.clone());
                }
                None => warn!(key = line, "Lookup key precedes any ':' line, ignoring"),
            }
        }

        Ok(lookup)
    }

    /// Assign `key` to `name`, replacing any earlier assignment.
    pub fn insert(&mut self, key: impl Into<String>, name: impl Into<String>) {
        self.names.insert(key.into(), name.into());
    }

    /// Partition name for `key`, if mapped.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.names.get(key).map(String::as_str)
    }

    /// Distinct partition names, in no particular order.
    pub fn partition_names(&self) -> HashSet<&str> {
        self.names.values().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for KeyLookup {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut lookup = Self::new();
        for (key, name) in iter {
            lookup.insert(key, name);
        }
        lookup
    }
}
