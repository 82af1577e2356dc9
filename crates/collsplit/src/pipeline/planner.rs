//! Partition planning (pass 1).
//!
//! The planner tallies records per key in one streaming pass, then groups the
//! keys into partitions:
//!
//! 1. Keys named by the lookup go to their mapped partition. Several keys may
//!    share one; mapped partitions are exempt from both limits.
//! 2. The remaining keys, largest first, fill synthesized partitions. A new
//!    partition is started once the current one holds at least
//!    `min_records`, until `max_partitions` synthesized partitions exist.
//!    After that every remaining key spills into the last partition.
//!
//! The last synthesized partition may end up well below `min_records`.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use tracing::debug;

use collsplit_core::emit;
use collsplit_core::metrics::events::{PartitionOrigin, PartitionsPlanned, RecordsScanned};

use super::lookup::KeyLookup;
use super::naming::NameSequence;
use crate::error::{SchemaMismatchSnafu, SplitError};
use crate::record::Record;
use crate::source::RecordSource;

/// Default ceiling on synthesized partitions.
pub const DEFAULT_MAX_PARTITIONS: usize = 500;

/// Record counts per key, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyCounts {
    counts: IndexMap<String, u64>,
    total: u64,
}

impl KeyCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one record for `key`.
    pub fn add(&mut self, key: &str) {
        self.add_many(key, 1);
    }

    /// Count `n` records for `key`.
    pub fn add_many(&mut self, key: &str, n: u64) {
        match self.counts.get_mut(key) {
            Some(count) => *count += n,
            None => {
                self.counts.insert(key.to_string(), n);
            }
        }
        self.total += n;
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.counts.get(key).copied()
    }

    /// Distinct keys seen.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Extract the partition key of `record` from its `split_ref` column.
pub(crate) fn partition_key<'r>(
    record: &'r Record,
    split_ref: &str,
    source_name: &str,
    ordinal: u64,
) -> Result<&'r str, SplitError> {
    match record.token(split_ref) {
        Some(token) => Ok(token.db_id()),
        None => SchemaMismatchSnafu {
            field: split_ref,
            source_name,
            record: ordinal,
        }
        .fail(),
    }
}

fn serialize_origin<S: Serializer>(origin: &PartitionOrigin, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(origin.as_str())
}

/// One planned partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedPartition {
    pub name: String,
    #[serde(serialize_with = "serialize_origin")]
    pub origin: PartitionOrigin,
    /// Member keys, in assignment order.
    pub keys: Vec<String>,
    /// Records counted for the member keys.
    pub records: u64,
}

/// Result of planning one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartitionPlan {
    /// Mapped partitions first, then synthesized ones in creation order.
    partitions: Vec<PlannedPartition>,
    #[serde(skip)]
    assignments: HashMap<String, usize>,
    total_records: u64,
}

impl PartitionPlan {
    /// Partition name for `key`.
    pub fn partition_for(&self, key: &str) -> Option<&str> {
        self.assignments
            .get(key)
            .map(|&idx| self.partitions[idx].name.as_str())
    }

    pub fn partitions(&self) -> &[PlannedPartition] {
        &self.partitions
    }

    pub fn partition(&self, name: &str) -> Option<&PlannedPartition> {
        self.partitions.iter().find(|p| p.name == name)
    }

    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    /// Number of distinct keys.
    pub fn key_count(&self) -> usize {
        self.assignments.len()
    }

    pub fn synthesized_count(&self) -> usize {
        self.count_origin(PartitionOrigin::Synthesized)
    }

    pub fn mapped_count(&self) -> usize {
        self.count_origin(PartitionOrigin::Mapped)
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    fn count_origin(&self, origin: PartitionOrigin) -> usize {
        self.partitions.iter().filter(|p| p.origin == origin).count()
    }

    fn assign(&mut self, idx: usize, key: &str, count: u64) {
        let partition = &mut self.partitions[idx];
        partition.keys.push(key.to_string());
        partition.records += count;
        self.assignments.insert(key.to_string(), idx);
    }

    fn push(&mut self, name: String, origin: PartitionOrigin) -> usize {
        self.partitions.push(PlannedPartition {
            name,
            origin,
            keys: Vec::new(),
            records: 0,
        });
        self.partitions.len() - 1
    }
}

/// Groups keys into partitions under size and count limits.
#[derive(Debug, Clone)]
pub struct PartitionPlanner {
    min_records: u64,
    max_partitions: usize,
}

impl Default for PartitionPlanner {
    fn default() -> Self {
        Self::new(None, DEFAULT_MAX_PARTITIONS)
    }
}

impl PartitionPlanner {
    /// `min_records` of `None` means no minimum. `max_partitions` is raised
    /// to at least 1.
    pub fn new(min_records: Option<u64>, max_partitions: usize) -> Self {
        Self {
            min_records: min_records.unwrap_or(0),
            max_partitions: max_partitions.max(1),
        }
    }

    pub fn min_records(&self) -> u64 {
        self.min_records
    }

    pub fn max_partitions(&self) -> usize {
        self.max_partitions
    }

    /// Count records per key in one pass over `source`.
    ///
    /// # Errors
    ///
    /// Fails with `SchemaMismatch` on the first record without `split_ref`,
    /// or with the source's own read errors.
    pub fn scan(&self, source: &dyn RecordSource, split_ref: &str) -> Result<KeyCounts, SplitError> {
        let mut counts = KeyCounts::new();
        for (idx, record) in source.records()?.enumerate() {
            let record = record?;
            let key = partition_key(&record, split_ref, source.name(), idx as u64 + 1)?;
            counts.add(key);
        }

        emit!(RecordsScanned {
            count: counts.total(),
            target: source.name().to_string(),
        });
        debug!(
            source = source.name(),
            records = counts.total(),
            keys = counts.len(),
            "Scanned source"
        );
        Ok(counts)
    }

    /// Scan `source` and plan its partitions.
    pub fn plan(
        &self,
        source: &dyn RecordSource,
        split_ref: &str,
        lookup: &KeyLookup,
        names: &mut NameSequence,
    ) -> Result<PartitionPlan, SplitError> {
        let counts = self.scan(source, split_ref)?;
        let plan = self.plan_counts(&counts, lookup, names);

        emit!(PartitionsPlanned {
            count: plan.mapped_count() as u64,
            origin: PartitionOrigin::Mapped,
            target: source.name().to_string(),
        });
        emit!(PartitionsPlanned {
            count: plan.synthesized_count() as u64,
            origin: PartitionOrigin::Synthesized,
            target: source.name().to_string(),
        });
        Ok(plan)
    }

    /// Plan partitions from precomputed counts.
    pub fn plan_counts(
        &self,
        counts: &KeyCounts,
        lookup: &KeyLookup,
        names: &mut NameSequence,
    ) -> PartitionPlan {
        let mut plan = PartitionPlan {
            total_records: counts.total(),
            ..Default::default()
        };

        let mut mapped: HashMap<&str, usize> = HashMap::new();
        let mut remaining = Vec::new();
        for (key, count) in counts.iter() {
            match lookup.get(key) {
                Some(name) => {
                    let idx = match mapped.get(name) {
                        Some(&idx) => idx,
                        None => {
                            let idx = plan.push(name.to_string(), PartitionOrigin::Mapped);
                            mapped.insert(name, idx);
                            idx
                        }
                    };
                    plan.assign(idx, key, count);
                }
                None => remaining.push((key, count)),
            }
        }

        // Stable, so equal counts keep first-seen order.
        remaining.sort_by(|a, b| b.1.cmp(&a.1));

        // Lookup names are reserved for the whole run, even when none of
        // their keys appear in this source.
        let taken = lookup.partition_names();
        let mut synthesized = 0usize;
        let mut running = 0u64;
        let mut current: Option<usize> = None;

        for (key, count) in remaining {
            let start_new = match current {
                None => true,
                Some(_) => running >= self.min_records && synthesized < self.max_partitions,
            };
            if start_new {
                let name = next_free_name(names, &taken);
                current = Some(plan.push(name, PartitionOrigin::Synthesized));
                synthesized += 1;
                running = 0;
            }
            if let Some(idx) = current {
                plan.assign(idx, key, count);
            }
            running += count;
        }

        plan
    }
}

/// Draw a synthesized name not used by any lookup partition.
fn next_free_name(names: &mut NameSequence, taken: &HashSet<&str>) -> String {
    loop {
        let name = names.next_name();
        if !taken.contains(name.as_str()) {
            return name;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn counts(entries: &[(&str, u64)]) -> KeyCounts {
        let mut counts = KeyCounts::new();
        for (key, n) in entries {
            counts.add_many(key, *n);
        }
        counts
    }

    fn records_for(entries: &[(&str, usize)]) -> Vec<Record> {
        entries
            .iter()
            .flat_map(|(key, n)| {
                (0..*n).map(move |i| {
                    Record::new()
                        .with_token("Token", format!("[DB={key}][OID={i}]"))
                        .with_attribute("i", i as u64)
                })
            })
            .collect()
    }

    #[test]
    fn test_one_partition_per_key_above_minimum() {
        let planner = PartitionPlanner::new(Some(200), 10);
        let plan = planner.plan_counts(
            &counts(&[("A", 600), ("B", 300), ("C", 100)]),
            &KeyLookup::new(),
            &mut NameSequence::new(),
        );

        let sizes: Vec<_> = plan.partitions().iter().map(|p| p.records).collect();
        assert_eq!(sizes, vec![600, 300, 100]);
        assert_eq!(plan.partition_for("A"), Some("sub_collection_1"));
        assert_eq!(plan.partition_for("C"), Some("sub_collection_3"));
        assert_eq!(plan.total_records(), 1000);
    }

    #[test]
    fn test_single_partition_ceiling() {
        let planner = PartitionPlanner::new(Some(200), 1);
        let plan = planner.plan_counts(
            &counts(&[("A", 600), ("B", 300), ("C", 100)]),
            &KeyLookup::new(),
            &mut NameSequence::new(),
        );

        assert_eq!(plan.partitions().len(), 1);
        assert_eq!(plan.partitions()[0].records, 1000);
        assert_eq!(plan.partitions()[0].keys, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_mapped_key_goes_to_lookup_partition() {
        let lookup: KeyLookup = [("A", "special")].into_iter().collect();
        let planner = PartitionPlanner::new(Some(100), 10);
        let plan = planner.plan_counts(
            &counts(&[("A", 50), ("B", 10)]),
            &lookup,
            &mut NameSequence::new(),
        );

        assert_eq!(plan.partitions().len(), 2);
        let special = plan.partition("special").unwrap();
        assert_eq!(special.records, 50);
        assert_eq!(special.origin, PartitionOrigin::Mapped);
        let synthesized = plan.partition("sub_collection_1").unwrap();
        assert_eq!(synthesized.records, 10);
        assert_eq!(synthesized.origin, PartitionOrigin::Synthesized);
    }

    #[test]
    fn test_mapped_partitions_do_not_count_against_ceiling() {
        let lookup: KeyLookup = [("A", "x"), ("B", "y")].into_iter().collect();
        let planner = PartitionPlanner::new(None, 1);
        let plan = planner.plan_counts(
            &counts(&[("A", 1), ("B", 1), ("C", 5), ("D", 4)]),
            &lookup,
            &mut NameSequence::new(),
        );

        assert_eq!(plan.mapped_count(), 2);
        assert_eq!(plan.synthesized_count(), 1);
        assert_eq!(plan.partition("sub_collection_1").unwrap().records, 9);
    }

    #[test]
    fn test_keys_sharing_a_mapped_name() {
        let lookup: KeyLookup = [("A", "special"), ("B", "special")].into_iter().collect();
        let plan = PartitionPlanner::default().plan_counts(
            &counts(&[("A", 3), ("B", 4)]),
            &lookup,
            &mut NameSequence::new(),
        );

        assert_eq!(plan.partitions().len(), 1);
        assert_eq!(plan.partitions()[0].keys, vec!["A", "B"]);
        assert_eq!(plan.partitions()[0].records, 7);
    }

    #[test]
    fn test_trailing_partition_may_fall_below_minimum() {
        let planner = PartitionPlanner::new(Some(100), 10);
        let plan = planner.plan_counts(
            &counts(&[("A", 80), ("B", 70), ("C", 5)]),
            &KeyLookup::new(),
            &mut NameSequence::new(),
        );

        // A (80) is below the minimum so B joins it; C starts a new partition
        // that stays far below the minimum.
        let sizes: Vec<_> = plan.partitions().iter().map(|p| p.records).collect();
        assert_eq!(sizes, vec![150, 5]);
    }

    #[test]
    fn test_no_minimum_gives_one_partition_per_key_until_ceiling() {
        let planner = PartitionPlanner::new(None, 2);
        let plan = planner.plan_counts(
            &counts(&[("A", 1), ("B", 9), ("C", 5), ("D", 5)]),
            &KeyLookup::new(),
            &mut NameSequence::new(),
        );

        // Sorted: B 9, C 5, D 5 (C first-seen before D), A 1.
        assert_eq!(plan.partitions()[0].keys, vec!["B"]);
        assert_eq!(plan.partitions()[1].keys, vec!["C", "D", "A"]);
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let plan = PartitionPlanner::new(None, 10).plan_counts(
            &counts(&[("Z", 2), ("Y", 2), ("X", 2)]),
            &KeyLookup::new(),
            &mut NameSequence::new(),
        );
        let order: Vec<_> = plan
            .partitions()
            .iter()
            .map(|p| p.keys[0].as_str())
            .collect();
        assert_eq!(order, vec!["Z", "Y", "X"]);
    }

    #[test]
    fn test_max_partitions_floor() {
        let planner = PartitionPlanner::new(None, 0);
        assert_eq!(planner.max_partitions(), 1);
    }

    #[test]
    fn test_synthesized_names_skip_mapped_names() {
        let lookup: KeyLookup = [("A", "sub_collection_1")].into_iter().collect();
        let plan = PartitionPlanner::default().plan_counts(
            &counts(&[("A", 1), ("B", 1)]),
            &lookup,
            &mut NameSequence::new(),
        );
        assert_eq!(plan.partition_for("B"), Some("sub_collection_2"));
    }

    #[test]
    fn test_synthesized_names_skip_lookup_names_absent_from_source() {
        let lookup: KeyLookup = [("X", "sub_collection_1")].into_iter().collect();
        let plan = PartitionPlanner::default().plan_counts(
            &counts(&[("A", 3)]),
            &lookup,
            &mut NameSequence::new(),
        );
        assert_eq!(plan.mapped_count(), 0);
        assert_eq!(plan.partition_for("A"), Some("sub_collection_2"));
    }

    #[test]
    fn test_plan_scans_source() {
        let source = MemorySource::new("mem", records_for(&[("A", 3), ("B", 5)]));
        let plan = PartitionPlanner::default()
            .plan(&source, "Token", &KeyLookup::new(), &mut NameSequence::new())
            .unwrap();

        assert_eq!(plan.total_records(), 8);
        assert_eq!(plan.key_count(), 2);
        assert_eq!(plan.partition_for("B"), Some("sub_collection_1"));
    }

    #[test]
    fn test_empty_source_gives_empty_plan() {
        let source = MemorySource::new("mem", Vec::new());
        let plan = PartitionPlanner::default()
            .plan(&source, "Token", &KeyLookup::new(), &mut NameSequence::new())
            .unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.total_records(), 0);
    }

    #[test]
    fn test_missing_split_field_is_schema_mismatch() {
        let mut records = records_for(&[("A", 2)]);
        records.push(Record::new().with_token("Other", "B"));
        let source = MemorySource::new("mem", records);

        let err = PartitionPlanner::default()
            .plan(&source, "Token", &KeyLookup::new(), &mut NameSequence::new())
            .unwrap_err();
        assert!(matches!(err, SplitError::SchemaMismatch { record: 3, .. }));
    }
}
