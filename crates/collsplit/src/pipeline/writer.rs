//! Row routing (pass 2).

use tracing::debug;

use super::planner::{PartitionPlan, partition_key};
use super::pool::ResourcePool;
use crate::error::{SplitError, UnknownKeyAtWriteTimeSnafu};
use crate::source::RecordSource;

/// Routes every record of a source to its planned partition.
pub struct PartitionWriter<'a> {
    plan: &'a PartitionPlan,
    split_ref: &'a str,
    dst_ref: &'a str,
}

impl<'a> PartitionWriter<'a> {
    /// `split_ref` names the column holding the partition key; the source's
    /// primary reference column is renamed to `dst_ref` in every row.
    pub fn new(plan: &'a PartitionPlan, split_ref: &'a str, dst_ref: &'a str) -> Self {
        Self {
            plan,
            split_ref,
            dst_ref,
        }
    }

    /// Make a second pass over `source`, handing each row to `pool`.
    ///
    /// Returns the number of rows routed. Sinks are finalized by the pool.
    pub fn write(&self, source: &dyn RecordSource, pool: &mut ResourcePool) -> Result<u64, SplitError> {
        let src_ref = source.primary_ref();
        let mut routed = 0u64;

        for record in source.records()? {
            let record = record?;
            let key = partition_key(&record, self.split_ref, source.name(), routed + 1)?;

            if self.plan.partition_for(key).is_none() {
                return UnknownKeyAtWriteTimeSnafu {
                    key,
                    source_name: source.name(),
                }
                .fail();
            }
            let key = key.to_string();

            let row = record.into_row(src_ref, self.dst_ref);
            pool.insert_row(&key, row)?;
            routed += 1;
        }

        debug!(source = source.name(), rows = routed, "Routed rows");
        Ok(routed)
    }
}
