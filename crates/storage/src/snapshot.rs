//! Read-only scope snapshots
//!
//! A [`MemorySnapshot`] pins the committed state of one scope at the moment
//! it was taken. It shares that state with the store through an `Arc`, so
//! taking one is cheap and later commits never change what it returns.

use crate::scope::Committed;
use comet_core::{
    CometError, CometResult, Iid, Partition, RevisionRecord, RevisionView, Thing, ThingRecord,
};
use std::sync::Arc;

/// Point-in-time view of one revision scope
#[derive(Debug, Clone)]
pub struct MemorySnapshot {
    scope: Partition,
    committed: Arc<Committed>,
}

impl MemorySnapshot {
    pub(crate) fn new(scope: Partition, committed: Arc<Committed>) -> Self {
        MemorySnapshot { scope, committed }
    }

    /// Revision scope the snapshot was taken of
    pub fn scope(&self) -> &Partition {
        &self.scope
    }

    fn check_partition(&self, partition: &Partition) -> CometResult<()> {
        if partition.revision_scope() == self.scope {
            Ok(())
        } else {
            Err(CometError::storage(format!(
                "partition '{}' is outside the snapshot scope '{}'",
                partition, self.scope
            )))
        }
    }
}

impl RevisionView for MemorySnapshot {
    fn read(
        &self,
        partition: &Partition,
        type_name: &str,
        ids: Option<&[Iid]>,
    ) -> CometResult<Vec<ThingRecord>> {
        self.check_partition(partition)?;
        let data = &self.committed.data;
        let to_record = |stored: &crate::scope::StoredThing| ThingRecord {
            thing: stored.thing.clone(),
            container: stored.container.clone(),
        };
        let records = match ids {
            Some(ids) => ids
                .iter()
                .filter_map(|iid| data.get(partition, *iid))
                .filter(|stored| stored.thing.type_name == type_name)
                .map(to_record)
                .collect(),
            None => data
                .things(partition)
                .filter(|stored| stored.thing.type_name == type_name)
                .map(to_record)
                .collect(),
        };
        Ok(records)
    }

    fn revision_high_water(&self) -> Option<i64> {
        self.committed.high_water
    }

    fn things_since(&self, partition: &Partition, revision: i64) -> CometResult<Vec<Thing>> {
        self.check_partition(partition)?;
        Ok(self
            .committed
            .data
            .things(partition)
            .filter(|stored| stored.thing.revision_number > revision)
            .map(|stored| stored.thing.clone())
            .collect())
    }

    fn revision_history(
        &self,
        partition: &Partition,
        iid: Iid,
        from: i64,
        to: i64,
    ) -> CometResult<Vec<RevisionRecord>> {
        self.check_partition(partition)?;
        let mut records: Vec<RevisionRecord> = self
            .committed
            .records()
            .filter(|record| {
                &record.partition == partition
                    && record.iid == iid
                    && (from..=to).contains(&record.revision)
            })
            .cloned()
            .collect();
        records.sort_by_key(|record| record.revision);
        Ok(records)
    }
}
