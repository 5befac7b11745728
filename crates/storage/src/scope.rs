//! Per-scope state
//!
//! A scope is everything sharing one revision counter: the site directory,
//! or an engineering model together with its iteration partition. Things are
//! indexed by partition, then by identity.

use comet_core::{ContainerInfo, Iid, Partition, RevisionRecord, Thing};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A persisted thing and its container
#[derive(Debug, Clone)]
pub(crate) struct StoredThing {
    pub(crate) thing: Thing,
    pub(crate) container: Option<ContainerInfo>,
}

/// Things of one scope, cloned into each transaction
#[derive(Debug, Clone, Default)]
pub(crate) struct ScopeData {
    partitions: BTreeMap<Partition, BTreeMap<Iid, StoredThing>>,
}

impl ScopeData {
    pub(crate) fn get(&self, partition: &Partition, iid: Iid) -> Option<&StoredThing> {
        self.partitions.get(partition)?.get(&iid)
    }

    pub(crate) fn get_mut(&mut self, partition: &Partition, iid: Iid) -> Option<&mut StoredThing> {
        self.partitions.get_mut(partition)?.get_mut(&iid)
    }

    pub(crate) fn insert(&mut self, partition: &Partition, stored: StoredThing) {
        self.partitions
            .entry(partition.clone())
            .or_default()
            .insert(stored.thing.iid, stored);
    }

    pub(crate) fn remove(&mut self, partition: &Partition, iid: Iid) -> Option<StoredThing> {
        self.partitions.get_mut(partition)?.remove(&iid)
    }

    /// Partition holding `iid`, searching every partition of the scope
    pub(crate) fn locate(&self, iid: Iid) -> Option<Partition> {
        self.partitions
            .iter()
            .find(|(_, things)| things.contains_key(&iid))
            .map(|(partition, _)| partition.clone())
    }

    /// Things whose container is `iid`
    pub(crate) fn children_of(&self, iid: Iid) -> Vec<(Partition, Iid)> {
        self.partitions
            .iter()
            .flat_map(|(partition, things)| {
                things
                    .values()
                    .filter(move |stored| {
                        stored.container.as_ref().map_or(false, |c| c.iid == iid)
                    })
                    .map(move |stored| (partition.clone(), stored.thing.iid))
            })
            .collect()
    }

    pub(crate) fn things(&self, partition: &Partition) -> impl Iterator<Item = &StoredThing> {
        self.partitions
            .get(partition)
            .into_iter()
            .flat_map(|things| things.values())
    }

    pub(crate) fn all(&self) -> impl Iterator<Item = (&Partition, &StoredThing)> {
        self.partitions
            .iter()
            .flat_map(|(partition, things)| things.values().map(move |stored| (partition, stored)))
    }

    pub(crate) fn all_mut(&mut self) -> impl Iterator<Item = &mut StoredThing> {
        self.partitions.values_mut().flat_map(|things| things.values_mut())
    }

    pub(crate) fn len(&self) -> usize {
        self.partitions.values().map(BTreeMap::len).sum()
    }
}

/// Committed state of one scope
///
/// Immutable once published. The revision log is kept as one chunk per
/// committed revision so publishing a new state shares the older chunks.
#[derive(Debug, Default)]
pub(crate) struct Committed {
    pub(crate) data: ScopeData,
    pub(crate) high_water: Option<i64>,
    pub(crate) log: Vec<Arc<[RevisionRecord]>>,
}

impl Committed {
    pub(crate) fn records(&self) -> impl Iterator<Item = &RevisionRecord> {
        self.log.iter().flat_map(|chunk| chunk.iter())
    }
}

/// One revision scope: a writer lock and the last published state
///
/// Writers hold `writer` for the whole transaction. Readers only clone the
/// published `Arc`, so they never wait on a writer.
#[derive(Debug, Default)]
pub(crate) struct Scope {
    pub(crate) writer: Arc<Mutex<()>>,
    published: RwLock<Arc<Committed>>,
}

impl Scope {
    pub(crate) fn current(&self) -> Arc<Committed> {
        Arc::clone(&self.published.read())
    }

    pub(crate) fn publish(&self, committed: Committed) {
        *self.published.write() = Arc::new(committed);
    }
}
