//! Scope transactions
//!
//! A [`MemoryTransaction`] holds its scope's writer lock from `begin` until it
//! is committed or dropped and works on a private copy of the scope's things.
//! Commit publishes the copy and the pending revision records as the scope's
//! new committed state; dropping the transaction discards both.
//!
//! Containment is owned by the store: a child names its container, and the
//! container's composite collection mirrors its children. Every mutation
//! stamps the mutated things (and a container whose collection changed)
//! with the transaction revision.

use crate::scope::{Committed, Scope, ScopeData, StoredThing};
use comet_core::meta::ContainerProperty;
use comet_core::value::{insert_item, move_item, next_key, remove_item};
use comet_core::{
    CollectionEntry, CometError, CometResult, ContainerInfo, Iid, MetaInfoProvider, OrderedItem,
    Partition, PropertyKind, RevisionRecord, RevisionStore, Thing, ThingKey, ThingRecord,
    ThingStore, Value,
};
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::RawMutex;
use std::sync::Arc;
use tracing::{debug, trace};

/// Transaction over one revision scope
pub struct MemoryTransaction {
    scope: Partition,
    shared: Arc<Scope>,
    base: Arc<Committed>,
    _writer: ArcMutexGuard<RawMutex, ()>,
    working: ScopeData,
    pending_log: Vec<RevisionRecord>,
    pending_high_water: Option<i64>,
    revision: Option<i64>,
    meta: Arc<dyn MetaInfoProvider>,
    finished: bool,
}

impl std::fmt::Debug for MemoryTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransaction")
            .field("revision", &self.revision)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl MemoryTransaction {
    pub(crate) fn new(
        scope: Partition,
        shared: Arc<Scope>,
        writer: ArcMutexGuard<RawMutex, ()>,
        meta: Arc<dyn MetaInfoProvider>,
    ) -> Self {
        let base = shared.current();
        let working = base.data.clone();
        debug!(target: "comet::store", scope = %scope, things = working.len(), "Transaction started");
        MemoryTransaction {
            scope,
            shared,
            base,
            _writer: writer,
            working,
            pending_log: Vec::new(),
            pending_high_water: None,
            revision: None,
            meta,
            finished: false,
        }
    }

    /// Revision scope this transaction locks
    pub fn scope(&self) -> &Partition {
        &self.scope
    }

    /// Revision stamped on mutations, once set
    pub fn revision(&self) -> Option<i64> {
        self.revision
    }

    /// Publish all changes
    pub fn commit(mut self) -> CometResult<()> {
        let records = std::mem::take(&mut self.pending_log);
        let written = records.len();
        let mut log = self.base.log.clone();
        if !records.is_empty() {
            log.push(Arc::from(records));
        }
        self.shared.publish(Committed {
            data: std::mem::take(&mut self.working),
            high_water: self.pending_high_water.or(self.base.high_water),
            log,
        });
        self.finished = true;
        debug!(
            target: "comet::store",
            scope = %self.scope,
            revision = ?self.revision,
            records = written,
            "Transaction committed"
        );
        Ok(())
    }

    /// Discard all changes
    pub fn rollback(mut self) {
        self.finished = true;
        debug!(target: "comet::store", scope = %self.scope, revision = ?self.revision, "Transaction rolled back");
    }

    fn check_partition(&self, partition: &Partition) -> CometResult<()> {
        if partition.revision_scope() == self.scope {
            Ok(())
        } else {
            Err(CometError::storage(format!(
                "partition '{}' is outside the transaction scope '{}'",
                partition, self.scope
            )))
        }
    }

    fn stamp(&self) -> CometResult<i64> {
        self.revision
            .ok_or_else(|| CometError::storage("transaction revision has not been set"))
    }

    fn containment(&self, child_type: &str, parent_type: &str) -> CometResult<ContainerProperty> {
        self.meta
            .container_property(child_type, parent_type)
            .ok_or_else(|| {
                CometError::storage(format!("{} cannot contain {}", parent_type, child_type))
            })
    }

    /// Add `child` to the composite collection of `container`
    ///
    /// Returns the effective container (with the assigned position for
    /// ordered containment), or `None` if the position is taken.
    fn link_child(
        &mut self,
        child: &ThingKey,
        container: &ContainerInfo,
        revision: i64,
    ) -> CometResult<Option<ContainerInfo>> {
        let property = self.containment(&child.type_name, &container.type_name)?;
        let parent = self
            .working
            .locate(container.iid)
            .and_then(|partition| self.working.get_mut(&partition, container.iid))
            .filter(|parent| parent.thing.type_name == container.type_name)
            .ok_or_else(|| CometError::storage(format!("container {} not found", container.key())))?;

        let linked = match property.kind {
            PropertyKind::OrderedList => {
                let mut items = parent.thing.ordered(&property.property);
                let sequence = container.sequence.unwrap_or_else(|| next_key(&items));
                if !insert_item(&mut items, OrderedItem::new(sequence, child.iid)) {
                    return Ok(None);
                }
                parent.thing.set(property.property, Value::OrderedList(items));
                ContainerInfo::ordered(container.type_name.clone(), container.iid, sequence)
            }
            _ => {
                let mut ids = parent.thing.ids(&property.property);
                if !ids.contains(&child.iid) {
                    ids.push(child.iid);
                }
                parent.thing.set(property.property, Value::id_list(ids));
                ContainerInfo::new(container.type_name.clone(), container.iid)
            }
        };
        parent.thing.revision_number = revision;
        Ok(Some(linked))
    }

    /// Remove `child` from the composite collection of `container`, if both still exist
    fn unlink_child(
        &mut self,
        child: &ThingKey,
        container: &ContainerInfo,
        revision: i64,
    ) -> CometResult<()> {
        let property = self.containment(&child.type_name, &container.type_name)?;
        let Some(parent) = self
            .working
            .locate(container.iid)
            .and_then(|partition| self.working.get_mut(&partition, container.iid))
        else {
            return Ok(());
        };
        match property.kind {
            PropertyKind::OrderedList => {
                let mut items = parent.thing.ordered(&property.property);
                items.retain(|item| item.value.as_id() != Some(child.iid));
                parent.thing.set(property.property, Value::OrderedList(items));
            }
            _ => {
                let mut ids = parent.thing.ids(&property.property);
                ids.retain(|iid| *iid != child.iid);
                parent.thing.set(property.property, Value::id_list(ids));
            }
        }
        parent.thing.revision_number = revision;
        Ok(())
    }

    fn target_mut(&mut self, partition: &Partition, key: &ThingKey) -> Option<&mut StoredThing> {
        self.working
            .get_mut(partition, key.iid)
            .filter(|stored| stored.thing.type_name == key.type_name)
    }

    fn is_composite(&self, type_name: &str, property: &str) -> bool {
        self.meta
            .property(type_name, property)
            .map_or(false, |info| info.is_composite())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            debug!(target: "comet::store", scope = %self.scope, revision = ?self.revision, "Transaction dropped without commit");
        }
    }
}

impl ThingStore for MemoryTransaction {
    fn read(
        &self,
        partition: &Partition,
        type_name: &str,
        ids: Option<&[Iid]>,
    ) -> CometResult<Vec<ThingRecord>> {
        self.check_partition(partition)?;
        let records = match ids {
            Some(ids) => ids
                .iter()
                .filter_map(|iid| self.working.get(partition, *iid))
                .filter(|stored| stored.thing.type_name == type_name)
                .map(record)
                .collect(),
            None => self
                .working
                .things(partition)
                .filter(|stored| stored.thing.type_name == type_name)
                .map(record)
                .collect(),
        };
        Ok(records)
    }

    fn resolve_type_name(&self, partition: &Partition, iid: Iid) -> CometResult<Option<String>> {
        self.check_partition(partition)?;
        Ok(self
            .working
            .get(partition, iid)
            .map(|stored| stored.thing.type_name.clone()))
    }

    fn create(
        &mut self,
        partition: &Partition,
        thing: &Thing,
        container: Option<&ContainerInfo>,
    ) -> CometResult<bool> {
        self.check_partition(partition)?;
        let revision = self.stamp()?;
        let meta = Arc::clone(&self.meta);
        let type_info = meta
            .type_info(&thing.type_name)
            .ok_or_else(|| CometError::storage(format!("unknown type '{}'", thing.type_name)))?;
        if self.working.locate(thing.iid).is_some() {
            return Ok(false);
        }

        let mut stored = thing.clone();
        for property in type_info.properties().filter(|p| p.is_composite()) {
            let empty = match property.kind {
                PropertyKind::OrderedList => Value::OrderedList(Vec::new()),
                _ => Value::List(Vec::new()),
            };
            stored.set(property.name.clone(), empty);
        }
        stored.revision_number = revision;

        let linked = if type_info.is_top_container {
            None
        } else {
            let container = container.ok_or_else(|| {
                CometError::storage(format!("{} requires a container", thing.key()))
            })?;
            match self.link_child(&thing.key(), container, revision)? {
                Some(linked) => Some(linked),
                None => return Ok(false),
            }
        };

        trace!(target: "comet::store", partition = %partition, thing = %thing.key(), revision, "Created");
        self.working.insert(
            partition,
            StoredThing {
                thing: stored,
                container: linked,
            },
        );
        Ok(true)
    }

    fn update(
        &mut self,
        partition: &Partition,
        thing: &Thing,
        container: Option<&ContainerInfo>,
    ) -> CometResult<bool> {
        self.check_partition(partition)?;
        let revision = self.stamp()?;
        let key = thing.key();
        let Some(current) = self.working.get(partition, thing.iid) else {
            return Ok(false);
        };
        if current.thing.type_name != thing.type_name {
            return Ok(false);
        }
        let current_container = current.container.clone();

        if let Some(target) = container {
            let moved = current_container
                .as_ref()
                .map_or(true, |existing| existing.key() != target.key());
            if moved {
                let Some(linked) = self.link_child(&key, target, revision)? else {
                    return Ok(false);
                };
                if let Some(previous) = &current_container {
                    self.unlink_child(&key, previous, revision)?;
                }
                if let Some(stored) = self.working.get_mut(partition, thing.iid) {
                    stored.container = Some(linked);
                    stored.thing.revision_number = revision;
                }
                trace!(target: "comet::store", thing = %key, container = %target.key(), "Moved");
            }
        }

        let meta = Arc::clone(&self.meta);
        let Some(stored) = self.working.get_mut(partition, thing.iid) else {
            return Ok(false);
        };
        let is_composite = |name: &str| {
            meta.property(&thing.type_name, name)
                .map_or(false, |info| info.is_composite())
        };
        let mut changed = false;
        for (name, value) in thing.properties() {
            if !is_composite(name.as_str()) {
                changed |= stored.thing.set(name.clone(), value.clone());
            }
        }
        let stale: Vec<String> = stored
            .thing
            .properties()
            .map(|(name, _)| name.clone())
            .filter(|name| !is_composite(name.as_str()) && thing.get(name).is_none())
            .collect();
        for name in stale {
            stored.thing.remove(&name);
            changed = true;
        }
        if changed {
            stored.thing.revision_number = revision;
            trace!(target: "comet::store", thing = %key, revision, "Updated");
        }
        Ok(true)
    }

    fn delete(&mut self, partition: &Partition, key: &ThingKey) -> CometResult<Vec<ThingKey>> {
        self.check_partition(partition)?;
        let revision = self.stamp()?;
        let Some(root) = self.target_mut(partition, key) else {
            return Ok(Vec::new());
        };
        let root_container = root.container.clone();

        let mut removed = Vec::new();
        let mut pending = vec![(partition.clone(), key.iid)];
        while let Some((owner_partition, iid)) = pending.pop() {
            let Some(stored) = self.working.remove(&owner_partition, iid) else {
                continue;
            };
            pending.extend(self.working.children_of(iid));
            removed.push(stored.thing.key());
        }
        if let Some(container) = root_container {
            self.unlink_child(key, &container, revision)?;
        }
        trace!(target: "comet::store", thing = %key, cascaded = removed.len() - 1, "Deleted");
        Ok(removed)
    }

    fn add_to_collection(
        &mut self,
        partition: &Partition,
        key: &ThingKey,
        property: &str,
        entry: &CollectionEntry,
    ) -> CometResult<bool> {
        self.check_partition(partition)?;
        let revision = self.stamp()?;
        let Some(stored) = self.target_mut(partition, key) else {
            return Ok(false);
        };
        let changed = match entry {
            CollectionEntry::Member(value) => {
                let mut members = members_of(&stored.thing, property);
                if members.contains(value) {
                    false
                } else {
                    members.push(value.clone());
                    stored.thing.set(property, Value::List(members));
                    true
                }
            }
            CollectionEntry::Ordered(item) => {
                let mut items = stored.thing.ordered(property);
                let inserted = insert_item(&mut items, item.clone());
                if inserted {
                    stored.thing.set(property, Value::OrderedList(items));
                }
                inserted
            }
        };
        if changed {
            stored.thing.revision_number = revision;
        }
        Ok(changed)
    }

    fn remove_from_collection(
        &mut self,
        partition: &Partition,
        key: &ThingKey,
        property: &str,
        entry: &CollectionEntry,
    ) -> CometResult<bool> {
        self.check_partition(partition)?;
        let revision = self.stamp()?;
        let Some(stored) = self.target_mut(partition, key) else {
            return Ok(false);
        };
        let changed = match entry {
            CollectionEntry::Member(value) => {
                let mut members = members_of(&stored.thing, property);
                let before = members.len();
                members.retain(|member| member != value);
                let removed = members.len() != before;
                if removed {
                    stored.thing.set(property, Value::List(members));
                }
                removed
            }
            CollectionEntry::Ordered(item) => {
                let mut items = stored.thing.ordered(property);
                let removed = remove_item(&mut items, item.key, &item.value);
                if removed {
                    stored.thing.set(property, Value::OrderedList(items));
                }
                removed
            }
        };
        if changed {
            stored.thing.revision_number = revision;
        }
        Ok(changed)
    }

    fn reorder_collection(
        &mut self,
        partition: &Partition,
        key: &ThingKey,
        property: &str,
        item: &OrderedItem,
    ) -> CometResult<bool> {
        self.check_partition(partition)?;
        let revision = self.stamp()?;
        if self.is_composite(&key.type_name, property) {
            return Err(CometError::storage(format!(
                "{}.{} is a containment collection",
                key.type_name, property
            )));
        }
        let Some(to) = item.move_to else {
            return Ok(false);
        };
        let Some(stored) = self.target_mut(partition, key) else {
            return Ok(false);
        };
        let mut items = stored.thing.ordered(property);
        if !move_item(&mut items, item.key, to) {
            return Ok(false);
        }
        stored.thing.set(property, Value::OrderedList(items));
        stored.thing.revision_number = revision;
        Ok(true)
    }

    fn reorder_containment(
        &mut self,
        partition: &Partition,
        child: &ThingKey,
        item: &OrderedItem,
    ) -> CometResult<bool> {
        self.check_partition(partition)?;
        let revision = self.stamp()?;
        let Some(to) = item.move_to else {
            return Ok(false);
        };
        let Some(container) = self
            .working
            .get(partition, child.iid)
            .and_then(|stored| stored.container.clone())
        else {
            return Ok(false);
        };
        let property = self.containment(&child.type_name, &container.type_name)?;
        if property.kind != PropertyKind::OrderedList {
            return Ok(false);
        }
        let from = container.sequence.unwrap_or(item.key);

        let Some(parent) = self
            .working
            .locate(container.iid)
            .and_then(|p| self.working.get_mut(&p, container.iid))
        else {
            return Ok(false);
        };
        let mut items = parent.thing.ordered(&property.property);
        if !move_item(&mut items, from, to) {
            return Ok(false);
        }
        parent.thing.set(property.property, Value::OrderedList(items.clone()));
        parent.thing.revision_number = revision;

        for entry in &items {
            let Some(sibling) = entry.value.as_id() else {
                continue;
            };
            if let Some(stored) = self
                .working
                .locate(sibling)
                .and_then(|p| self.working.get_mut(&p, sibling))
            {
                if let Some(info) = stored.container.as_mut() {
                    if info.sequence != Some(entry.key) {
                        info.sequence = Some(entry.key);
                        stored.thing.revision_number = revision;
                    }
                }
            }
        }
        Ok(true)
    }
}

impl RevisionStore for MemoryTransaction {
    fn revision_high_water(&self, partition: &Partition) -> CometResult<Option<i64>> {
        self.check_partition(partition)?;
        Ok(self.pending_high_water.or(self.base.high_water))
    }

    fn set_transaction_revision(&mut self, revision: i64) -> CometResult<()> {
        let current = self.pending_high_water.or(self.base.high_water).unwrap_or(0);
        if revision <= current {
            return Err(CometError::storage(format!(
                "revision {} is not above the high-water mark {}",
                revision, current
            )));
        }
        self.revision = Some(revision);
        Ok(())
    }

    fn changed_things(
        &self,
        partition: &Partition,
        revision: i64,
    ) -> CometResult<Vec<(Partition, Thing)>> {
        self.check_partition(partition)?;
        Ok(self
            .working
            .all()
            .filter(|(_, stored)| stored.thing.revision_number == revision)
            .map(|(partition, stored)| (partition.clone(), stored.thing.clone()))
            .collect())
    }

    fn append_revisions(&mut self, records: Vec<RevisionRecord>) -> CometResult<()> {
        if let Some(outside) = records
            .iter()
            .find(|record| record.partition.revision_scope() != self.scope)
        {
            return Err(CometError::storage(format!(
                "revision record for partition '{}' is outside the transaction scope '{}'",
                outside.partition, self.scope
            )));
        }
        self.pending_log.extend(records);
        Ok(())
    }

    fn set_revision_high_water(&mut self, partition: &Partition, revision: i64) -> CometResult<()> {
        self.check_partition(partition)?;
        self.pending_high_water = Some(revision);
        Ok(())
    }

    fn things_since(&self, partition: &Partition, revision: i64) -> CometResult<Vec<Thing>> {
        self.check_partition(partition)?;
        Ok(self
            .working
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
            .base
            .records()
            .chain(self.pending_log.iter())
            .filter(|record| {
                &record.partition == partition
                    && record.iid == iid
                    && record.revision >= from
                    && record.revision <= to
            })
            .cloned()
            .collect();
        records.sort_by_key(|record| record.revision);
        Ok(records)
    }
}

fn record(stored: &StoredThing) -> ThingRecord {
    ThingRecord {
        thing: stored.thing.clone(),
        container: stored.container.clone(),
    }
}

fn members_of(thing: &Thing, property: &str) -> Vec<Value> {
    thing
        .get(property)
        .and_then(Value::members)
        .map(<[Value]>::to_vec)
        .unwrap_or_default()
}
