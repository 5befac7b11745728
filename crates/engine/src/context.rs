//! Request-scoped resolution cache
//!
//! One [`OperationContext`] lives for exactly one call to
//! `OperationProcessor::process`. The validator fills it with one
//! [`ResolveEntry`] per distinct [`ThingKey`] named by the batch, the
//! resolver completes the entries from storage and the apply phases read
//! (and refresh) them. It is never shared between requests.

use comet_core::{
    CometError, CometResult, ContainerInfo, Iid, MetaInfoProvider, Partition, Thing, ThingKey,
};
use std::collections::{BTreeMap, HashSet};

/// Known container of an entry
#[derive(Debug, Clone, PartialEq)]
pub enum ContainerSlot {
    /// Top container, has no container
    Root,
    /// Not known yet
    Unresolved,
    /// Known, either declared by the batch or loaded from storage
    Resolved(ContainerInfo),
}

/// Why an entry is in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRole {
    /// Target of a delete or update item; may legitimately be missing
    Target,
    /// Created by this batch
    Created,
    /// Container of another entry; must resolve
    Container,
    /// Named by a scalar reference; must resolve
    Reference,
}

/// Cache record for one thing named by the batch
#[derive(Debug, Clone)]
pub struct ResolveEntry {
    /// Resolution identity
    pub key: ThingKey,
    /// Partition the thing lives in
    pub partition: Partition,
    /// Current state, `None` until resolved or once deleted
    pub thing: Option<Thing>,
    /// Known container
    pub container: ContainerSlot,
    /// Why the entry exists
    pub role: EntryRole,
    /// Must resolve for the batch to proceed
    pub required: bool,
    /// Container taken from the batch payload rather than storage
    pub declared: bool,
    /// Storage has already been consulted
    pub fetched: bool,
}

impl ResolveEntry {
    fn new(key: ThingKey, partition: Partition, role: EntryRole, container: ContainerSlot) -> Self {
        ResolveEntry {
            key,
            partition,
            thing: None,
            container,
            role,
            required: matches!(role, EntryRole::Container | EntryRole::Reference),
            declared: false,
            fetched: false,
        }
    }

    /// True while storage still has to be consulted
    pub fn needs_fetch(&self) -> bool {
        !self.fetched && self.role != EntryRole::Created
    }
}

/// Resolution cache of one request
#[derive(Debug)]
pub struct OperationContext {
    partition: Partition,
    entries: BTreeMap<ThingKey, ResolveEntry>,
    created: HashSet<Iid>,
    deleted: HashSet<Iid>,
}

impl OperationContext {
    /// Empty context for a request against `partition`
    pub fn new(partition: Partition) -> Self {
        OperationContext {
            partition,
            entries: BTreeMap::new(),
            created: HashSet::new(),
            deleted: HashSet::new(),
        }
    }

    /// Partition the request targets
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Partition holding things of `type_name` for this request
    pub fn partition_for(&self, meta: &dyn MetaInfoProvider, type_name: &str) -> Partition {
        self.partition.for_type(meta.is_iteration_scoped(type_name))
    }

    /// Register the target of a delete or update item
    ///
    /// Does nothing if the key is already known.
    pub fn register_target(&mut self, key: ThingKey, partition: Partition, top_container: bool) {
        let container = if top_container {
            ContainerSlot::Root
        } else {
            ContainerSlot::Unresolved
        };
        self.entries
            .entry(key.clone())
            .or_insert_with(|| ResolveEntry::new(key, partition, EntryRole::Target, container));
    }

    /// Register a thing created by the batch
    pub fn register_created(&mut self, thing: Thing, partition: Partition) {
        let key = thing.key();
        self.created.insert(thing.iid);
        let mut entry = ResolveEntry::new(
            key.clone(),
            partition,
            EntryRole::Created,
            ContainerSlot::Unresolved,
        );
        entry.thing = Some(thing);
        self.entries.insert(key, entry);
    }

    /// Register a thing that must resolve because it contains or is named by another
    ///
    /// An existing entry is upgraded to required.
    pub fn register_required(
        &mut self,
        key: ThingKey,
        partition: Partition,
        role: EntryRole,
        top_container: bool,
    ) {
        let container = if top_container {
            ContainerSlot::Root
        } else {
            ContainerSlot::Unresolved
        };
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| ResolveEntry::new(key, partition, role, container));
        entry.required = true;
    }

    /// Record a container found in the batch payload
    pub fn declare_container(&mut self, key: &ThingKey, container: ContainerInfo) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.container = ContainerSlot::Resolved(container);
            entry.declared = true;
        }
    }

    /// Entry for a key
    pub fn entry(&self, key: &ThingKey) -> Option<&ResolveEntry> {
        self.entries.get(key)
    }

    /// Mutable entry for a key
    pub fn entry_mut(&mut self, key: &ThingKey) -> Option<&mut ResolveEntry> {
        self.entries.get_mut(key)
    }

    /// All entries in key order
    pub fn entries(&self) -> impl Iterator<Item = &ResolveEntry> {
        self.entries.values()
    }

    /// All entries in key order, mutably
    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut ResolveEntry> {
        self.entries.values_mut()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current state of a thing
    pub fn thing(&self, key: &ThingKey) -> Option<&Thing> {
        self.entries.get(key)?.thing.as_ref()
    }

    /// Partition of a registered thing, falling back to the request partition
    pub fn partition_of(&self, key: &ThingKey) -> Partition {
        self.entries
            .get(key)
            .map_or_else(|| self.partition.clone(), |entry| entry.partition.clone())
    }

    /// True if the batch creates `iid`
    pub fn is_created(&self, iid: Iid) -> bool {
        self.created.contains(&iid)
    }

    /// True if an earlier phase of this request removed `iid`
    pub fn is_deleted(&self, iid: Iid) -> bool {
        self.deleted.contains(&iid)
    }

    /// Container of a registered thing, `None` for top containers
    pub fn container_info(&self, key: &ThingKey) -> CometResult<Option<ContainerInfo>> {
        match self.entries.get(key).map(|entry| &entry.container) {
            Some(ContainerSlot::Root) => Ok(None),
            Some(ContainerSlot::Resolved(info)) => Ok(Some(info.clone())),
            _ => Err(CometError::not_found(key.type_name.clone(), key.iid)),
        }
    }

    /// Container of a registered thing together with its current state
    pub fn container_of(&self, key: &ThingKey) -> CometResult<Option<(ContainerInfo, Thing)>> {
        let Some(info) = self.container_info(key)? else {
            return Ok(None);
        };
        let container = self
            .thing(&info.key())
            .cloned()
            .ok_or_else(|| CometError::not_found(info.type_name.clone(), info.iid))?;
        Ok(Some((info, container)))
    }

    /// Replace the cached state of a thing after it was written
    pub fn refresh(&mut self, thing: Thing) {
        if let Some(entry) = self.entries.get_mut(&thing.key()) {
            entry.thing = Some(thing);
        }
    }

    /// Forget things removed from storage by this request
    pub fn mark_deleted(&mut self, keys: &[ThingKey]) {
        for key in keys {
            self.deleted.insert(key.iid);
            if let Some(entry) = self.entries.get_mut(key) {
                entry.thing = None;
            }
        }
    }
}
