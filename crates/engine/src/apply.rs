//! Phase application
//!
//! Applies a validated and resolved batch in strict phase order: deletes,
//! then creates, then updates. Every write goes through the request's
//! transaction, every target is checked with the permission oracle first and
//! the type's hooks run around it.
//!
//! Deletes are idempotent: a target that is already gone, or a link that is
//! already absent, is logged and skipped. Updates of targets that no longer
//! exist are skipped the same way.

use crate::context::{ContainerSlot, OperationContext};
use crate::side_effects::{HookContext, SideEffectRegistry};
use comet_core::{
    ClasslessDto, CollectionEntry, CometError, CometResult, ContainerInfo, Iid, MetaInfoProvider,
    OperationKind, OrderedItem, Partition, PermissionOracle, PropertyInfo, PropertyKind, Thing,
    ThingKey, ThingRecord, ThingStore, Value,
};
use tracing::{debug, info, trace, warn};

pub(crate) struct ApplyEngine<'a> {
    pub(crate) meta: &'a dyn MetaInfoProvider,
    pub(crate) side_effects: &'a SideEffectRegistry,
    pub(crate) permissions: &'a dyn PermissionOracle,
}

impl<'a> ApplyEngine<'a> {
    // ========================================================================
    // Delete phase
    // ========================================================================

    pub(crate) fn apply_deletes(
        &self,
        items: &[ClasslessDto],
        ctx: &mut OperationContext,
        store: &mut dyn ThingStore,
    ) -> CometResult<()> {
        for item in items {
            let key = item.key()?;
            if item.is_identity_only() {
                self.delete_target(&key, ctx, store)?;
            } else {
                self.unlink(item, &key, ctx, store)?;
            }
        }
        debug!(target: "comet::operation", items = items.len(), "Delete phase done");
        Ok(())
    }

    fn delete_target(
        &self,
        key: &ThingKey,
        ctx: &mut OperationContext,
        store: &mut dyn ThingStore,
    ) -> CometResult<()> {
        let Some(thing) = ctx.thing(key).cloned() else {
            info!(target: "comet::operation", thing = %key, "Delete target does not exist, skipped");
            return Ok(());
        };
        let partition = ctx.partition_of(key);
        let container = ctx.container_of(key)?.map(|(_, container)| container);
        self.delete_thing(thing, &partition, container, ctx, store)
    }

    fn delete_thing(
        &self,
        thing: Thing,
        partition: &Partition,
        container: Option<Thing>,
        ctx: &mut OperationContext,
        store: &mut dyn ThingStore,
    ) -> CometResult<()> {
        self.check_write(&thing, OperationKind::Delete, partition)?;
        self.side_effects
            .before_delete(&thing, container.as_ref(), &mut self.hooks(store, partition))?;

        let removed = store.delete(partition, &thing.key())?;
        if removed.is_empty() {
            info!(target: "comet::operation", thing = %thing.key(), "Already deleted, skipped");
            return Ok(());
        }
        ctx.mark_deleted(&removed);
        if let Some(container) = &container {
            self.reload(ctx, store, &container.key())?;
        }
        trace!(target: "comet::operation", thing = %thing.key(), removed = removed.len(), "Deleted");

        self.side_effects.after_delete(
            &thing,
            container.as_ref(),
            &thing,
            &mut self.hooks(store, partition),
        )
    }

    /// Remove the collection members named by a delete item
    fn unlink(
        &self,
        item: &ClasslessDto,
        key: &ThingKey,
        ctx: &mut OperationContext,
        store: &mut dyn ThingStore,
    ) -> CometResult<()> {
        let Some(target) = ctx.thing(key).cloned() else {
            info!(target: "comet::operation", thing = %key, "Unlink target does not exist, skipped");
            return Ok(());
        };
        let partition = ctx.partition_of(key);
        self.check_write(&target, OperationKind::Delete, &partition)?;

        for (name, value) in item.properties() {
            let property = self.property(&key.type_name, name)?;
            if property.is_composite() {
                let child_type = referenced_type(key, property)?;
                for iid in member_ids(property.kind, value) {
                    self.delete_member(key, child_type, iid, ctx, store)?;
                }
                continue;
            }
            for entry in collection_entries(property.kind, value) {
                if !store.remove_from_collection(&partition, key, name, &entry)? {
                    info!(
                        target: "comet::operation",
                        thing = %key,
                        property = %name,
                        "Link already absent, skipped"
                    );
                }
            }
        }
        self.reload(ctx, store, key)?;
        Ok(())
    }

    /// Cascade-delete a composite member of `parent`
    fn delete_member(
        &self,
        parent: &ThingKey,
        child_type: &str,
        iid: Iid,
        ctx: &mut OperationContext,
        store: &mut dyn ThingStore,
    ) -> CometResult<()> {
        let partition = ctx.partition_for(self.meta, child_type);
        let record = match store.resolve_type_name(&partition, iid)? {
            Some(actual) => read_one(store, &partition, &ThingKey::new(actual, iid))?,
            None => None,
        };
        match record {
            Some(record) if record.container.as_ref().map(|c| c.iid) == Some(parent.iid) => {
                let container = ctx.thing(parent).cloned();
                self.delete_thing(record.thing, &partition, container, ctx, store)
            }
            _ => {
                info!(
                    target: "comet::operation",
                    container = %parent,
                    member = %iid,
                    "Member already removed, skipped"
                );
                Ok(())
            }
        }
    }

    // ========================================================================
    // Create phase
    // ========================================================================

    pub(crate) fn apply_creates(
        &self,
        items: &[ClasslessDto],
        ctx: &mut OperationContext,
        store: &mut dyn ThingStore,
    ) -> CometResult<()> {
        for key in self.creation_order(items, ctx)? {
            self.create_thing(&key, ctx, store)?;
        }
        debug!(target: "comet::operation", items = items.len(), "Create phase done");
        Ok(())
    }

    /// Created keys with every container ahead of its children, otherwise in payload order
    fn creation_order(
        &self,
        items: &[ClasslessDto],
        ctx: &OperationContext,
    ) -> CometResult<Vec<ThingKey>> {
        let mut ordered = Vec::with_capacity(items.len());
        for item in items {
            let key = item.key()?;
            let mut depth = 0usize;
            let mut current = key.clone();
            while let Some(info) = ctx.container_info(&current)? {
                if !ctx.is_created(info.iid) {
                    break;
                }
                depth += 1;
                if depth > items.len() {
                    return Err(CometError::malformed(format!(
                        "{} is part of a containment cycle",
                        key
                    )));
                }
                current = info.key();
            }
            ordered.push((depth, key));
        }
        ordered.sort_by_key(|(depth, _)| *depth);
        Ok(ordered.into_iter().map(|(_, key)| key).collect())
    }

    fn create_thing(
        &self,
        key: &ThingKey,
        ctx: &mut OperationContext,
        store: &mut dyn ThingStore,
    ) -> CometResult<()> {
        let partition = ctx.partition_of(key);
        for owner in partition.scope_partitions() {
            if let Some(existing) = store.resolve_type_name(&owner, key.iid)? {
                warn!(target: "comet::operation", thing = %key, existing = %existing, partition = %owner, "Create of an existing identity");
                return Err(CometError::DuplicateEntity {
                    type_name: key.type_name.clone(),
                    iid: key.iid,
                });
            }
        }
        let (info, container) = ctx
            .container_of(key)?
            .ok_or_else(|| CometError::malformed(format!("{} has no container", key)))?;
        let mut thing = ctx
            .thing(key)
            .cloned()
            .ok_or_else(|| CometError::not_found(key.type_name.clone(), key.iid))?;
        self.check_write(&thing, OperationKind::Create, &partition)?;

        let original = thing.clone();
        let allowed = self.side_effects.before_create(
            &mut thing,
            &container,
            &mut self.hooks(store, &partition),
        )?;
        if !allowed {
            warn!(target: "comet::operation", thing = %key, "Create vetoed");
            return Err(CometError::HookVetoed {
                type_name: key.type_name.clone(),
                iid: key.iid,
            });
        }

        if !store.create(&partition, &thing, Some(&info))? {
            return Err(CometError::storage(format!(
                "{} could not be stored in {}: identity or position already taken",
                key,
                info.key()
            )));
        }
        let persisted = read_one(store, &partition, key)?
            .ok_or_else(|| CometError::storage(format!("{} is not readable after create", key)))?;
        ctx.refresh(persisted.thing.clone());
        if let (Some(entry), Some(stored)) = (ctx.entry_mut(key), persisted.container) {
            entry.container = ContainerSlot::Resolved(stored);
        }
        let container = self.reload(ctx, store, &info.key())?.unwrap_or(container);
        trace!(target: "comet::operation", thing = %key, container = %info.key(), "Created");

        self.side_effects.after_create(
            &persisted.thing,
            &container,
            &original,
            &mut self.hooks(store, &partition),
        )
    }

    // ========================================================================
    // Update phase
    // ========================================================================

    pub(crate) fn apply_updates(
        &self,
        items: &[ClasslessDto],
        ctx: &mut OperationContext,
        store: &mut dyn ThingStore,
    ) -> CometResult<()> {
        for item in items {
            self.update_thing(item, ctx, store)?;
        }
        debug!(target: "comet::operation", items = items.len(), "Update phase done");
        Ok(())
    }

    fn update_thing(
        &self,
        item: &ClasslessDto,
        ctx: &mut OperationContext,
        store: &mut dyn ThingStore,
    ) -> CometResult<()> {
        let key = item.key()?;
        if ctx.is_deleted(key.iid) {
            info!(target: "comet::operation", thing = %key, "Update target deleted by this batch, skipped");
            return Ok(());
        }
        let Some(current) = ctx.thing(&key).cloned() else {
            info!(target: "comet::operation", thing = %key, "Update target does not exist, skipped");
            return Ok(());
        };
        let partition = ctx.partition_of(&key);
        let container = ctx.container_of(&key)?.map(|(_, container)| container);
        self.check_write(&current, OperationKind::Update, &partition)?;

        let original = current.clone();
        let mut working = current;
        self.side_effects.before_update(
            &mut working,
            container.as_ref(),
            item,
            &mut self.hooks(store, &partition),
        )?;

        let mut collections = Vec::new();
        for (name, value) in item.properties() {
            let property = self.property(&key.type_name, name)?;
            match property.kind {
                PropertyKind::Scalar | PropertyKind::ValueArray => {
                    working.set(name.clone(), value.clone());
                }
                PropertyKind::List | PropertyKind::OrderedList => collections.push((property, value)),
            }
        }
        if working != original && !store.update(&partition, &working, None)? {
            return Err(CometError::storage(format!("{} vanished during update", key)));
        }

        let mut linked = false;
        for (property, value) in collections {
            linked |= match (property.kind, property.is_composite()) {
                (PropertyKind::OrderedList, true) => {
                    self.arrange_children(&key, property, value, ctx, store)?
                }
                (PropertyKind::OrderedList, false) => {
                    self.merge_ordered(&key, &partition, property, value, store)?
                }
                (_, true) => self.adopt_children(&key, property, value, ctx, store)?,
                (_, false) => self.link_members(&key, &partition, property, value, store)?,
            };
        }

        let refreshed = self
            .reload(ctx, store, &key)?
            .ok_or_else(|| CometError::not_found(key.type_name.clone(), key.iid))?;
        if refreshed == original && !linked {
            debug!(target: "comet::operation", thing = %key, "Update changed nothing");
            return Ok(());
        }
        trace!(target: "comet::operation", thing = %key, "Updated");
        self.side_effects.after_update(
            &refreshed,
            container.as_ref(),
            &original,
            &mut self.hooks(store, &partition),
        )
    }

    /// Link new members into an unordered non-composite collection
    fn link_members(
        &self,
        key: &ThingKey,
        partition: &Partition,
        property: &PropertyInfo,
        value: &Value,
        store: &mut dyn ThingStore,
    ) -> CometResult<bool> {
        let mut changed = false;
        for member in value.members().unwrap_or_default() {
            let entry = CollectionEntry::Member(member.clone());
            changed |= store.add_to_collection(partition, key, &property.name, &entry)?;
        }
        Ok(changed)
    }

    /// Add new entries to an ordered non-composite collection, then apply moves
    fn merge_ordered(
        &self,
        key: &ThingKey,
        partition: &Partition,
        property: &PropertyInfo,
        value: &Value,
        store: &mut dyn ThingStore,
    ) -> CometResult<bool> {
        let items = value.ordered_items().unwrap_or_default();
        let mut changed = false;
        for item in items.iter().filter(|item| item.move_to.is_none()) {
            let entry = CollectionEntry::Ordered(item.clone());
            if store.add_to_collection(partition, key, &property.name, &entry)? {
                changed = true;
            } else {
                trace!(target: "comet::operation", thing = %key, position = item.key, "Entry already present");
            }
        }
        for item in items.iter().filter(|item| item.move_to.is_some()) {
            if store.reorder_collection(partition, key, &property.name, item)? {
                changed = true;
            } else {
                info!(
                    target: "comet::operation",
                    thing = %key,
                    property = %property.name,
                    from = item.key,
                    to = ?item.move_to,
                    "Move of an absent position, skipped"
                );
            }
        }
        Ok(changed)
    }

    /// Re-parent the members of an unordered composite collection to `key`
    fn adopt_children(
        &self,
        key: &ThingKey,
        property: &PropertyInfo,
        value: &Value,
        ctx: &mut OperationContext,
        store: &mut dyn ThingStore,
    ) -> CometResult<bool> {
        let child_type = referenced_type(key, property)?;
        let target = ContainerInfo::new(key.type_name.clone(), key.iid);
        let mut changed = false;
        for iid in value.ids() {
            if ctx.is_created(iid) {
                continue;
            }
            changed |= self.reparent(child_type, iid, &target, ctx, store)?;
        }
        Ok(changed)
    }

    /// Reorder or re-parent the members of an ordered composite collection
    fn arrange_children(
        &self,
        key: &ThingKey,
        property: &PropertyInfo,
        value: &Value,
        ctx: &mut OperationContext,
        store: &mut dyn ThingStore,
    ) -> CometResult<bool> {
        let child_type = referenced_type(key, property)?;
        let partition = ctx.partition_for(self.meta, child_type);
        let mut changed = false;
        for item in value.ordered_items().unwrap_or_default() {
            let Some(iid) = item.value.as_id() else {
                continue;
            };
            if ctx.is_created(iid) {
                continue;
            }
            if item.move_to.is_some() {
                let Some(actual) = store.resolve_type_name(&partition, iid)? else {
                    info!(target: "comet::operation", child = %iid, container = %key, "Move of an absent member, skipped");
                    continue;
                };
                changed |= self.reorder_child(&partition, &ThingKey::new(actual, iid), item, ctx, store)?;
            } else {
                let target = ContainerInfo::ordered(key.type_name.clone(), key.iid, item.key);
                changed |= self.reparent(child_type, iid, &target, ctx, store)?;
            }
        }
        Ok(changed)
    }

    fn reorder_child(
        &self,
        partition: &Partition,
        child: &ThingKey,
        item: &OrderedItem,
        ctx: &mut OperationContext,
        store: &mut dyn ThingStore,
    ) -> CometResult<bool> {
        if !store.reorder_containment(partition, child, item)? {
            info!(target: "comet::operation", thing = %child, to = ?item.move_to, "Move of an absent position, skipped");
            return Ok(false);
        }
        if let Some(record) = read_one(store, partition, child)? {
            if let Some(entry) = ctx.entry_mut(child) {
                entry.container = record.container.map_or(ContainerSlot::Root, ContainerSlot::Resolved);
                entry.thing = Some(record.thing);
            }
        }
        Ok(true)
    }

    /// Move an existing child under `target`
    ///
    /// False if it is already there, or if it cannot be found or moved; the
    /// latter is logged and skipped.
    fn reparent(
        &self,
        child_type: &str,
        iid: Iid,
        target: &ContainerInfo,
        ctx: &mut OperationContext,
        store: &mut dyn ThingStore,
    ) -> CometResult<bool> {
        let partition = ctx.partition_for(self.meta, child_type);
        let Some(actual) = store.resolve_type_name(&partition, iid)? else {
            info!(target: "comet::operation", child = %iid, container = %target.key(), "Re-parent of an absent member, skipped");
            return Ok(false);
        };
        let child_key = ThingKey::new(actual, iid);
        let Some(record) = read_one(store, &partition, &child_key)? else {
            info!(target: "comet::operation", thing = %child_key, container = %target.key(), "Re-parent of an unreadable member, skipped");
            return Ok(false);
        };
        if record.container.as_ref().map(ContainerInfo::key) == Some(target.key()) {
            return Ok(false);
        }

        self.check_write(&record.thing, OperationKind::Update, &partition)?;
        if !store.update(&partition, &record.thing, Some(target))? {
            info!(target: "comet::operation", thing = %child_key, container = %target.key(), "Re-parent not applied, skipped");
            return Ok(false);
        }
        if let Some(moved) = read_one(store, &partition, &child_key)? {
            if let Some(entry) = ctx.entry_mut(&child_key) {
                entry.container = moved.container.map_or(ContainerSlot::Root, ContainerSlot::Resolved);
                entry.thing = Some(moved.thing);
            }
        }
        if let Some(previous) = record.container {
            self.reload(ctx, store, &previous.key())?;
        }
        debug!(target: "comet::operation", thing = %child_key, container = %target.key(), "Re-parented");
        Ok(true)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn hooks<'s>(&'s self, store: &'s mut dyn ThingStore, partition: &'s Partition) -> HookContext<'s> {
        HookContext {
            store,
            partition,
            meta: self.meta,
        }
    }

    fn check_write(&self, thing: &Thing, kind: OperationKind, partition: &Partition) -> CometResult<()> {
        if self.permissions.can_write(thing, kind, partition) {
            return Ok(());
        }
        warn!(target: "comet::operation", thing = %thing.key(), kind = %kind, "Permission denied");
        Err(CometError::PermissionDenied {
            type_name: thing.type_name.clone(),
            iid: thing.iid,
            kind,
        })
    }

    fn property(&self, type_name: &str, name: &str) -> CometResult<&'a PropertyInfo> {
        let meta: &'a dyn MetaInfoProvider = self.meta;
        meta.property(type_name, name)
            .ok_or_else(|| CometError::malformed(format!("unknown property {}.{}", type_name, name)))
    }

    /// Re-read a thing known to the context and refresh its cached state
    fn reload(
        &self,
        ctx: &mut OperationContext,
        store: &dyn ThingStore,
        key: &ThingKey,
    ) -> CometResult<Option<Thing>> {
        let Some(entry) = ctx.entry(key) else {
            return Ok(None);
        };
        let partition = entry.partition.clone();
        let thing = read_one(store, &partition, key)?.map(|record| record.thing);
        if let Some(thing) = &thing {
            ctx.refresh(thing.clone());
        }
        Ok(thing)
    }
}

fn read_one(store: &dyn ThingStore, partition: &Partition, key: &ThingKey) -> CometResult<Option<ThingRecord>> {
    Ok(store
        .read(partition, &key.type_name, Some(&[key.iid]))?
        .into_iter()
        .next())
}

fn referenced_type<'p>(key: &ThingKey, property: &'p PropertyInfo) -> CometResult<&'p str> {
    property.referenced_type.as_deref().ok_or_else(|| {
        CometError::malformed(format!("{}.{} names no type", key.type_name, property.name))
    })
}

fn member_ids(kind: PropertyKind, value: &Value) -> Vec<Iid> {
    match kind {
        PropertyKind::OrderedList => value
            .ordered_items()
            .unwrap_or_default()
            .iter()
            .filter_map(|item| item.value.as_id())
            .collect(),
        _ => value.ids(),
    }
}

fn collection_entries(kind: PropertyKind, value: &Value) -> Vec<CollectionEntry> {
    match kind {
        PropertyKind::OrderedList => value
            .ordered_items()
            .unwrap_or_default()
            .iter()
            .cloned()
            .map(CollectionEntry::Ordered)
            .collect(),
        _ => value
            .members()
            .unwrap_or_default()
            .iter()
            .cloned()
            .map(CollectionEntry::Member)
            .collect(),
    }
}
