//! Containment resolution
//!
//! Completes the [`OperationContext`] from storage after validation:
//! - one `read` per distinct (type, partition) among the entries still
//!   missing their state
//! - things created by the batch are never fetched
//! - a container declared by the batch is never replaced by the stored one
//! - containers discovered from storage are loaded in a follow-up wave, so
//!   hooks always receive the container instance
//!
//! No id is read twice in one request. A required entry (container or
//! scalar reference) that is still missing afterwards fails the batch with
//! `ContainerNotFound`.

use crate::context::{ContainerSlot, EntryRole, OperationContext};
use comet_core::{
    CometError, CometResult, ContainerInfo, Iid, MetaInfoProvider, Partition, ThingKey,
    ThingStore,
};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

/// Counters of one resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// Storage reads issued
    pub queries: usize,
    /// Waves of reads
    pub waves: usize,
    /// Entries with a known state afterwards
    pub resolved: usize,
    /// Entries without a state afterwards
    pub unresolved: usize,
}

pub(crate) struct ContainmentResolver<'a> {
    pub(crate) meta: &'a dyn MetaInfoProvider,
    pub(crate) verify_declared_containers: bool,
}

impl<'a> ContainmentResolver<'a> {
    pub(crate) fn resolve(
        &self,
        ctx: &mut OperationContext,
        store: &dyn ThingStore,
    ) -> CometResult<ResolveStats> {
        if self.verify_declared_containers {
            self.verify_declared(ctx, store)?;
        }

        let mut stats = ResolveStats::default();
        loop {
            let mut groups: BTreeMap<(String, Partition), Vec<Iid>> = BTreeMap::new();
            for entry in ctx.entries().filter(|entry| entry.needs_fetch()) {
                groups
                    .entry((entry.key.type_name.clone(), entry.partition.clone()))
                    .or_default()
                    .push(entry.key.iid);
            }
            if groups.is_empty() {
                break;
            }
            stats.waves += 1;

            let mut discovered: Vec<ContainerInfo> = Vec::new();
            for ((type_name, partition), ids) in groups {
                let records = store.read(&partition, &type_name, Some(&ids))?;
                stats.queries += 1;
                trace!(
                    target: "comet::resolve",
                    type_name = %type_name,
                    partition = %partition,
                    requested = ids.len(),
                    found = records.len(),
                    "Read"
                );
                let mut found: HashMap<Iid, _> = records
                    .into_iter()
                    .map(|record| (record.thing.iid, record))
                    .collect();

                for iid in ids {
                    let Some(entry) = ctx.entry_mut(&ThingKey::new(type_name.clone(), iid)) else {
                        continue;
                    };
                    entry.fetched = true;
                    let Some(record) = found.remove(&iid) else {
                        continue;
                    };
                    entry.thing = Some(record.thing);
                    if entry.container == ContainerSlot::Unresolved {
                        entry.container = match record.container {
                            Some(container) => {
                                discovered.push(container.clone());
                                ContainerSlot::Resolved(container)
                            }
                            None => ContainerSlot::Root,
                        };
                    }
                }
            }

            for container in discovered {
                let partition = ctx.partition_for(self.meta, &container.type_name);
                let top_container = self.meta.is_top_container(&container.type_name);
                ctx.register_required(
                    container.key(),
                    partition,
                    EntryRole::Container,
                    top_container,
                );
            }
        }

        for entry in ctx.entries() {
            if entry.thing.is_some() {
                stats.resolved += 1;
            } else {
                stats.unresolved += 1;
            }
        }
        debug!(
            target: "comet::resolve",
            queries = stats.queries,
            waves = stats.waves,
            resolved = stats.resolved,
            unresolved = stats.unresolved,
            "Resolved batch"
        );

        if let Some(missing) = ctx
            .entries()
            .find(|entry| entry.required && entry.thing.is_none())
        {
            return Err(CometError::not_found(missing.key.type_name.clone(), missing.key.iid));
        }
        Ok(stats)
    }

    /// Check every declared container the batch does not create against its stored type
    fn verify_declared(&self, ctx: &OperationContext, store: &dyn ThingStore) -> CometResult<()> {
        let declared: Vec<ContainerInfo> = ctx
            .entries()
            .filter(|entry| entry.declared)
            .filter_map(|entry| match &entry.container {
                ContainerSlot::Resolved(info) if !ctx.is_created(info.iid) => Some(info.clone()),
                _ => None,
            })
            .collect();

        for info in declared {
            let partition = ctx.partition_for(self.meta, &info.type_name);
            match store.resolve_type_name(&partition, info.iid)? {
                Some(stored) if stored != info.type_name => {
                    return Err(CometError::malformed(format!(
                        "container '{}' is a {}, not a {}",
                        info.iid, stored, info.type_name
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}
