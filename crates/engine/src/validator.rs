//! Batch validation
//!
//! Runs before anything touches storage and rejects a batch that is
//! structurally wrong:
//! - every item carries `TypeName` and `Iid` of a known type
//! - delete items carry collection unlinks only
//! - file-bearing types are never updated
//! - top containers are never created
//! - created things pass their type metadata and per-property hooks
//! - every created thing is named by a container elsewhere in the batch
//! - file revisions name content that is uploaded or already stored, and
//!   every upload is named by a file revision
//!
//! While walking the batch the validator fills the [`OperationContext`]: one
//! entry per distinct key, containers declared by the payload, and required
//! entries for containers and scalar references.

use crate::context::{EntryRole, OperationContext};
use crate::files::UploadedFiles;
use crate::side_effects::SideEffectRegistry;
use comet_core::meta::{check_value_shape, validate_thing};
use comet_core::{
    ClasslessDto, CometError, CometResult, ContainerInfo, FileBinaryStore, MetaInfoProvider,
    Operation, PropertyInfo, PropertyKind, Thing, ThingKey, TypeInfo, Value,
};
use std::collections::HashSet;
use tracing::debug;

pub(crate) struct BatchValidator<'a> {
    pub(crate) meta: &'a dyn MetaInfoProvider,
    pub(crate) side_effects: &'a SideEffectRegistry,
    pub(crate) files: Option<&'a dyn FileBinaryStore>,
}

impl<'a> BatchValidator<'a> {
    pub(crate) fn validate(
        &self,
        operation: &Operation,
        ctx: &mut OperationContext,
        uploads: Option<&UploadedFiles>,
    ) -> CometResult<()> {
        let mut deleted = HashSet::new();
        for item in &operation.delete {
            deleted.insert(self.validate_delete(item, ctx)?);
        }
        for item in &operation.update {
            self.validate_update(item, ctx)?;
        }
        let created = self.validate_creates(&operation.create, &deleted, ctx, uploads)?;

        for thing in &created {
            self.register_container(thing, operation, ctx)?;
        }
        for thing in &created {
            self.register_references(&thing.type_name, thing.properties(), ctx);
        }
        for item in &operation.update {
            let key = item.key()?;
            self.register_references(&key.type_name, item.properties(), ctx);
        }

        debug!(
            target: "comet::operation",
            deletes = operation.delete.len(),
            creates = operation.create.len(),
            updates = operation.update.len(),
            entries = ctx.len(),
            "Batch validated"
        );
        Ok(())
    }

    fn validate_delete(&self, item: &ClasslessDto, ctx: &mut OperationContext) -> CometResult<ThingKey> {
        let key = item.key()?;
        let type_info = self.meta.require_type(&key.type_name)?;
        for (name, value) in item.properties() {
            let property = known_property(type_info, name)?;
            if !property.kind.is_collection() {
                return Err(CometError::malformed(format!(
                    "delete of {} cannot change {}.{}",
                    key, key.type_name, name
                )));
            }
            check_value_shape(&key.type_name, property, value)?;
        }
        let partition = ctx.partition_for(self.meta, &key.type_name);
        ctx.register_target(key.clone(), partition, type_info.is_top_container);
        Ok(key)
    }

    fn validate_update(&self, item: &ClasslessDto, ctx: &mut OperationContext) -> CometResult<()> {
        let key = item.key()?;
        let type_info = self.meta.require_type(&key.type_name)?;
        if type_info.stores_file_content() {
            return Err(CometError::malformed(format!(
                "{} is immutable once created",
                key
            )));
        }
        for (name, value) in item.properties() {
            check_value_shape(&key.type_name, known_property(type_info, name)?, value)?;
        }
        let partition = ctx.partition_for(self.meta, &key.type_name);
        ctx.register_target(key, partition, type_info.is_top_container);
        Ok(())
    }

    fn validate_creates(
        &self,
        items: &[ClasslessDto],
        deleted: &HashSet<ThingKey>,
        ctx: &mut OperationContext,
        uploads: Option<&UploadedFiles>,
    ) -> CometResult<Vec<Thing>> {
        let mut seen = HashSet::new();
        let mut referenced_hashes = HashSet::new();
        let mut created = Vec::with_capacity(items.len());

        for item in items {
            let key = item.key()?;
            let type_info = self.meta.require_type(&key.type_name)?;
            if type_info.is_top_container {
                return Err(CometError::malformed(format!(
                    "{} is a top container and cannot be created",
                    key.type_name
                )));
            }
            if deleted.contains(&key) {
                return Err(CometError::malformed(format!(
                    "{} is both deleted and created",
                    key
                )));
            }
            if !seen.insert(key.clone()) {
                return Err(CometError::malformed(format!("{} is created twice", key)));
            }

            if let Some(property) = &type_info.content_hash_property {
                let hash = self.check_file_content(&key, item.get(property), uploads)?;
                referenced_hashes.insert(hash);
            }

            let thing = Thing::from_dto(item)?;
            validate_thing(self.meta, &thing, |name| {
                self.side_effects.validate_property(&thing, name)
            })?;
            let partition = ctx.partition_for(self.meta, &key.type_name);
            ctx.register_created(thing.clone(), partition);
            created.push(thing);
        }

        if let Some(uploads) = uploads {
            if let Some(orphan) = uploads.hashes().find(|hash| !referenced_hashes.contains(*hash)) {
                return Err(CometError::malformed(format!(
                    "uploaded file '{}' is not referenced by any new file revision",
                    orphan
                )));
            }
        }
        Ok(created)
    }

    /// Content hash of a file-bearing item, if its content is available
    fn check_file_content(
        &self,
        key: &ThingKey,
        value: Option<&Value>,
        uploads: Option<&UploadedFiles>,
    ) -> CometResult<String> {
        let hash = value.and_then(Value::as_text).unwrap_or_default();
        let missing = || CometError::MissingFileContent {
            type_name: key.type_name.clone(),
            iid: key.iid,
            content_hash: hash.to_string(),
        };
        if hash.is_empty() {
            return Err(missing());
        }
        let uploaded = uploads.map_or(false, |uploads| uploads.contains(hash));
        let persisted = match (uploaded, self.files) {
            (false, Some(files)) => files.is_file_persisted(hash)?,
            _ => false,
        };
        if uploaded || persisted {
            Ok(hash.to_string())
        } else {
            Err(missing())
        }
    }

    fn register_container(
        &self,
        thing: &Thing,
        operation: &Operation,
        ctx: &mut OperationContext,
    ) -> CometResult<()> {
        let info = self
            .find_container(thing, operation)?
            .ok_or_else(|| CometError::MissingContainerRegistration {
                type_name: thing.type_name.clone(),
                iid: thing.iid,
            })?;
        let partition = ctx.partition_for(self.meta, &info.type_name);
        let top_container = self.meta.is_top_container(&info.type_name);
        ctx.declare_container(&thing.key(), info.clone());
        ctx.register_required(info.key(), partition, EntryRole::Container, top_container);
        Ok(())
    }

    /// Container naming `thing` in a composite collection, update items first
    fn find_container(&self, thing: &Thing, operation: &Operation) -> CometResult<Option<ContainerInfo>> {
        for item in operation.update.iter().chain(operation.create.iter()) {
            let key = item.key()?;
            if key.iid == thing.iid {
                continue;
            }
            let Some(slot) = self.meta.container_property(&thing.type_name, &key.type_name) else {
                continue;
            };
            let Some(value) = item.get(&slot.property) else {
                continue;
            };
            let found = match slot.kind {
                PropertyKind::OrderedList => value
                    .ordered_items()
                    .and_then(|items| items.iter().find(|i| i.value.as_id() == Some(thing.iid)))
                    .map(|i| ContainerInfo::ordered(key.type_name.clone(), key.iid, i.key)),
                _ => value
                    .ids()
                    .contains(&thing.iid)
                    .then(|| ContainerInfo::new(key.type_name.clone(), key.iid)),
            };
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    fn register_references<'v>(
        &self,
        type_name: &str,
        properties: impl Iterator<Item = (&'v String, &'v Value)>,
        ctx: &mut OperationContext,
    ) {
        for (name, value) in properties {
            let Some(property) = self.meta.property(type_name, name) else {
                continue;
            };
            let (true, Some(target_type), Some(target)) = (
                property.is_scalar_reference(),
                property.referenced_type.as_deref(),
                value.as_id(),
            ) else {
                continue;
            };
            if target.is_nil() {
                continue;
            }
            let partition = ctx.partition_for(self.meta, target_type);
            let top_container = self.meta.is_top_container(target_type);
            ctx.register_required(
                ThingKey::new(target_type, target),
                partition,
                EntryRole::Reference,
                top_container,
            );
        }
    }
}

fn known_property<'t>(type_info: &'t TypeInfo, name: &str) -> CometResult<&'t PropertyInfo> {
    type_info.property(name).ok_or_else(|| {
        CometError::malformed(format!("unknown property {}.{}", type_info.name, name))
    })
}
