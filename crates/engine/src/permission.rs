//! Permission oracles
//!
//! - [`AllowAll`]: every read and write is permitted
//! - [`TypeAccessPolicy`]: per-type denial of writes (by kind) and reads

use comet_core::{OperationKind, Partition, PermissionOracle, Thing};
use std::collections::{HashMap, HashSet};

/// Oracle that permits everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionOracle for AllowAll {
    fn can_read(&self, _thing: &Thing, _partition: &Partition) -> bool {
        true
    }

    fn can_write(&self, _thing: &Thing, _kind: OperationKind, _partition: &Partition) -> bool {
        true
    }
}

/// Type-based access policy
///
/// Everything not explicitly denied is allowed.
#[derive(Debug, Clone, Default)]
pub struct TypeAccessPolicy {
    denied_writes: HashMap<String, HashSet<OperationKind>>,
    hidden: HashSet<String>,
}

impl TypeAccessPolicy {
    /// Policy that denies nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny one kind of write on a type
    pub fn deny(mut self, type_name: impl Into<String>, kind: OperationKind) -> Self {
        self.denied_writes
            .entry(type_name.into())
            .or_default()
            .insert(kind);
        self
    }

    /// Deny every write on a type
    pub fn read_only(self, type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        self.deny(type_name.clone(), OperationKind::Create)
            .deny(type_name.clone(), OperationKind::Update)
            .deny(type_name, OperationKind::Delete)
    }

    /// Hide a type from reads
    pub fn hide(mut self, type_name: impl Into<String>) -> Self {
        self.hidden.insert(type_name.into());
        self
    }
}

impl PermissionOracle for TypeAccessPolicy {
    fn can_read(&self, thing: &Thing, _partition: &Partition) -> bool {
        !self.hidden.contains(&thing.type_name)
    }

    fn can_write(&self, thing: &Thing, kind: OperationKind, _partition: &Partition) -> bool {
        self.denied_writes
            .get(&thing.type_name)
            .map_or(true, |kinds| !kinds.contains(&kind))
    }
}
