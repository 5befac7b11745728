//! Batched write requests
//!
//! An [`Operation`] bundles the delete, create and update intents of one
//! client request. Sections are applied in that order regardless of how the
//! payload lists them.

use crate::error::CometResult;
use crate::thing::ClasslessDto;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of write, as checked by the permission oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// New thing
    Create,
    /// Change of an existing thing
    Update,
    /// Removal of a thing or of collection members
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Create => "Create",
            OperationKind::Update => "Update",
            OperationKind::Delete => "Delete",
        };
        f.write_str(name)
    }
}

/// One client write request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Full deletes and collection unlinks
    #[serde(rename = "_delete", default)]
    pub delete: Vec<ClasslessDto>,
    /// New things
    #[serde(rename = "_create", default)]
    pub create: Vec<ClasslessDto>,
    /// Property changes and collection links
    #[serde(rename = "_update", default)]
    pub update: Vec<ClasslessDto>,
}

impl Operation {
    /// Empty operation
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an operation from its JSON form
    pub fn from_json(json: &str) -> CometResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Add a delete item
    pub fn delete(mut self, item: ClasslessDto) -> Self {
        self.delete.push(item);
        self
    }

    /// Add a create item
    pub fn create(mut self, item: ClasslessDto) -> Self {
        self.create.push(item);
        self
    }

    /// Add an update item
    pub fn update(mut self, item: ClasslessDto) -> Self {
        self.update.push(item);
        self
    }

    /// True if no section has items
    pub fn is_empty(&self) -> bool {
        self.delete.is_empty() && self.create.is_empty() && self.update.is_empty()
    }
}
