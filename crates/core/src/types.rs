//! Identity and addressing types
//!
//! - [`Iid`]: immutable identity of a thing
//! - [`ThingKey`]: (type, iid) pair used to deduplicate references in a batch
//! - [`ContainerInfo`]: parent of a thing plus its position in ordered containment
//! - [`Partition`]: named storage scope a request targets

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a thing
pub type Iid = Uuid;

/// Name of the site directory partition
pub const SITE_DIRECTORY_PARTITION: &str = "SiteDirectory";

const ENGINEERING_MODEL_PREFIX: &str = "EngineeringModel_";
const ITERATION_PREFIX: &str = "Iteration_";

/// Resolution identity of a thing within one batch
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThingKey {
    /// Concrete type name
    pub type_name: String,
    /// Identity
    pub iid: Iid,
}

impl ThingKey {
    /// Create a key
    pub fn new(type_name: impl Into<String>, iid: Iid) -> Self {
        ThingKey {
            type_name: type_name.into(),
            iid,
        }
    }
}

impl fmt::Display for ThingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.type_name, self.iid)
    }
}

/// Parent of a thing
///
/// `sequence` is the position key when the parent holds its children in an
/// ordered composite collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Type of the container
    pub type_name: String,
    /// Identity of the container
    pub iid: Iid,
    /// Position key within an ordered containment collection
    pub sequence: Option<i64>,
}

impl ContainerInfo {
    /// Container for unordered containment
    pub fn new(type_name: impl Into<String>, iid: Iid) -> Self {
        ContainerInfo {
            type_name: type_name.into(),
            iid,
            sequence: None,
        }
    }

    /// Container for ordered containment at `sequence`
    pub fn ordered(type_name: impl Into<String>, iid: Iid, sequence: i64) -> Self {
        ContainerInfo {
            type_name: type_name.into(),
            iid,
            sequence: Some(sequence),
        }
    }

    /// Key of the container thing
    pub fn key(&self) -> ThingKey {
        ThingKey::new(self.type_name.clone(), self.iid)
    }
}

/// Named storage scope
///
/// `SiteDirectory` is a scope of its own. An `EngineeringModel_<id>` partition
/// owns a derived `Iteration_<id>` partition; both share one revision counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Partition(String);

impl Partition {
    /// Partition with an explicit name
    pub fn new(name: impl Into<String>) -> Self {
        Partition(name.into())
    }

    /// The site directory partition
    pub fn site_directory() -> Self {
        Partition(SITE_DIRECTORY_PARTITION.to_string())
    }

    /// Partition of the engineering model with the given identity
    pub fn engineering_model(model_iid: Iid) -> Self {
        Partition(format!("{}{}", ENGINEERING_MODEL_PREFIX, model_iid.simple()))
    }

    /// Partition name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for an engineering model partition
    pub fn is_engineering_model(&self) -> bool {
        self.0.starts_with(ENGINEERING_MODEL_PREFIX)
    }

    /// True for an iteration partition
    pub fn is_iteration(&self) -> bool {
        self.0.starts_with(ITERATION_PREFIX)
    }

    /// Partition holding iteration-scoped things for this request partition
    ///
    /// Returns `self` unchanged for partitions without an iteration counterpart.
    pub fn iteration(&self) -> Partition {
        match self.0.strip_prefix(ENGINEERING_MODEL_PREFIX) {
            Some(suffix) => Partition(format!("{}{}", ITERATION_PREFIX, suffix)),
            None => self.clone(),
        }
    }

    /// Partition a thing lives in given whether its type is iteration-scoped
    ///
    /// Works from either partition of an engineering model: non-iteration
    /// types always land in the model partition itself.
    pub fn for_type(&self, iteration_scoped: bool) -> Partition {
        if iteration_scoped {
            self.iteration()
        } else {
            self.revision_scope()
        }
    }

    /// Partition owning the revision counter for this partition
    pub fn revision_scope(&self) -> Partition {
        match self.0.strip_prefix(ITERATION_PREFIX) {
            Some(suffix) => Partition(format!("{}{}", ENGINEERING_MODEL_PREFIX, suffix)),
            None => self.clone(),
        }
    }

    /// Every partition sharing this partition's revision scope
    pub fn scope_partitions(&self) -> Vec<Partition> {
        let scope = self.revision_scope();
        let iteration = scope.iteration();
        if iteration == scope {
            vec![scope]
        } else {
            vec![scope, iteration]
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
