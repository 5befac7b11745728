//! Things and classless property bags
//!
//! A [`Thing`] is a versioned entity: identity, concrete type, the last
//! revision that touched it and a bag of named property values.
//!
//! A [`ClasslessDto`] is what clients send: a flat map of property names to
//! values where the type and identity are themselves properties
//! (`TypeName`, `Iid`). The engine converts between the two at the edges.

use crate::error::{CometError, CometResult};
use crate::types::{Iid, ThingKey};
use crate::value::{OrderedItem, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Property key carrying the concrete type name
pub const TYPE_NAME_KEY: &str = "TypeName";
/// Property key carrying the identity
pub const IID_KEY: &str = "Iid";
/// Property key carrying the revision number
pub const REVISION_NUMBER_KEY: &str = "RevisionNumber";

/// True for the keys every bag carries and that are never applied as updates
pub fn is_base_property(name: &str) -> bool {
    matches!(name, TYPE_NAME_KEY | IID_KEY | REVISION_NUMBER_KEY)
}

/// A versioned entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thing {
    /// Identity
    pub iid: Iid,
    /// Concrete type name, fixed at creation
    pub type_name: String,
    /// Last revision that touched this thing
    pub revision_number: i64,
    properties: BTreeMap<String, Value>,
}

impl Thing {
    /// An unpersisted thing without properties
    pub fn new(type_name: impl Into<String>, iid: Iid) -> Self {
        Thing {
            iid,
            type_name: type_name.into(),
            revision_number: 0,
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property assignment
    pub fn with(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(property.into(), value.into());
        self
    }

    /// Resolution key
    pub fn key(&self) -> ThingKey {
        ThingKey::new(self.type_name.clone(), self.iid)
    }

    /// Property value
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.properties.get(property)
    }

    /// Mutable property value
    pub fn get_mut(&mut self, property: &str) -> Option<&mut Value> {
        self.properties.get_mut(property)
    }

    /// Set a property, returning true if the stored value changed
    pub fn set(&mut self, property: impl Into<String>, value: Value) -> bool {
        let property = property.into();
        if self.properties.get(&property) == Some(&value) {
            return false;
        }
        self.properties.insert(property, value);
        true
    }

    /// Remove a property
    pub fn remove(&mut self, property: &str) -> Option<Value> {
        self.properties.remove(property)
    }

    /// All properties
    pub fn properties(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.properties.iter()
    }

    /// Identities held by an unordered collection property
    pub fn ids(&self, property: &str) -> Vec<Iid> {
        self.get(property).map(Value::ids).unwrap_or_default()
    }

    /// Items of an ordered collection property
    pub fn ordered(&self, property: &str) -> Vec<OrderedItem> {
        self.get(property)
            .and_then(Value::ordered_items)
            .map(<[OrderedItem]>::to_vec)
            .unwrap_or_default()
    }

    /// Build an unpersisted thing from a bag, dropping the base keys
    pub fn from_dto(dto: &ClasslessDto) -> CometResult<Thing> {
        let key = dto.key()?;
        let mut thing = Thing::new(key.type_name, key.iid);
        for (name, value) in dto.properties() {
            thing.properties.insert(name.clone(), value.clone());
        }
        Ok(thing)
    }

    /// Bag representation including the base keys
    pub fn to_dto(&self) -> ClasslessDto {
        let mut dto = ClasslessDto::new(self.type_name.clone(), self.iid);
        dto.insert(REVISION_NUMBER_KEY, Value::Integer(self.revision_number));
        for (name, value) in &self.properties {
            dto.insert(name.clone(), value.clone());
        }
        dto
    }
}

/// Schema-agnostic property bag sent by clients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClasslessDto(BTreeMap<String, Value>);

impl ClasslessDto {
    /// Bag carrying only type and identity
    pub fn new(type_name: impl Into<String>, iid: Iid) -> Self {
        let mut map = BTreeMap::new();
        map.insert(TYPE_NAME_KEY.to_string(), Value::Text(type_name.into()));
        map.insert(IID_KEY.to_string(), Value::Id(iid));
        ClasslessDto(map)
    }

    /// Builder-style property assignment
    pub fn with(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(property.into(), value.into());
        self
    }

    /// Set a property
    pub fn insert(&mut self, property: impl Into<String>, value: Value) {
        self.0.insert(property.into(), value);
    }

    /// Raw value of any key, base keys included
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.0.get(property)
    }

    /// True if the bag carries `property`
    pub fn contains(&self, property: &str) -> bool {
        self.0.contains_key(property)
    }

    /// Declared type name
    pub fn type_name(&self) -> Option<&str> {
        self.0.get(TYPE_NAME_KEY).and_then(Value::as_text)
    }

    /// Declared identity
    pub fn iid(&self) -> Option<Iid> {
        match self.0.get(IID_KEY) {
            Some(Value::Id(iid)) => Some(*iid),
            _ => None,
        }
    }

    /// Resolution key, or `MalformedOperation` when type or identity is missing
    pub fn key(&self) -> CometResult<ThingKey> {
        let type_name = self
            .type_name()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| CometError::malformed("item without TypeName"))?;
        let iid = self
            .iid()
            .ok_or_else(|| CometError::malformed(format!("{} item without Iid", type_name)))?;
        Ok(ThingKey::new(type_name, iid))
    }

    /// Properties other than the base keys
    pub fn properties(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter().filter(|(name, _)| !is_base_property(name))
    }

    /// True if the bag carries nothing beyond the base keys
    pub fn is_identity_only(&self) -> bool {
        self.properties().next().is_none()
    }
}
