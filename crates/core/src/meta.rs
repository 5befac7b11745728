//! Type metadata
//!
//! The engine never hard-codes the data model. Everything it needs to know
//! about a type comes through [`MetaInfoProvider`]:
//! - property kinds (scalar, value array, list, ordered list)
//! - aggregation (composite containment vs. plain reference)
//! - whether a type is a top-level container
//! - which property of which parent type can hold a given child type
//!
//! [`MetaModel`] is a provider assembled with [`MetaModelBuilder`]:
//!
//! ```
//! use comet_core::meta::{MetaInfoProvider, MetaModelBuilder};
//!
//! let mut builder = MetaModelBuilder::new();
//! builder.add_type("Library").top_container().composite("Book", "Book").done()?;
//! builder.add_type("Book").mandatory("Title").done()?;
//! let model = builder.build()?;
//!
//! assert!(model.is_top_container("Library"));
//! assert_eq!(model.container_properties("Book")[0].property, "Book");
//! # Ok::<(), comet_core::CometError>(())
//! ```

use crate::error::{CometError, CometResult};
use crate::thing::Thing;
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};

/// Shape of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// Single value
    Scalar,
    /// Fixed-shape array of scalars, replaced as a whole
    ValueArray,
    /// Unordered collection
    List,
    /// Ordered collection with position keys
    OrderedList,
}

impl PropertyKind {
    /// True for list and ordered list
    pub fn is_collection(self) -> bool {
        matches!(self, PropertyKind::List | PropertyKind::OrderedList)
    }
}

/// Relationship between a thing and the things a property names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregation {
    /// Plain value or reference
    None,
    /// The property owns the named things
    Composite,
}

/// Metadata of one property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyInfo {
    /// Property name
    pub name: String,
    /// Shape
    pub kind: PropertyKind,
    /// Containment
    pub aggregation: Aggregation,
    /// Type of the things named by this property, if it names things
    pub referenced_type: Option<String>,
    /// Must be present and non-null on create
    pub mandatory: bool,
}

impl PropertyInfo {
    /// True for composite containment properties
    pub fn is_composite(&self) -> bool {
        self.aggregation == Aggregation::Composite
    }

    /// True for a scalar naming another thing
    pub fn is_scalar_reference(&self) -> bool {
        self.kind == PropertyKind::Scalar && self.referenced_type.is_some()
    }
}

/// Metadata of one concrete type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    /// Type name
    pub name: String,
    /// Root of a partition, never created through operations
    pub is_top_container: bool,
    /// Lives in the iteration partition of an engineering model
    pub iteration_scoped: bool,
    /// Property holding the content hash of an attached binary
    pub content_hash_property: Option<String>,
    properties: BTreeMap<String, PropertyInfo>,
}

impl TypeInfo {
    /// Property metadata
    pub fn property(&self, name: &str) -> Option<&PropertyInfo> {
        self.properties.get(name)
    }

    /// All properties
    pub fn properties(&self) -> impl Iterator<Item = &PropertyInfo> {
        self.properties.values()
    }

    /// True for file-bearing types, which are immutable once created
    pub fn stores_file_content(&self) -> bool {
        self.content_hash_property.is_some()
    }
}

/// Composite property of a parent type able to hold a child type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerProperty {
    /// Type of the container
    pub parent_type: String,
    /// Composite property on the container
    pub property: String,
    /// List or ordered list
    pub kind: PropertyKind,
}

/// Read-only source of type metadata
pub trait MetaInfoProvider: Send + Sync {
    /// Metadata of a concrete type
    fn type_info(&self, type_name: &str) -> Option<&TypeInfo>;

    /// Every composite property, of any type, able to hold `child_type`
    fn container_properties(&self, child_type: &str) -> Vec<ContainerProperty>;

    /// Metadata of a type, or `MalformedOperation` for an unknown type
    fn require_type(&self, type_name: &str) -> CometResult<&TypeInfo> {
        self.type_info(type_name)
            .ok_or_else(|| CometError::malformed(format!("unknown type '{}'", type_name)))
    }

    /// Metadata of a property
    fn property(&self, type_name: &str, property: &str) -> Option<&PropertyInfo> {
        self.type_info(type_name)?.property(property)
    }

    /// Shape of a property
    fn property_kind(&self, type_name: &str, property: &str) -> Option<PropertyKind> {
        self.property(type_name, property).map(|info| info.kind)
    }

    /// True if the type roots a partition
    fn is_top_container(&self, type_name: &str) -> bool {
        self.type_info(type_name)
            .map_or(false, |info| info.is_top_container)
    }

    /// True if the type lives in the iteration partition
    fn is_iteration_scoped(&self, type_name: &str) -> bool {
        self.type_info(type_name)
            .map_or(false, |info| info.iteration_scoped)
    }

    /// Composite property of `parent_type` able to hold `child_type`
    fn container_property(&self, child_type: &str, parent_type: &str) -> Option<ContainerProperty> {
        self.container_properties(child_type)
            .into_iter()
            .find(|candidate| candidate.parent_type == parent_type)
    }
}

/// Check that a value fits the shape of its property
pub fn check_value_shape(type_name: &str, info: &PropertyInfo, value: &Value) -> CometResult<()> {
    let fits = match info.kind {
        PropertyKind::Scalar if info.referenced_type.is_some() => {
            matches!(value, Value::Null | Value::Id(_))
        }
        PropertyKind::Scalar => !value.is_collection(),
        PropertyKind::ValueArray => value.is_null() || value.members().is_some(),
        PropertyKind::List if info.referenced_type.is_some() => value
            .members()
            .map_or(false, |members| members.iter().all(|m| m.as_id().is_some())),
        PropertyKind::List => value.members().is_some(),
        PropertyKind::OrderedList if info.referenced_type.is_some() => value
            .ordered_items()
            .map_or(false, |items| items.iter().all(|i| i.value.as_id().is_some())),
        PropertyKind::OrderedList => value.ordered_items().is_some(),
    };
    if fits {
        Ok(())
    } else {
        Err(CometError::malformed(format!(
            "value of {}.{} does not match a {:?} property",
            type_name, info.name, info.kind
        )))
    }
}

/// Validate a thing about to be created against its type metadata
///
/// `property_hook` runs once per present property after the shape check and
/// can reject a property the metadata alone would accept.
pub fn validate_thing<F>(meta: &dyn MetaInfoProvider, thing: &Thing, mut property_hook: F) -> CometResult<()>
where
    F: FnMut(&str) -> CometResult<()>,
{
    let type_info = meta.require_type(&thing.type_name)?;
    for (name, value) in thing.properties() {
        let info = type_info.property(name).ok_or_else(|| {
            CometError::malformed(format!("unknown property {}.{}", thing.type_name, name))
        })?;
        check_value_shape(&thing.type_name, info, value)?;
        property_hook(name)?;
    }
    for info in type_info.properties().filter(|info| info.mandatory) {
        if thing.get(&info.name).map_or(true, Value::is_null) {
            return Err(CometError::malformed(format!(
                "mandatory property {}.{} is missing",
                thing.type_name, info.name
            )));
        }
    }
    Ok(())
}

/// In-memory metadata model
#[derive(Debug, Clone, Default)]
pub struct MetaModel {
    types: HashMap<String, TypeInfo>,
    containers: HashMap<String, Vec<ContainerProperty>>,
}

impl MetaModel {
    /// Start building a model
    pub fn builder() -> MetaModelBuilder {
        MetaModelBuilder::new()
    }

    /// Number of types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True if the model has no types
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl MetaInfoProvider for MetaModel {
    fn type_info(&self, type_name: &str) -> Option<&TypeInfo> {
        self.types.get(type_name)
    }

    fn container_properties(&self, child_type: &str) -> Vec<ContainerProperty> {
        self.containers.get(child_type).cloned().unwrap_or_default()
    }
}

/// Builder for [`MetaModel`]
#[derive(Debug, Default)]
pub struct MetaModelBuilder {
    types: HashMap<String, TypeInfo>,
}

impl MetaModelBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a type definition
    pub fn add_type(&mut self, name: impl Into<String>) -> TypeBuilder<'_> {
        TypeBuilder {
            builder: self,
            info: TypeInfo {
                name: name.into(),
                is_top_container: false,
                iteration_scoped: false,
                content_hash_property: None,
                properties: BTreeMap::new(),
            },
        }
    }

    /// Check cross-type references and index containment
    pub fn build(self) -> CometResult<MetaModel> {
        let mut containers: HashMap<String, Vec<ContainerProperty>> = HashMap::new();
        for type_info in self.types.values() {
            for property in type_info.properties() {
                let Some(target) = &property.referenced_type else {
                    continue;
                };
                if !self.types.contains_key(target) {
                    return Err(CometError::configuration(format!(
                        "{}.{} names unknown type '{}'",
                        type_info.name, property.name, target
                    )));
                }
                if property.is_composite() {
                    containers
                        .entry(target.clone())
                        .or_default()
                        .push(ContainerProperty {
                            parent_type: type_info.name.clone(),
                            property: property.name.clone(),
                            kind: property.kind,
                        });
                }
            }
        }
        for candidates in containers.values_mut() {
            candidates.sort_by(|a, b| a.parent_type.cmp(&b.parent_type));
        }
        Ok(MetaModel {
            types: self.types,
            containers,
        })
    }
}

/// Builder for one type definition
pub struct TypeBuilder<'a> {
    builder: &'a mut MetaModelBuilder,
    info: TypeInfo,
}

impl<'a> TypeBuilder<'a> {
    fn property(
        mut self,
        name: impl Into<String>,
        kind: PropertyKind,
        aggregation: Aggregation,
        referenced_type: Option<String>,
        mandatory: bool,
    ) -> Self {
        let name = name.into();
        self.info.properties.insert(
            name.clone(),
            PropertyInfo {
                name,
                kind,
                aggregation,
                referenced_type,
                mandatory,
            },
        );
        self
    }

    /// Mark as the root of a partition
    pub fn top_container(mut self) -> Self {
        self.info.is_top_container = true;
        self
    }

    /// Mark as living in the iteration partition
    pub fn iteration_scoped(mut self) -> Self {
        self.info.iteration_scoped = true;
        self
    }

    /// Mark as file-bearing; `property` is a mandatory scalar holding the content hash
    pub fn file_content(mut self, property: impl Into<String>) -> Self {
        let property = property.into();
        self.info.content_hash_property = Some(property.clone());
        self.property(property, PropertyKind::Scalar, Aggregation::None, None, true)
    }

    /// Optional scalar
    pub fn scalar(self, name: impl Into<String>) -> Self {
        self.property(name, PropertyKind::Scalar, Aggregation::None, None, false)
    }

    /// Mandatory scalar
    pub fn mandatory(self, name: impl Into<String>) -> Self {
        self.property(name, PropertyKind::Scalar, Aggregation::None, None, true)
    }

    /// Optional scalar reference to a thing of `target` type
    pub fn reference(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        let target = Some(target.into());
        self.property(name, PropertyKind::Scalar, Aggregation::None, target, false)
    }

    /// Mandatory scalar reference to a thing of `target` type
    pub fn mandatory_reference(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        let target = Some(target.into());
        self.property(name, PropertyKind::Scalar, Aggregation::None, target, true)
    }

    /// Value array
    pub fn value_array(self, name: impl Into<String>) -> Self {
        self.property(name, PropertyKind::ValueArray, Aggregation::None, None, false)
    }

    /// Unordered references to things of `target` type
    pub fn list(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        let target = Some(target.into());
        self.property(name, PropertyKind::List, Aggregation::None, target, false)
    }

    /// Ordered plain values
    pub fn ordered_values(self, name: impl Into<String>) -> Self {
        self.property(name, PropertyKind::OrderedList, Aggregation::None, None, false)
    }

    /// Unordered composite children of `child` type
    pub fn composite(self, name: impl Into<String>, child: impl Into<String>) -> Self {
        let child = Some(child.into());
        self.property(name, PropertyKind::List, Aggregation::Composite, child, false)
    }

    /// Ordered composite children of `child` type
    pub fn ordered_composite(self, name: impl Into<String>, child: impl Into<String>) -> Self {
        let child = Some(child.into());
        self.property(name, PropertyKind::OrderedList, Aggregation::Composite, child, false)
    }

    /// Finish building this type
    pub fn done(self) -> CometResult<()> {
        if self.builder.types.contains_key(&self.info.name) {
            return Err(CometError::configuration(format!(
                "duplicate type name '{}'",
                self.info.name
            )));
        }
        self.builder.types.insert(self.info.name.clone(), self.info);
        Ok(())
    }
}
