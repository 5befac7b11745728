//! Core types and traits for Comet
//!
//! This crate defines the foundational types used throughout the system:
//! - Thing: versioned entity with a property bag
//! - ClasslessDto: client-side property bag carrying TypeName and Iid
//! - Operation: one batched write request (delete, create, update)
//! - ThingKey, ContainerInfo, Partition: identity and addressing
//! - Value, OrderedItem: property values and ordered collection algebra
//! - Meta: type metadata oracle and the in-memory MetaModel
//! - Traits: persistence, revision, permission and file store oracles
//! - CometError: error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod meta;
pub mod operation;
pub mod thing;
pub mod traits;
pub mod types;
pub mod value;

pub use error::{CometError, CometResult};
pub use meta::{
    Aggregation, ContainerProperty, MetaInfoProvider, MetaModel, MetaModelBuilder, PropertyInfo,
    PropertyKind, TypeInfo,
};
pub use operation::{Operation, OperationKind};
pub use thing::{ClasslessDto, Thing, IID_KEY, REVISION_NUMBER_KEY, TYPE_NAME_KEY};
pub use traits::{
    CollectionEntry, FileBinaryStore, PermissionOracle, RevisionRecord, RevisionStore,
    RevisionView, ThingRecord, ThingStore,
};
pub use types::{ContainerInfo, Iid, Partition, ThingKey};
pub use value::{OrderedItem, Value};
