//! Oracle traits the engine depends on
//!
//! The engine owns no storage, no permission rules and no binary store. It
//! talks to them through the traits in this module so that a relational
//! backend, the in-memory reference store and test doubles are
//! interchangeable.

use crate::error::CometResult;
use crate::operation::OperationKind;
use crate::thing::Thing;
use crate::types::{ContainerInfo, Iid, Partition, ThingKey};
use crate::value::{OrderedItem, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted thing together with its container
#[derive(Debug, Clone, PartialEq)]
pub struct ThingRecord {
    /// Current state
    pub thing: Thing,
    /// Container, `None` for top containers
    pub container: Option<ContainerInfo>,
}

/// Member of a collection property
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionEntry {
    /// Member of an unordered list
    Member(Value),
    /// Item of an ordered list
    Ordered(OrderedItem),
}

/// Transaction-scoped persistence
///
/// Every mutation stamps the touched things with the transaction's revision,
/// which must be set through [`RevisionStore::set_transaction_revision`]
/// before the first mutation.
///
/// Composite collections are maintained through containment only: the
/// composite properties of a thing passed to `create` or `update` are ignored
/// and rebuilt from the children that name it as their container.
pub trait ThingStore {
    /// Read things of `type_name` in `partition`, all of them when `ids` is `None`
    ///
    /// Unknown ids are silently absent from the result.
    fn read(
        &self,
        partition: &Partition,
        type_name: &str,
        ids: Option<&[Iid]>,
    ) -> CometResult<Vec<ThingRecord>>;

    /// Concrete type of the thing with identity `iid` in `partition`
    fn resolve_type_name(&self, partition: &Partition, iid: Iid) -> CometResult<Option<String>>;

    /// Persist a new thing
    ///
    /// `container` is required for everything but top containers; its
    /// `sequence` positions the thing in ordered containment. Returns false
    /// if the identity exists or the position is taken.
    fn create(
        &mut self,
        partition: &Partition,
        thing: &Thing,
        container: Option<&ContainerInfo>,
    ) -> CometResult<bool>;

    /// Replace the non-composite properties of a thing
    ///
    /// A `container` different from the stored one moves the thing there.
    /// Returns false if the thing does not exist.
    fn update(
        &mut self,
        partition: &Partition,
        thing: &Thing,
        container: Option<&ContainerInfo>,
    ) -> CometResult<bool>;

    /// Remove a thing and, recursively, its composite children
    ///
    /// Returns the keys of every removed thing, empty if it did not exist.
    fn delete(&mut self, partition: &Partition, key: &ThingKey) -> CometResult<Vec<ThingKey>>;

    /// Link a member into a non-composite collection
    ///
    /// Returns false if already present (or the position is taken).
    fn add_to_collection(
        &mut self,
        partition: &Partition,
        key: &ThingKey,
        property: &str,
        entry: &CollectionEntry,
    ) -> CometResult<bool>;

    /// Unlink a member from a non-composite collection
    ///
    /// Returns false if the member was not linked.
    fn remove_from_collection(
        &mut self,
        partition: &Partition,
        key: &ThingKey,
        property: &str,
        entry: &CollectionEntry,
    ) -> CometResult<bool>;

    /// Move an item of an ordered non-composite collection from `item.key` to `item.move_to`
    fn reorder_collection(
        &mut self,
        partition: &Partition,
        key: &ThingKey,
        property: &str,
        item: &OrderedItem,
    ) -> CometResult<bool>;

    /// Move a child within its container's ordered composite collection
    fn reorder_containment(
        &mut self,
        partition: &Partition,
        child: &ThingKey,
        item: &OrderedItem,
    ) -> CometResult<bool>;
}

/// Snapshot of one thing at one revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionRecord {
    /// Partition the thing lives in
    pub partition: Partition,
    /// Identity
    pub iid: Iid,
    /// Concrete type
    pub type_name: String,
    /// Revision the snapshot belongs to
    pub revision: i64,
    /// Person who submitted the write, if known
    pub actor: Option<Iid>,
    /// Commit time
    pub timestamp: DateTime<Utc>,
    /// Full state at this revision
    pub snapshot: Thing,
}

/// Revision bookkeeping of a store transaction
///
/// Partitions passed here are resolved to their revision scope by the
/// implementation, so an iteration partition shares the counter of its
/// engineering model.
pub trait RevisionStore {
    /// Last revision saved for the scope of `partition`
    fn revision_high_water(&self, partition: &Partition) -> CometResult<Option<i64>>;

    /// Revision stamped on everything this transaction mutates
    fn set_transaction_revision(&mut self, revision: i64) -> CometResult<()>;

    /// Things in the scope of `partition` currently stamped with `revision`
    fn changed_things(
        &self,
        partition: &Partition,
        revision: i64,
    ) -> CometResult<Vec<(Partition, Thing)>>;

    /// Append revision snapshots
    fn append_revisions(&mut self, records: Vec<RevisionRecord>) -> CometResult<()>;

    /// Record `revision` as the last saved one
    fn set_revision_high_water(&mut self, partition: &Partition, revision: i64) -> CometResult<()>;

    /// Things in `partition` whose revision number exceeds `revision`
    fn things_since(&self, partition: &Partition, revision: i64) -> CometResult<Vec<Thing>>;

    /// Snapshots of one thing with `from <= revision <= to`, oldest first
    fn revision_history(
        &self,
        partition: &Partition,
        iid: Iid,
        from: i64,
        to: i64,
    ) -> CometResult<Vec<RevisionRecord>>;
}

/// Read-only view of a scope's committed state
///
/// Readers go through a view instead of a transaction, so they never wait on
/// the scope's writer. Once created, a view does not change.
pub trait RevisionView: Send + Sync {
    /// Read committed things of `type_name` in `partition`
    fn read(
        &self,
        partition: &Partition,
        type_name: &str,
        ids: Option<&[Iid]>,
    ) -> CometResult<Vec<ThingRecord>>;

    /// Last revision committed when the view was taken
    fn revision_high_water(&self) -> Option<i64>;

    /// Things in `partition` whose revision number exceeds `revision`
    fn things_since(&self, partition: &Partition, revision: i64) -> CometResult<Vec<Thing>>;

    /// Snapshots of one thing with `from <= revision <= to`, oldest first
    fn revision_history(
        &self,
        partition: &Partition,
        iid: Iid,
        from: i64,
        to: i64,
    ) -> CometResult<Vec<RevisionRecord>>;
}

/// Access control decisions
pub trait PermissionOracle: Send + Sync {
    /// May the current actor see `thing`
    fn can_read(&self, thing: &Thing, partition: &Partition) -> bool;

    /// May the current actor perform `kind` on `thing`
    fn can_write(&self, thing: &Thing, kind: OperationKind, partition: &Partition) -> bool;
}

/// Durable content-addressed binary storage
pub trait FileBinaryStore: Send + Sync {
    /// True if content with this hash is already stored
    fn is_file_persisted(&self, content_hash: &str) -> CometResult<bool>;

    /// Store content under its hash
    fn store_binary_data(&self, content_hash: &str, data: &[u8]) -> CometResult<()>;

    /// Read stored content
    fn read_binary_data(&self, content_hash: &str) -> CometResult<Option<Vec<u8>>>;
}
