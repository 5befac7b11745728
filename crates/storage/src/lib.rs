//! Storage layer for Comet
//!
//! This crate implements the reference persistence oracle:
//! - MemoryStore: DashMap of revision scopes, one mutex per scope
//! - MemoryTransaction: copy-on-begin transaction implementing
//!   `ThingStore` and `RevisionStore`
//! - Containment bookkeeping (composite collections mirror their children)
//! - Revision stamping and an append-only revision log per scope
//! - MemorySnapshot: read-only view of a scope's last committed state
//!
//! # Isolation
//!
//! The site directory and every engineering model are separate scopes.
//! Transactions on different scopes never contend; transactions on the same
//! scope are serialized by the scope's writer mutex. Snapshots never wait on
//! a writer and see only committed state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
mod scope;
pub mod snapshot;
pub mod transaction;

pub use memory::{MemoryStore, DEFAULT_LOCK_TIMEOUT};
pub use snapshot::MemorySnapshot;
pub use transaction::MemoryTransaction;
