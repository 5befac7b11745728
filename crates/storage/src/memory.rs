//! In-memory persistence oracle
//!
//! # Design
//!
//! - DashMap keyed by revision scope; each scope has its own writer mutex
//! - Per-scope: the site directory and each engineering model never contend
//! - A transaction holds the writer mutex for its whole lifetime, so write
//!   requests against one scope are serialized and a revision number read at
//!   the start of a transaction cannot be taken by anyone else
//! - Lock acquisition waits at most `lock_timeout`, then fails
//! - Readers take a [`MemorySnapshot`] of the last committed state and never
//!   touch the writer mutex

use crate::scope::Scope;
use crate::snapshot::MemorySnapshot;
use crate::transaction::MemoryTransaction;
use comet_core::{CometError, CometResult, MetaInfoProvider, Partition};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Default wait for a scope lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Transactional in-memory store
pub struct MemoryStore {
    meta: Arc<dyn MetaInfoProvider>,
    scopes: DashMap<Partition, Arc<Scope>>,
    lock_timeout: Duration,
}

impl MemoryStore {
    /// Empty store for the given type metadata
    pub fn new(meta: Arc<dyn MetaInfoProvider>) -> Self {
        MemoryStore {
            meta,
            scopes: DashMap::new(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Set the wait for a scope lock
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Type metadata the store maintains containment with
    pub fn meta(&self) -> &Arc<dyn MetaInfoProvider> {
        &self.meta
    }

    fn scope(&self, scope: &Partition) -> Arc<Scope> {
        self.scopes
            .entry(scope.clone())
            .or_insert_with(|| Arc::new(Scope::default()))
            .clone()
    }

    /// Begin a transaction on the revision scope of `partition`
    ///
    /// Blocks while another transaction holds the scope, up to the lock timeout.
    pub fn begin(&self, partition: &Partition) -> CometResult<MemoryTransaction> {
        let scope = partition.revision_scope();
        let state = self.scope(&scope);

        let guard = state.writer.try_lock_arc_for(self.lock_timeout).ok_or_else(|| {
            warn!(target: "comet::store", scope = %scope, timeout_ms = u64::try_from(self.lock_timeout.as_millis()).unwrap_or(u64::MAX), "Lock timeout");
            CometError::storage(format!(
                "timed out after {:?} waiting for partition '{}'",
                self.lock_timeout, scope
            ))
        })?;
        Ok(MemoryTransaction::new(scope, state, guard, Arc::clone(&self.meta)))
    }

    /// Last committed state of the revision scope of `partition`
    ///
    /// Never waits on a writer; changes of an open transaction are not visible.
    pub fn snapshot(&self, partition: &Partition) -> MemorySnapshot {
        let scope = partition.revision_scope();
        let committed = self.scope(&scope).current();
        MemorySnapshot::new(scope, committed)
    }

    /// Number of scopes that have been opened
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }
}
