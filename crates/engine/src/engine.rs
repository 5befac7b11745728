//! Engine facade
//!
//! CometEngine owns the store, the operation processor and the request
//! counters. One `post` is one transaction:
//!
//! 1. begin a transaction on the partition's revision scope
//! 2. stamp it with the next revision number
//! 3. process the batch
//! 4. snapshot every changed thing into the revision log
//! 5. commit, or roll back everything on the first error
//!
//! Readers work on a snapshot of the last committed state: they see either
//! all of a batch or none of it, and never wait on a writer.

use crate::config::EngineConfig;
use crate::coordinator::{RequestCoordinator, RequestMetrics};
use crate::files::{LocalFileStore, UploadedFiles};
use crate::processor::OperationProcessor;
use crate::revision;
use crate::side_effects::SideEffectRegistry;
use comet_core::{
    CometError, CometResult, FileBinaryStore, Iid, MetaInfoProvider, Operation, Partition,
    PermissionOracle, RevisionRecord, RevisionView, Thing, ThingStore,
};
use comet_storage::{MemoryStore, MemoryTransaction};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a committed write request
#[derive(Debug, Clone, PartialEq)]
pub struct PostOutcome {
    /// Revision the request produced, `None` if it changed nothing
    pub revision: Option<i64>,
    /// Every thing the request created or modified, at its new revision
    pub changed: Vec<Thing>,
}

/// Transactional engine over the in-memory store
pub struct CometEngine {
    store: MemoryStore,
    processor: OperationProcessor,
    coordinator: RequestCoordinator,
}

impl CometEngine {
    /// Engine with the default configuration
    pub fn new(meta: Arc<dyn MetaInfoProvider>) -> Self {
        let store = MemoryStore::new(Arc::clone(&meta));
        CometEngine {
            store,
            processor: OperationProcessor::new(meta),
            coordinator: RequestCoordinator::new(),
        }
    }

    /// Engine for an explicit configuration
    ///
    /// Opens the local file store when `config.file_store.root` is set.
    pub fn with_config(meta: Arc<dyn MetaInfoProvider>, config: EngineConfig) -> CometResult<Self> {
        config.validate()?;
        let store = MemoryStore::new(Arc::clone(&meta)).with_lock_timeout(config.lock_timeout());
        let mut processor = OperationProcessor::new(meta);
        if let Some(root) = &config.file_store.root {
            let files = LocalFileStore::open(root)?;
            info!(target: "comet::txn", root = %files.root().display(), "File store opened");
            processor = processor.with_file_store(Arc::new(files));
        }
        Ok(CometEngine {
            store,
            processor: processor.with_config(config),
            coordinator: RequestCoordinator::new(),
        })
    }

    /// Engine configured from `comet.toml` in `dir`, written with defaults if missing
    ///
    /// A relative file store root is taken relative to `dir`.
    pub fn open(meta: Arc<dyn MetaInfoProvider>, dir: &Path) -> CometResult<Self> {
        let mut config = EngineConfig::load_or_create(dir)?;
        if let Some(root) = config.file_store.root.as_mut() {
            if root.is_relative() {
                *root = dir.join(&*root);
            }
        }
        Self::with_config(meta, config)
    }

    /// Replace the permission oracle
    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionOracle>) -> Self {
        self.processor = self.processor.with_permissions(permissions);
        self
    }

    /// Replace the hook registry
    pub fn with_side_effects(mut self, side_effects: SideEffectRegistry) -> Self {
        self.processor = self.processor.with_side_effects(side_effects);
        self
    }

    /// Replace the durable file store
    pub fn with_file_store(mut self, files: Arc<dyn FileBinaryStore>) -> Self {
        self.processor = self.processor.with_file_store(files);
        self
    }

    /// The operation processor
    pub fn processor(&self) -> &OperationProcessor {
        &self.processor
    }

    /// The underlying store
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Run `f` in a transaction on `partition`'s revision scope
    ///
    /// Commits when `f` succeeds, rolls back when it fails.
    pub fn transaction<F, T>(&self, partition: &Partition, f: F) -> CometResult<T>
    where
        F: FnOnce(&mut MemoryTransaction) -> CometResult<T>,
    {
        self.coordinator.record_start();
        let mut txn = match self.store.begin(partition) {
            Ok(txn) => txn,
            Err(e) => {
                self.coordinator.record_abort();
                return Err(e);
            }
        };

        match f(&mut txn) {
            Ok(value) => match txn.commit() {
                Ok(()) => {
                    self.coordinator.record_commit();
                    Ok(value)
                }
                Err(e) => {
                    self.coordinator.record_abort();
                    Err(e)
                }
            },
            Err(e) => {
                txn.rollback();
                self.coordinator.record_abort();
                Err(e)
            }
        }
    }

    /// Apply one write request atomically
    ///
    /// `actor` is recorded on every revision snapshot.
    pub fn post(
        &self,
        partition: &Partition,
        actor: Option<Iid>,
        operation: &Operation,
        uploads: Option<&UploadedFiles>,
    ) -> CometResult<PostOutcome> {
        let outcome = self.transaction(partition, |txn| {
            let revision = revision::begin_revision(txn, partition)?;
            self.processor.process(operation, txn, partition, uploads)?;
            let changed = revision::save_revisions(txn, partition, actor, revision)?;
            Ok(PostOutcome {
                revision: (!changed.is_empty()).then_some(revision),
                changed: changed.into_iter().map(|(_, thing)| thing).collect(),
            })
        });

        match &outcome {
            Ok(outcome) => info!(
                target: "comet::txn",
                partition = %partition,
                revision = ?outcome.revision,
                changed = outcome.changed.len(),
                "Request committed"
            ),
            Err(e) => warn!(
                target: "comet::txn",
                partition = %partition,
                code = e.error_code(),
                "Request rolled back"
            ),
        }
        outcome
    }

    /// Persist a top container, the root of a new revision scope
    ///
    /// Returns the revision it was created at.
    pub fn bootstrap(&self, partition: &Partition, top: &Thing) -> CometResult<i64> {
        let meta = self.processor.meta();
        if !meta.require_type(&top.type_name)?.is_top_container {
            return Err(CometError::malformed(format!(
                "{} is not a top container",
                top.type_name
            )));
        }

        self.transaction(partition, |txn| {
            let revision = revision::begin_revision(txn, partition)?;
            if !txn.create(partition, top, None)? {
                return Err(CometError::DuplicateEntity {
                    type_name: top.type_name.clone(),
                    iid: top.iid,
                });
            }
            revision::save_revisions(txn, partition, None, revision)?;
            debug!(target: "comet::txn", partition = %partition, thing = %top.key(), revision, "Bootstrapped");
            Ok(revision)
        })
    }

    /// Visible things in `partition` changed after `revision`
    pub fn get_since(&self, partition: &Partition, revision: i64) -> CometResult<Vec<Thing>> {
        let permissions = self.processor.permissions();
        let snapshot = self.store.snapshot(partition);
        let things = revision::get_since(&snapshot, partition, revision)?;
        Ok(things
            .into_iter()
            .filter(|thing| permissions.can_read(thing, partition))
            .collect())
    }

    /// Revision snapshots of one thing between `from` and `to`, inclusive
    pub fn get_range(
        &self,
        partition: &Partition,
        iid: Iid,
        from: i64,
        to: i64,
    ) -> CometResult<Vec<RevisionRecord>> {
        let permissions = self.processor.permissions();
        let snapshot = self.store.snapshot(partition);
        let records = revision::get_range(&snapshot, partition, iid, from, to)?;
        Ok(records
            .into_iter()
            .filter(|record| permissions.can_read(&record.snapshot, partition))
            .collect())
    }

    /// Current visible state of things of `type_name`
    pub fn read(
        &self,
        partition: &Partition,
        type_name: &str,
        ids: Option<&[Iid]>,
    ) -> CometResult<Vec<Thing>> {
        let permissions = self.processor.permissions();
        let snapshot = self.store.snapshot(partition);
        Ok(snapshot
            .read(partition, type_name, ids)?
            .into_iter()
            .map(|record| record.thing)
            .filter(|thing| permissions.can_read(thing, partition))
            .collect())
    }

    /// Latest committed revision of `partition`'s scope
    pub fn current_revision(&self, partition: &Partition) -> Option<i64> {
        self.store.snapshot(partition).revision_high_water()
    }

    /// Request counters
    pub fn metrics(&self) -> RequestMetrics {
        self.coordinator.metrics()
    }
}

impl std::fmt::Debug for CometEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CometEngine")
            .field("scopes", &self.store.scope_count())
            .field("processor", &self.processor)
            .finish()
    }
}
