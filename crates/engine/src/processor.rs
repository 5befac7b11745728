//! Operation processor
//!
//! [`OperationProcessor::process`] runs one batch against a caller-owned
//! transaction:
//!
//! 1. validate the batch and build the request context
//! 2. resolve containers and references from storage
//! 3. apply deletes, creates and updates, in that order
//! 4. write the request's uploaded binaries to the file store
//!
//! Any error leaves the transaction in an undefined state; the caller rolls
//! it back. The processor never commits and never retries.

use crate::apply::ApplyEngine;
use crate::config::EngineConfig;
use crate::context::OperationContext;
use crate::files::UploadedFiles;
use crate::permission::AllowAll;
use crate::resolver::ContainmentResolver;
use crate::side_effects::SideEffectRegistry;
use crate::validator::BatchValidator;
use comet_core::{
    CometError, CometResult, FileBinaryStore, MetaInfoProvider, Operation, Partition,
    PermissionOracle, ThingStore,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Applies batched write requests
#[derive(Clone)]
pub struct OperationProcessor {
    meta: Arc<dyn MetaInfoProvider>,
    side_effects: SideEffectRegistry,
    permissions: Arc<dyn PermissionOracle>,
    files: Option<Arc<dyn FileBinaryStore>>,
    config: EngineConfig,
}

impl OperationProcessor {
    /// Processor with the built-in hooks, no access restrictions and no file store
    pub fn new(meta: Arc<dyn MetaInfoProvider>) -> Self {
        OperationProcessor {
            meta,
            side_effects: SideEffectRegistry::with_builtin(),
            permissions: Arc::new(AllowAll),
            files: None,
            config: EngineConfig::default(),
        }
    }

    /// Replace the hook registry
    pub fn with_side_effects(mut self, side_effects: SideEffectRegistry) -> Self {
        self.side_effects = side_effects;
        self
    }

    /// Replace the permission oracle
    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionOracle>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Durable store for uploaded binaries
    pub fn with_file_store(mut self, files: Arc<dyn FileBinaryStore>) -> Self {
        self.files = Some(files);
        self
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Type metadata
    pub fn meta(&self) -> &Arc<dyn MetaInfoProvider> {
        &self.meta
    }

    /// Hook registry
    pub fn side_effects(&self) -> &SideEffectRegistry {
        &self.side_effects
    }

    /// Permission oracle
    pub fn permissions(&self) -> &Arc<dyn PermissionOracle> {
        &self.permissions
    }

    /// Durable file store, if configured
    pub fn file_store(&self) -> Option<&Arc<dyn FileBinaryStore>> {
        self.files.as_ref()
    }

    /// Configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply one batch to `store`
    ///
    /// # Errors
    ///
    /// Any validation, resolution, permission, hook or storage failure. The
    /// caller must roll the transaction back.
    pub fn process(
        &self,
        operation: &Operation,
        store: &mut dyn ThingStore,
        partition: &Partition,
        uploads: Option<&UploadedFiles>,
    ) -> CometResult<()> {
        let started = Instant::now();
        let result = self.run(operation, store, partition, uploads);
        match &result {
            Ok(()) => debug!(
                target: "comet::operation",
                partition = %partition,
                elapsed_us = elapsed_micros(started.elapsed()),
                "Batch applied"
            ),
            Err(e) => warn!(
                target: "comet::operation",
                partition = %partition,
                code = e.error_code(),
                error = %e,
                "Batch aborted"
            ),
        }
        result
    }

    fn run(
        &self,
        operation: &Operation,
        store: &mut dyn ThingStore,
        partition: &Partition,
        uploads: Option<&UploadedFiles>,
    ) -> CometResult<()> {
        let uploads = uploads.filter(|uploads| !uploads.is_empty());
        if uploads.is_some() && self.files.is_none() {
            return Err(CometError::configuration(
                "file uploads need a configured file store",
            ));
        }

        let mut ctx = OperationContext::new(partition.clone());
        let validator = BatchValidator {
            meta: self.meta.as_ref(),
            side_effects: &self.side_effects,
            files: self.files.as_deref(),
        };
        validator.validate(operation, &mut ctx, uploads)?;

        let resolver = ContainmentResolver {
            meta: self.meta.as_ref(),
            verify_declared_containers: self.config.verify_declared_containers,
        };
        resolver.resolve(&mut ctx, store)?;

        let engine = ApplyEngine {
            meta: self.meta.as_ref(),
            side_effects: &self.side_effects,
            permissions: self.permissions.as_ref(),
        };
        engine.apply_deletes(&operation.delete, &mut ctx, store)?;
        engine.apply_creates(&operation.create, &mut ctx, store)?;
        engine.apply_updates(&operation.update, &mut ctx, store)?;

        if let (Some(uploads), Some(files)) = (uploads, &self.files) {
            for (hash, data) in uploads.iter() {
                files.store_binary_data(hash, data)?;
            }
        }
        Ok(())
    }
}

/// Elapsed time in microseconds, saturating at `u64::MAX`
fn elapsed_micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

impl std::fmt::Debug for OperationProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationProcessor")
            .field("side_effects", &self.side_effects)
            .field("file_store", &self.files.is_some())
            .field("config", &self.config)
            .finish()
    }
}
