//! Operation processing engine for comet
//!
//! This crate turns batched write requests into committed revisions:
//! - OperationProcessor: validate, resolve, then apply deletes, creates and updates
//! - Side effects: per-type hooks around every write
//! - Revision tracking: one revision number per transaction and scope
//! - CometEngine: transaction boundary, bootstrap and revision queries
//!
//! The engine is the only component that knows about:
//! - Phase ordering inside a batch
//! - Containment resolution against storage
//! - File content hashes and the durable file store

#![warn(missing_docs)]
#![warn(clippy::all)]

mod apply;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod engine;
pub mod files;
pub mod model;
pub mod permission;
pub mod processor;
pub mod resolver;
pub mod revision;
pub mod side_effects;
mod validator;

pub use config::{EngineConfig, FileStoreConfig, CONFIG_FILE_NAME};
pub use context::{ContainerSlot, EntryRole, OperationContext, ResolveEntry};
pub use coordinator::{RequestCoordinator, RequestMetrics};
pub use engine::{CometEngine, PostOutcome};
pub use files::{content_hash, LocalFileStore, MemoryFileStore, UploadedFiles};
pub use model::ecss_model;
pub use permission::{AllowAll, TypeAccessPolicy};
pub use processor::OperationProcessor;
pub use resolver::ResolveStats;
pub use side_effects::{HookContext, OperationSideEffect, SideEffectRegistry};
