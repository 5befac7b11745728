//! Comet - operation processing for a versioned ECSS-E-TM-10-25 data model
//!
//! Comet applies batched create, update and delete requests to a revisioned
//! store of model things, one atomic revision per request.
//!
//! # Quick Start
//!
//! ```
//! use comet::{ecss_model, ClasslessDto, CometEngine, Operation, Partition, Thing, Value};
//! use uuid::Uuid;
//!
//! let engine = CometEngine::new(ecss_model()?);
//! let site = Partition::site_directory();
//! let root = Uuid::new_v4();
//! engine.bootstrap(&site, &Thing::new("SiteDirectory", root))?;
//!
//! let ada = Uuid::new_v4();
//! let op = Operation::new()
//!     .create(
//!         ClasslessDto::new("Person", ada)
//!             .with("GivenName", "Ada")
//!             .with("Surname", "Lovelace"),
//!     )
//!     .update(ClasslessDto::new("SiteDirectory", root).with("Person", Value::id_list([ada])));
//! let outcome = engine.post(&site, None, &op, None)?;
//! assert_eq!(outcome.revision, Some(2));
//! # Ok::<(), comet::CometError>(())
//! ```
//!
//! # Architecture
//!
//! - `comet-core`: things, operations, type metadata and the storage traits
//! - `comet-storage`: transactional in-memory store with revision history
//! - `comet-engine`: the operation processor and the engine facade

pub use comet_core::*;
pub use comet_engine::*;
pub use comet_storage::{MemorySnapshot, MemoryStore, MemoryTransaction, DEFAULT_LOCK_TIMEOUT};
