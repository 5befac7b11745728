//! Error types for the operation processing engine
//!
//! Every failure surfaced while validating, resolving or applying a batch is a
//! [`CometError`]. Errors carry the identity of the offending thing where one
//! exists, so callers can report them without re-reading the payload.
//!
//! The engine never decides how an error reaches a client. [`CometError::error_code`]
//! gives a stable machine-readable code and the `is_*` predicates group
//! variants into the classes a transport layer usually cares about.

use crate::operation::OperationKind;
use crate::types::Iid;
use std::io;
use thiserror::Error;

/// Result type alias for engine operations
pub type CometResult<T> = std::result::Result<T, CometError>;

/// Error taxonomy for batch processing
#[derive(Debug, Error)]
pub enum CometError {
    /// The batch violates a structural rule (missing keys, unknown type,
    /// scalar change in a delete, update of an immutable type, ...)
    #[error("Malformed operation: {reason}")]
    MalformedOperation {
        /// What was wrong with the batch
        reason: String,
    },

    /// A created thing is not referenced by any container in the batch
    #[error("No container in the operation references {type_name} '{iid}'")]
    MissingContainerRegistration {
        /// Type of the orphaned thing
        type_name: String,
        /// Identity of the orphaned thing
        iid: Iid,
    },

    /// A file-bearing thing names content that was neither uploaded nor stored
    #[error("File content '{content_hash}' for {type_name} '{iid}' is not available")]
    MissingFileContent {
        /// Type of the file-bearing thing
        type_name: String,
        /// Identity of the file-bearing thing
        iid: Iid,
        /// The referenced content hash (may be empty)
        content_hash: String,
    },

    /// A create targets an identity that is already persisted
    #[error("{type_name} '{iid}' already exists")]
    DuplicateEntity {
        /// Type of the duplicate
        type_name: String,
        /// Identity of the duplicate
        iid: Iid,
    },

    /// A container or referenced thing resolves neither from the batch nor from storage
    #[error("{type_name} '{iid}' could not be resolved")]
    ContainerNotFound {
        /// Type that was looked up
        type_name: String,
        /// Identity that was looked up
        iid: Iid,
    },

    /// The permission oracle denied the write
    #[error("Permission denied: {kind} of {type_name} '{iid}'")]
    PermissionDenied {
        /// Type of the target
        type_name: String,
        /// Identity of the target
        iid: Iid,
        /// Requested operation
        kind: OperationKind,
    },

    /// A before-create hook refused the thing
    #[error("Creation of {type_name} '{iid}' was vetoed")]
    HookVetoed {
        /// Type of the vetoed thing
        type_name: String,
        /// Identity of the vetoed thing
        iid: Iid,
    },

    /// A side-effect hook rejected the operation
    #[error("{type_name} side effect rejected the operation: {reason}")]
    SideEffect {
        /// Type whose hook failed
        type_name: String,
        /// Reason reported by the hook
        reason: String,
    },

    /// Persistence failure (missing revision, lock timeout, broken containment)
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the failure
        message: String,
    },

    /// Invalid or unreadable configuration
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the failure
        message: String,
    },

    /// I/O error (file store, configuration file)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CometError {
    /// Create a malformed operation error
    pub fn malformed(reason: impl Into<String>) -> Self {
        CometError::MalformedOperation {
            reason: reason.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        CometError::Storage {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        CometError::Configuration {
            message: message.into(),
        }
    }

    /// Create a side-effect rejection for the given type
    pub fn side_effect(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        CometError::SideEffect {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a resolution failure for the given identity
    pub fn not_found(type_name: impl Into<String>, iid: Iid) -> Self {
        CometError::ContainerNotFound {
            type_name: type_name.into(),
            iid,
        }
    }

    /// Stable code for the variant
    pub fn error_code(&self) -> &'static str {
        match self {
            CometError::MalformedOperation { .. } => "MalformedOperation",
            CometError::MissingContainerRegistration { .. } => "MissingContainerRegistration",
            CometError::MissingFileContent { .. } => "MissingFileContent",
            CometError::DuplicateEntity { .. } => "DuplicateEntity",
            CometError::ContainerNotFound { .. } => "ContainerNotFound",
            CometError::PermissionDenied { .. } => "PermissionDenied",
            CometError::HookVetoed { .. } => "HookVetoed",
            CometError::SideEffect { .. } => "SideEffect",
            CometError::Storage { .. } => "Storage",
            CometError::Configuration { .. } => "Configuration",
            CometError::Io(_) => "Io",
            CometError::Serialization(_) => "Serialization",
        }
    }

    /// The request itself is at fault and resubmitting it unchanged cannot succeed
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            CometError::MalformedOperation { .. }
                | CometError::MissingContainerRegistration { .. }
                | CometError::MissingFileContent { .. }
                | CometError::HookVetoed { .. }
                | CometError::SideEffect { .. }
        )
    }

    /// The batch conflicts with persisted state
    pub fn is_conflict(&self) -> bool {
        matches!(self, CometError::DuplicateEntity { .. })
    }

    /// A required thing does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, CometError::ContainerNotFound { .. })
    }

    /// The caller lacks the rights for the write
    pub fn is_forbidden(&self) -> bool {
        matches!(self, CometError::PermissionDenied { .. })
    }

    /// Infrastructure failure, not attributable to the request
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            CometError::Storage { .. }
                | CometError::Configuration { .. }
                | CometError::Io(_)
                | CometError::Serialization(_)
        )
    }
}

impl From<serde_json::Error> for CometError {
    fn from(e: serde_json::Error) -> Self {
        CometError::Serialization(e.to_string())
    }
}
