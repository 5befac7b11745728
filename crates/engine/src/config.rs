//! Engine configuration via `comet.toml`
//!
//! On first load a commented default `comet.toml` is written next to the
//! data. To change settings, edit the file and restart.

use comet_core::{CometError, CometResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name
pub const CONFIG_FILE_NAME: &str = "comet.toml";

/// Durable file store settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileStoreConfig {
    /// Directory for uploaded binaries; uploads are rejected when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

/// Engine configuration loaded from `comet.toml`.
///
/// # Example
///
/// ```toml
/// verify_declared_containers = false
/// lock_timeout_ms = 5000
///
/// [file_store]
/// root = "/var/lib/comet/files"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Check containers declared by a batch against the stored type of their id
    #[serde(default)]
    pub verify_declared_containers: bool,
    /// Wait for a partition lock, in milliseconds
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Durable file store
    #[serde(default)]
    pub file_store: FileStoreConfig,
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verify_declared_containers: false,
            lock_timeout_ms: default_lock_timeout_ms(),
            file_store: FileStoreConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Lock wait as a duration
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Builder-style toggle for declared container verification
    pub fn with_verified_containers(mut self, verify: bool) -> Self {
        self.verify_declared_containers = verify;
        self
    }

    /// Builder-style file store root
    pub fn with_file_store(mut self, root: impl Into<PathBuf>) -> Self {
        self.file_store.root = Some(root.into());
        self
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Comet engine configuration
#
# Containers named by a batch are trusted as declared (default: false).
# When true, each declared container that the batch does not create is
# checked against the stored type of its id before the batch is applied.
verify_declared_containers = false

# Maximum wait for a partition lock, in milliseconds (default: 5000)
lock_timeout_ms = 5000

# Durable storage for uploaded file content.
# Uncomment to accept file uploads.
# [file_store]
# root = "files"
"#
    }

    /// Parse config from TOML text.
    pub fn from_toml_str(content: &str) -> CometResult<Self> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| CometError::configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> CometResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CometError::configuration(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| {
            CometError::configuration(format!("'{}': {}", path.display(), e))
        })
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> CometResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                CometError::configuration(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Load `comet.toml` from `dir`, creating the default file first if needed.
    pub fn load_or_create(dir: &Path) -> CometResult<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        Self::write_default_if_missing(&path)?;
        Self::from_file(&path)
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> CometResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CometError::configuration(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> CometResult<()> {
        if self.lock_timeout_ms == 0 {
            return Err(CometError::configuration("lock_timeout_ms must be positive"));
        }
        Ok(())
    }
}
