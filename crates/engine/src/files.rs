//! File content handling
//!
//! Binaries are content addressed by the lowercase hex SHA-256 of their
//! bytes. A request carries its uploads in [`UploadedFiles`]; they are checked
//! by the validator and written to a [`FileBinaryStore`] once every phase of
//! the batch has succeeded.
//!
//! Two stores are provided:
//! - [`LocalFileStore`]: one file per hash under a root directory
//! - [`MemoryFileStore`]: process-local map, for tests and embedding

use comet_core::{CometError, CometResult, FileBinaryStore};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Content hash of a binary
pub fn content_hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

fn check_hash(hash: &str) -> CometResult<()> {
    let valid = hash.len() == 64 && hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
    if valid {
        Ok(())
    } else {
        Err(CometError::malformed(format!("'{}' is not a content hash", hash)))
    }
}

/// Binaries uploaded with one request, keyed by content hash
#[derive(Debug, Clone, Default)]
pub struct UploadedFiles {
    files: BTreeMap<String, Vec<u8>>,
}

impl UploadedFiles {
    /// No uploads
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binary, returning its content hash
    pub fn add(&mut self, data: impl Into<Vec<u8>>) -> String {
        let data = data.into();
        let hash = content_hash(&data);
        self.files.insert(hash.clone(), data);
        hash
    }

    /// True if a binary with this hash was uploaded
    pub fn contains(&self, hash: &str) -> bool {
        self.files.contains_key(hash)
    }

    /// Uploaded bytes
    pub fn get(&self, hash: &str) -> Option<&[u8]> {
        self.files.get(hash).map(Vec::as_slice)
    }

    /// Hashes in ascending order
    pub fn hashes(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Hash and bytes of every upload
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files
            .iter()
            .map(|(hash, data)| (hash.as_str(), data.as_slice()))
    }

    /// Number of uploads
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True if nothing was uploaded
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Directory-backed file store
///
/// Content lives at `<root>/<first two hex digits>/<hash>`.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// Open a store, creating the root directory if needed
    pub fn open(root: impl Into<PathBuf>) -> CometResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(LocalFileStore { root })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, hash: &str) -> CometResult<PathBuf> {
        check_hash(hash)?;
        Ok(self.root.join(&hash[..2]).join(hash))
    }
}

impl FileBinaryStore for LocalFileStore {
    fn is_file_persisted(&self, content_hash: &str) -> CometResult<bool> {
        Ok(self.path_for(content_hash)?.is_file())
    }

    fn store_binary_data(&self, content_hash: &str, data: &[u8]) -> CometResult<()> {
        let path = self.path_for(content_hash)?;
        if path.is_file() {
            return Ok(());
        }
        let dir = path
            .parent()
            .ok_or_else(|| CometError::storage(format!("no parent for '{}'", path.display())))?;
        fs::create_dir_all(dir)?;

        // Write to a temp file and rename so a crash never leaves partial content
        let temp = dir.join(format!(".{}.tmp", content_hash));
        let mut file = fs::File::create(&temp)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&temp, &path)?;
        debug!(target: "comet::operation", hash = content_hash, bytes = data.len(), "Stored file content");
        Ok(())
    }

    fn read_binary_data(&self, content_hash: &str) -> CometResult<Option<Vec<u8>>> {
        let path = self.path_for(content_hash)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Map-backed file store
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryFileStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored binaries
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl FileBinaryStore for MemoryFileStore {
    fn is_file_persisted(&self, content_hash: &str) -> CometResult<bool> {
        Ok(self.files.read().contains_key(content_hash))
    }

    fn store_binary_data(&self, content_hash: &str, data: &[u8]) -> CometResult<()> {
        self.files
            .write()
            .entry(content_hash.to_string())
            .or_insert_with(|| data.to_vec());
        Ok(())
    }

    fn read_binary_data(&self, content_hash: &str) -> CometResult<Option<Vec<u8>>> {
        Ok(self.files.read().get(content_hash).cloned())
    }
}
