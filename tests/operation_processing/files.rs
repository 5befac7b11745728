//! File revisions and uploaded binaries.

use crate::common::*;
use comet::{
    content_hash, EngineConfig, FileBinaryStore, MemoryFileStore, UploadedFiles,
    CONFIG_FILE_NAME,
};
use std::sync::Arc;
use tempfile::TempDir;

struct FileFixture {
    fx: ModelFixture,
    files: Arc<MemoryFileStore>,
    store: Uuid,
}

impl FileFixture {
    fn new() -> Self {
        let files = Arc::new(MemoryFileStore::new());
        let engine = CometEngine::new(ecss_model().unwrap()).with_file_store(files.clone());
        let fx = ModelFixture::with_engine(engine);
        let store = fx.add_file_store("D");
        FileFixture { fx, files, store }
    }

    /// New file with one revision naming `hash`
    fn new_file(&self, hash: &str) -> (Uuid, Uuid, Operation) {
        new_file_in(self.store, hash)
    }
}

fn new_file_in(store: Uuid, hash: &str) -> (Uuid, Uuid, Operation) {
    let file = Uuid::new_v4();
    let revision = Uuid::new_v4();
    let op = Operation::new()
        .create(ClasslessDto::new("File", file).with("FileRevision", Value::id_list([revision])))
        .create(
            ClasslessDto::new("FileRevision", revision)
                .with("Name", "report.pdf")
                .with("ContentHash", hash),
        )
        .update(ClasslessDto::new("DomainFileStore", store).with("File", Value::id_list([file])));
    (file, revision, op)
}

#[test]
fn upload_is_stored_with_its_revision() {
    let ff = FileFixture::new();
    let mut uploads = UploadedFiles::new();
    let hash = uploads.add(b"%PDF-1.7".to_vec());
    let (file, revision, op) = ff.new_file(&hash);

    let outcome = ff
        .fx
        .engine
        .post(&ff.fx.iteration_partition, None, &op, Some(&uploads))
        .unwrap();
    assert!(outcome.revision.is_some());
    assert!(ff.fx.get("File", file).is_some());
    assert!(ff.fx.get("FileRevision", revision).is_some());
    assert_eq!(
        ff.files.read_binary_data(&hash).unwrap(),
        Some(b"%PDF-1.7".to_vec())
    );
}

#[test]
fn previously_stored_content_needs_no_upload() {
    let ff = FileFixture::new();
    let hash = content_hash(b"shared");
    ff.files.store_binary_data(&hash, b"shared").unwrap();
    let (_, revision, op) = ff.new_file(&hash);

    ff.fx.post(&op).unwrap();
    assert!(ff.fx.get("FileRevision", revision).is_some());
}

#[test]
fn missing_content_is_rejected() {
    let ff = FileFixture::new();
    let hash = content_hash(b"never uploaded");
    let (file, _, op) = ff.new_file(&hash);

    let err = ff.fx.post(&op).unwrap_err();
    assert!(
        matches!(err, CometError::MissingFileContent { ref content_hash, .. } if *content_hash == hash)
    );
    assert!(ff.fx.get("File", file).is_none());
}

#[test]
fn unreferenced_upload_is_rejected() {
    let ff = FileFixture::new();
    let mut uploads = UploadedFiles::new();
    let used = uploads.add(b"used".to_vec());
    uploads.add(b"stray".to_vec());
    let (_, _, op) = ff.new_file(&used);

    let err = ff
        .fx
        .engine
        .post(&ff.fx.iteration_partition, None, &op, Some(&uploads))
        .unwrap_err();
    assert!(matches!(err, CometError::MalformedOperation { .. }));
    assert!(ff.files.is_empty());
}

#[test]
fn file_revisions_are_immutable() {
    let ff = FileFixture::new();
    let hash = content_hash(b"v1");
    ff.files.store_binary_data(&hash, b"v1").unwrap();
    let (_, revision, op) = ff.new_file(&hash);
    ff.fx.post(&op).unwrap();

    let rename = Operation::new()
        .update(ClasslessDto::new("FileRevision", revision).with("Name", "other.pdf"));
    let err = ff.fx.post(&rename).unwrap_err();
    assert!(matches!(err, CometError::MalformedOperation { .. }));
}

#[test]
fn uploads_without_file_store_are_a_configuration_error() {
    let fx = ModelFixture::new();
    let store = fx.add_file_store("D");
    let mut uploads = UploadedFiles::new();
    let hash = uploads.add(b"data".to_vec());
    let (_, _, op) = new_file_in(store, &hash);

    let err = fx
        .engine
        .post(&fx.iteration_partition, None, &op, Some(&uploads))
        .unwrap_err();
    assert!(matches!(err, CometError::Configuration { .. }));
}

#[test]
fn configured_engine_persists_uploads_on_disk() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig::default().with_file_store(dir.path().join("files"));
    let engine = CometEngine::with_config(ecss_model().unwrap(), config).unwrap();
    let fx = ModelFixture::with_engine(engine);
    let store = fx.add_file_store("D");

    let mut uploads = UploadedFiles::new();
    let hash = uploads.add(b"on disk".to_vec());
    let (_, _, op) = new_file_in(store, &hash);
    fx.engine
        .post(&fx.iteration_partition, None, &op, Some(&uploads))
        .unwrap();

    let files = fx.engine.processor().file_store().unwrap();
    assert!(files.is_file_persisted(&hash).unwrap());
    assert!(dir.path().join("files").join(&hash[..2]).join(&hash).exists());
}

#[test]
fn open_writes_default_config() {
    let dir = TempDir::new().unwrap();
    let engine = CometEngine::open(ecss_model().unwrap(), dir.path()).unwrap();
    assert!(dir.path().join(CONFIG_FILE_NAME).exists());
    assert!(engine.processor().file_store().is_none());
}
