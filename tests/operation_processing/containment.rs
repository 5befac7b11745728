//! Container registration, resolution, re-parenting and cascading deletes.

use crate::common::*;

/// File store `d` holding the given folders, created in one request
fn store_with_folders(fx: &ModelFixture, names: &[&str]) -> (Uuid, Vec<Uuid>) {
    let store = Uuid::new_v4();
    let folders: Vec<Uuid> = names.iter().map(|_| Uuid::new_v4()).collect();
    let mut op = Operation::new()
        .create(file_store(store, "D").with("Folder", Value::id_list(folders.clone())))
        .update(fx.iteration_update().with("DomainFileStore", Value::id_list([store])));
    for (iid, name) in folders.iter().zip(names) {
        op = op.create(folder(*iid, name));
    }
    fx.post(&op).unwrap();
    (store, folders)
}

// ============================================================================
// Registration and resolution
// ============================================================================

#[test]
fn create_without_container_is_rejected() {
    let fx = ModelFixture::new();
    let f = Uuid::new_v4();
    let err = fx.post(&Operation::new().create(folder(f, "loose"))).unwrap_err();
    assert!(matches!(err, CometError::MissingContainerRegistration { iid, .. } if iid == f));
    assert!(err.is_bad_request());
}

#[test]
fn container_missing_from_storage_is_not_found() {
    let fx = ModelFixture::new();
    let f = Uuid::new_v4();
    let ghost = Uuid::new_v4();
    let op = Operation::new()
        .create(folder(f, "F"))
        .update(ClasslessDto::new("DomainFileStore", ghost).with("Folder", Value::id_list([f])));

    let err = fx.post(&op).unwrap_err();
    assert!(matches!(err, CometError::ContainerNotFound { iid, .. } if iid == ghost));
    assert!(fx.get("Folder", f).is_none());
}

#[test]
fn update_of_unknown_thing_is_skipped() {
    let fx = ModelFixture::new();
    let op = Operation::new().update(folder(Uuid::new_v4(), "nowhere"));
    let outcome = fx.post(&op).unwrap();
    assert_eq!(outcome.revision, None);
    assert_eq!(fx.revision(), 2);
}

#[test]
fn relisting_a_member_deleted_in_the_same_batch_is_skipped() {
    let fx = ModelFixture::new();
    let (d1, folders) = store_with_folders(&fx, &["docs"]);
    let d2 = fx.add_file_store("D2");
    let f = folders[0];

    let op = Operation::new()
        .delete(ClasslessDto::new("Folder", f))
        .update(ClasslessDto::new("DomainFileStore", d2).with("Folder", Value::id_list([f])));
    let outcome = fx.post(&op).unwrap();
    assert!(outcome.revision.is_some());

    assert!(fx.get("Folder", f).is_none());
    assert!(fx.get("DomainFileStore", d1).unwrap().ids("Folder").is_empty());
    assert!(fx.get("DomainFileStore", d2).unwrap().ids("Folder").is_empty());
}

#[test]
fn created_thing_lands_in_declared_container() {
    let fx = ModelFixture::new();
    let (store, folders) = store_with_folders(&fx, &["a", "b"]);

    let store = fx.get("DomainFileStore", store).unwrap();
    let mut linked = store.ids("Folder");
    linked.sort();
    let mut expected = folders.clone();
    expected.sort();
    assert_eq!(linked, expected);
}

#[test]
fn create_of_existing_identity_is_a_conflict() {
    let fx = ModelFixture::new();
    let (d, folders) = store_with_folders(&fx, &["docs"]);

    let op = Operation::new()
        .create(folder(folders[0], "again"))
        .update(ClasslessDto::new("DomainFileStore", d).with("Folder", Value::id_list([folders[0]])));
    let err = fx.post(&op).unwrap_err();
    assert!(matches!(err, CometError::DuplicateEntity { iid, .. } if iid == folders[0]));
    assert!(err.is_conflict());
}

#[test]
fn identity_taken_in_sibling_partition_is_a_conflict() {
    let fx = ModelFixture::new();
    let (d, _) = store_with_folders(&fx, &["docs"]);

    // Folders live in the iteration partition, the Iteration itself in the model partition
    let op = Operation::new()
        .create(folder(fx.iteration, "clash"))
        .update(ClasslessDto::new("DomainFileStore", d).with("Folder", Value::id_list([fx.iteration])));
    let err = fx.post(&op).unwrap_err();
    assert!(matches!(err, CometError::DuplicateEntity { iid, .. } if iid == fx.iteration));
    assert!(err.is_conflict());
    assert!(fx.get("Iteration", fx.iteration).is_some());
    assert_eq!(fx.revision(), 3);
}

// ============================================================================
// Re-parenting
// ============================================================================

#[test]
fn listing_an_existing_child_moves_it() {
    let fx = ModelFixture::new();
    let (d1, folders) = store_with_folders(&fx, &["docs"]);
    let d2 = fx.add_file_store("D2");
    let f = folders[0];

    let op = Operation::new()
        .update(ClasslessDto::new("DomainFileStore", d2).with("Folder", Value::id_list([f])));
    let outcome = fx.post(&op).unwrap();
    assert!(outcome.revision.is_some());

    assert!(fx.get("DomainFileStore", d1).unwrap().ids("Folder").is_empty());
    assert_eq!(fx.get("DomainFileStore", d2).unwrap().ids("Folder"), vec![f]);
    assert!(fx.get("Folder", f).is_some());
}

#[test]
fn folder_cycle_is_rejected() {
    let fx = ModelFixture::new();
    let (_, folders) = store_with_folders(&fx, &["a", "b"]);
    let (a, b) = (folders[0], folders[1]);

    fx.post(&Operation::new().update(ClasslessDto::new("Folder", b).with("ContainingFolder", a)))
        .unwrap();

    let err = fx
        .post(&Operation::new().update(ClasslessDto::new("Folder", a).with("ContainingFolder", b)))
        .unwrap_err();
    assert!(matches!(err, CometError::SideEffect { .. }), "unexpected error: {}", err);
    assert!(fx.get("Folder", a).unwrap().get("ContainingFolder").is_none());
}

// ============================================================================
// Deletes
// ============================================================================

#[test]
fn delete_cascades_to_composite_children() {
    let fx = ModelFixture::new();
    let (store, folders) = store_with_folders(&fx, &["a", "b"]);

    let outcome = fx
        .post(&Operation::new().delete(ClasslessDto::new("DomainFileStore", store)))
        .unwrap();
    assert!(outcome.revision.is_some());

    assert!(fx.get("DomainFileStore", store).is_none());
    for f in folders {
        assert!(fx.get("Folder", f).is_none());
    }
    assert!(fx.get("Iteration", fx.iteration).unwrap().ids("DomainFileStore").is_empty());
}

#[test]
fn composite_unlink_deletes_member_and_is_idempotent() {
    let fx = ModelFixture::new();
    let (store, folders) = store_with_folders(&fx, &["keep", "drop"]);
    let (keep, drop) = (folders[0], folders[1]);
    let unlink = Operation::new()
        .delete(ClasslessDto::new("DomainFileStore", store).with("Folder", Value::id_list([drop])));

    let first = fx.post(&unlink).unwrap();
    assert!(first.revision.is_some());
    assert!(fx.get("Folder", drop).is_none());
    assert_eq!(fx.get("DomainFileStore", store).unwrap().ids("Folder"), vec![keep]);

    let revision = fx.revision();
    let second = fx.post(&unlink).unwrap();
    assert_eq!(second.revision, None);
    assert_eq!(fx.revision(), revision);
}

#[test]
fn delete_of_missing_thing_is_a_no_op() {
    let fx = ModelFixture::new();
    let op = Operation::new().delete(ClasslessDto::new("Folder", Uuid::new_v4()));
    assert_eq!(fx.post(&op).unwrap().revision, None);
}

#[test]
fn non_composite_unlink_removes_only_the_link() {
    let fx = ModelFixture::new();
    let ed = Uuid::new_v4();
    let cat_a = Uuid::new_v4();
    let cat_b = Uuid::new_v4();
    let op = Operation::new()
        .create(element(ed, "sat").with("Category", Value::id_list([cat_a, cat_b])))
        .update(fx.iteration_update().with("Element", Value::id_list([ed])));
    fx.post(&op).unwrap();

    let unlink = Operation::new()
        .delete(ClasslessDto::new("ElementDefinition", ed).with("Category", Value::id_list([cat_a])));
    fx.post(&unlink).unwrap();
    assert_eq!(fx.get("ElementDefinition", ed).unwrap().ids("Category"), vec![cat_b]);

    // Already unlinked
    assert_eq!(fx.post(&unlink).unwrap().revision, None);
}
