//! Permission checks on writes and read filtering.

use crate::common::*;
use comet::{OperationKind, TypeAccessPolicy};
use std::sync::Arc;

fn fixture(policy: TypeAccessPolicy) -> ModelFixture {
    ModelFixture::with_engine(
        CometEngine::new(ecss_model().unwrap()).with_permissions(Arc::new(policy)),
    )
}

#[test]
fn denied_create_is_forbidden() {
    let fx = fixture(TypeAccessPolicy::new().deny("Folder", OperationKind::Create));
    let d = fx.add_file_store("D");
    let f = Uuid::new_v4();
    let op = Operation::new()
        .create(folder(f, "F"))
        .update(ClasslessDto::new("DomainFileStore", d).with("Folder", Value::id_list([f])));

    let err = fx.post(&op).unwrap_err();
    assert!(err.is_forbidden());
    assert!(matches!(
        err,
        CometError::PermissionDenied { kind: OperationKind::Create, .. }
    ));
    assert!(fx.get("Folder", f).is_none());
}

#[test]
fn denied_update_leaves_thing_unchanged() {
    let fx = fixture(TypeAccessPolicy::new().deny("DomainFileStore", OperationKind::Update));
    let d = fx.add_file_store("D");

    let err = fx
        .post(&Operation::new().update(file_store(d, "renamed")))
        .unwrap_err();
    assert!(err.is_forbidden());
    assert_eq!(
        fx.get("DomainFileStore", d).unwrap().get("Name"),
        Some(&Value::from("D"))
    );
}

#[test]
fn unlink_needs_delete_permission_on_the_owner() {
    let fx = fixture(TypeAccessPolicy::new().deny("ElementDefinition", OperationKind::Delete));
    let ed = Uuid::new_v4();
    let cat = Uuid::new_v4();
    fx.post(
        &Operation::new()
            .create(element(ed, "sat").with("Category", Value::id_list([cat])))
            .update(fx.iteration_update().with("Element", Value::id_list([ed]))),
    )
    .unwrap();

    let unlink = Operation::new()
        .delete(ClasslessDto::new("ElementDefinition", ed).with("Category", Value::id_list([cat])));
    assert!(fx.post(&unlink).unwrap_err().is_forbidden());
    assert_eq!(fx.get("ElementDefinition", ed).unwrap().ids("Category"), vec![cat]);
}

#[test]
fn hidden_types_are_filtered_from_reads() {
    let fx = fixture(TypeAccessPolicy::new().hide("Folder"));
    let d = Uuid::new_v4();
    let f = Uuid::new_v4();
    fx.post(
        &Operation::new()
            .create(file_store(d, "D").with("Folder", Value::id_list([f])))
            .create(folder(f, "F"))
            .update(fx.iteration_update().with("DomainFileStore", Value::id_list([d]))),
    )
    .unwrap();

    let visible = fx.engine.get_since(&fx.iteration_partition, 0).unwrap();
    assert!(visible.iter().any(|thing| thing.iid == d));
    assert!(visible.iter().all(|thing| thing.type_name != "Folder"));
    assert!(fx.get("Folder", f).is_none());
}
