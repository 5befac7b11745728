//! Atomicity: a request commits completely or not at all.

use crate::common::*;
use comet::revision::{begin_revision, save_revisions};
use comet::{ContainerInfo, HookContext, OperationSideEffect, SideEffectRegistry, ThingStore};
use std::sync::Arc;

struct VetoOptions;

impl OperationSideEffect for VetoOptions {
    fn type_name(&self) -> &str {
        "Option"
    }

    fn before_create(
        &self,
        _thing: &mut Thing,
        _container: &Thing,
        _ctx: &mut HookContext<'_>,
    ) -> CometResult<bool> {
        Ok(false)
    }
}

// ============================================================================
// All or nothing
// ============================================================================

#[test]
fn unresolved_reference_rolls_back_whole_batch() {
    let fx = ModelFixture::new();
    let ed = Uuid::new_v4();
    let op = Operation::new().create(element(ed, "sat")).update(
        fx.iteration_update()
            .with("Element", Value::id_list([ed]))
            .with("TopElement", Uuid::new_v4()),
    );

    let err = fx.post(&op).unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {}", err);
    assert!(matches!(err, CometError::ContainerNotFound { ref type_name, .. } if type_name == "ElementDefinition"));

    assert!(fx.get("ElementDefinition", ed).is_none());
    let iteration = fx.get("Iteration", fx.iteration).unwrap();
    assert!(iteration.ids("Element").is_empty());
    assert_eq!(fx.revision(), 2);
}

#[test]
fn reference_to_thing_created_in_same_batch_resolves() {
    let fx = ModelFixture::new();
    let ed = Uuid::new_v4();
    let op = Operation::new().create(element(ed, "sat")).update(
        fx.iteration_update()
            .with("Element", Value::id_list([ed]))
            .with("TopElement", ed),
    );

    let outcome = fx.post(&op).unwrap();
    assert_eq!(outcome.revision, Some(3));
    let iteration = fx.get("Iteration", fx.iteration).unwrap();
    assert_eq!(iteration.get("TopElement"), Some(&Value::Id(ed)));
}

#[test]
fn vetoed_create_discards_earlier_writes() {
    let mut hooks = SideEffectRegistry::with_builtin();
    hooks.register(Arc::new(VetoOptions)).unwrap();
    let fx = ModelFixture::with_engine(
        CometEngine::new(ecss_model().unwrap()).with_side_effects(hooks),
    );

    let ed = Uuid::new_v4();
    let opt = Uuid::new_v4();
    let op = Operation::new()
        .create(element(ed, "sat"))
        .create(option(opt, "baseline"))
        .update(
            fx.iteration_update()
                .with("Element", Value::id_list([ed]))
                .with("Option", ordered_ids(&[(1, opt)])),
        );

    let err = fx.post(&op).unwrap_err();
    assert!(matches!(err, CometError::HookVetoed { iid, .. } if iid == opt));
    assert!(fx.get("ElementDefinition", ed).is_none());
    assert!(fx.get("Option", opt).is_none());
    assert_eq!(fx.revision(), 2);
}

#[test]
fn aborted_requests_are_counted() {
    let fx = ModelFixture::new();
    let before = fx.engine.metrics();

    let orphan = Operation::new().create(folder(Uuid::new_v4(), "loose"));
    assert!(fx.post(&orphan).is_err());

    let metrics = fx.engine.metrics();
    assert_eq!(metrics.total_aborted, before.total_aborted + 1);
    assert_eq!(metrics.total_committed, before.total_committed);
    assert_eq!(metrics.active_count, 0);
}

// ============================================================================
// Built-in hooks
// ============================================================================

/// Element, parameter and subscription ids of a seeded subscription chain
struct Subscription {
    element: Uuid,
    definition: Uuid,
    value_set: Uuid,
}

/// Write a subscription with one value set straight through the store
fn seed_subscription(fx: &ModelFixture) -> Subscription {
    let ids = Subscription {
        element: Uuid::new_v4(),
        definition: Uuid::new_v4(),
        value_set: Uuid::new_v4(),
    };
    let parameter = Uuid::new_v4();
    let subscription = Uuid::new_v4();
    let partition = fx.iteration_partition.clone();

    fx.engine
        .transaction(&partition, |txn| {
            let revision = begin_revision(txn, &partition)?;
            let chain = [
                (
                    Thing::new("ElementDefinition", ids.element)
                        .with("Name", "SAT")
                        .with("ShortName", "sat"),
                    ContainerInfo::new("Iteration", fx.iteration),
                ),
                (
                    Thing::new("Definition", ids.definition).with("Content", "A satellite"),
                    ContainerInfo::new("ElementDefinition", ids.element),
                ),
                (
                    Thing::new("Parameter", parameter).with("ParameterType", Uuid::new_v4()),
                    ContainerInfo::new("ElementDefinition", ids.element),
                ),
                (
                    Thing::new("ParameterSubscription", subscription),
                    ContainerInfo::new("Parameter", parameter),
                ),
                (
                    Thing::new("ParameterSubscriptionValueSet", ids.value_set),
                    ContainerInfo::new("ParameterSubscription", subscription),
                ),
            ];
            for (thing, container) in &chain {
                assert!(txn.create(&partition, thing, Some(container))?);
            }
            save_revisions(txn, &partition, None, revision)?;
            Ok(())
        })
        .unwrap();
    ids
}

#[test]
fn subscription_value_set_create_is_vetoed() {
    let fx = ModelFixture::new();
    let (ed, parameter, subscription, value_set) =
        (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let op = Operation::new()
        .create(element(ed, "sat").with("Parameter", Value::id_list([parameter])))
        .create(
            ClasslessDto::new("Parameter", parameter)
                .with("ParameterType", Uuid::new_v4())
                .with("ParameterSubscription", Value::id_list([subscription])),
        )
        .create(
            ClasslessDto::new("ParameterSubscription", subscription)
                .with("ValueSet", Value::id_list([value_set])),
        )
        .create(ClasslessDto::new("ParameterSubscriptionValueSet", value_set))
        .update(fx.iteration_update().with("Element", Value::id_list([ed])));

    let err = fx.post(&op).unwrap_err();
    assert!(matches!(err, CometError::HookVetoed { iid, .. } if iid == value_set));
    assert!(fx.get("ElementDefinition", ed).is_none());
    assert!(fx.get("ParameterSubscription", subscription).is_none());
    assert_eq!(fx.revision(), 2);
}

#[test]
fn subscription_value_set_delete_rolls_back_batch() {
    let fx = ModelFixture::new();
    let seeded = seed_subscription(&fx);
    assert_eq!(fx.revision(), 3);

    let op = Operation::new()
        .delete(ClasslessDto::new("Definition", seeded.definition))
        .delete(ClasslessDto::new("ParameterSubscriptionValueSet", seeded.value_set))
        .update(ClasslessDto::new("ElementDefinition", seeded.element).with("Name", "RENAMED"));

    let err = fx.post(&op).unwrap_err();
    assert!(matches!(err, CometError::SideEffect { ref type_name, .. } if type_name == "ParameterSubscriptionValueSet"));
    assert!(fx.get("Definition", seeded.definition).is_some());
    assert!(fx.get("ParameterSubscriptionValueSet", seeded.value_set).is_some());
    let element = fx.get("ElementDefinition", seeded.element).unwrap();
    assert_eq!(element.get("Name"), Some(&Value::from("SAT")));
    assert_eq!(fx.revision(), 3);
}

// ============================================================================
// Revision cohesion
// ============================================================================

#[test]
fn folder_and_new_file_store_share_one_revision() {
    let fx = ModelFixture::new();
    let d1 = Uuid::new_v4();
    let f1 = Uuid::new_v4();
    let op = Operation::new()
        .create(file_store(d1, "D1").with("Folder", Value::id_list([f1])))
        .create(folder(f1, "F1"))
        .update(fx.iteration_update().with("DomainFileStore", Value::id_list([d1])));

    let outcome = fx.post(&op).unwrap();
    assert_eq!(outcome.revision, Some(3));
    assert!(outcome.changed.iter().all(|thing| thing.revision_number == 3));

    let store = fx.get("DomainFileStore", d1).unwrap();
    let folder = fx.get("Folder", f1).unwrap();
    assert_eq!(store.revision_number, 3);
    assert_eq!(folder.revision_number, 3);
    assert_eq!(store.ids("Folder"), vec![f1]);

    let mut changed: Vec<Uuid> = fx
        .engine
        .get_since(&fx.iteration_partition, 2)
        .unwrap()
        .iter()
        .map(|thing| thing.iid)
        .collect();
    changed.sort();
    let mut expected = vec![d1, f1];
    expected.sort();
    assert_eq!(changed, expected);

    let model_side = fx.engine.get_since(&fx.model_partition, 2).unwrap();
    assert_eq!(model_side.len(), 1);
    assert_eq!(model_side[0].iid, fx.iteration);
}

#[test]
fn folder_created_in_persisted_file_store_shares_its_revision() {
    let fx = ModelFixture::new();
    let d1 = fx.add_file_store("D1");
    let f1 = Uuid::new_v4();
    let op = Operation::new()
        .create(folder(f1, "F1"))
        .update(ClasslessDto::new("DomainFileStore", d1).with("Folder", Value::id_list([f1])));

    let outcome = fx.post(&op).unwrap();
    assert_eq!(outcome.revision, Some(4));

    let store = fx.get("DomainFileStore", d1).unwrap();
    let folder = fx.get("Folder", f1).unwrap();
    assert_eq!(store.ids("Folder"), vec![f1]);
    assert_eq!(store.revision_number, 4);
    assert_eq!(folder.revision_number, 4);
}

#[test]
fn unknown_top_element_leaves_iteration_unchanged() {
    let fx = ModelFixture::new();
    let before = fx.get("Iteration", fx.iteration).unwrap();
    let op = Operation::new().update(fx.iteration_update().with("TopElement", Uuid::new_v4()));

    let err = fx.post(&op).unwrap_err();
    assert!(matches!(err, CometError::ContainerNotFound { .. }));
    assert_eq!(fx.get("Iteration", fx.iteration).unwrap(), before);
    assert_eq!(fx.revision(), 2);
}
