//! Phase ordering and ordered collections.

use crate::common::*;

fn add_options(fx: &ModelFixture, names: &[&str]) -> Vec<Uuid> {
    let ids: Vec<Uuid> = names.iter().map(|_| Uuid::new_v4()).collect();
    let slots: Vec<(i64, Uuid)> = ids.iter().enumerate().map(|(i, iid)| (i as i64 + 1, *iid)).collect();
    let mut op = Operation::new().update(fx.iteration_update().with("Option", ordered_ids(&slots)));
    for (iid, name) in ids.iter().zip(names) {
        op = op.create(option(*iid, name));
    }
    fx.post(&op).unwrap();
    ids
}

fn notes(fx: &ModelFixture, definition: Uuid) -> Vec<String> {
    let thing = fx.get("Definition", definition).unwrap();
    let mut items = thing.ordered("Note");
    items.sort_by_key(|item| item.key);
    items
        .iter()
        .filter_map(|item| item.value.as_text().map(str::to_string))
        .collect()
}

// ============================================================================
// Phase ordering
// ============================================================================

#[test]
fn delete_frees_position_before_create_takes_it() {
    let fx = ModelFixture::new();
    let old = add_options(&fx, &["old"])[0];
    let new = Uuid::new_v4();

    // Payload lists the create first; deletes still run before it
    let op = Operation::new()
        .create(option(new, "new"))
        .update(fx.iteration_update().with("Option", ordered_ids(&[(1, new)])))
        .delete(ClasslessDto::new("Option", old));
    fx.post(&op).unwrap();

    assert!(fx.get("Option", old).is_none());
    let iteration = fx.get("Iteration", fx.iteration).unwrap();
    assert_eq!(ordered_members(&iteration, "Option"), vec![new]);
}

#[test]
fn taken_position_without_delete_aborts() {
    let fx = ModelFixture::new();
    let old = add_options(&fx, &["old"])[0];
    let new = Uuid::new_v4();

    let op = Operation::new()
        .create(option(new, "new"))
        .update(fx.iteration_update().with("Option", ordered_ids(&[(1, new)])));
    let err = fx.post(&op).unwrap_err();
    assert!(err.is_internal(), "unexpected error: {}", err);

    let iteration = fx.get("Iteration", fx.iteration).unwrap();
    assert_eq!(ordered_members(&iteration, "Option"), vec![old]);
    assert!(fx.get("Option", new).is_none());
}

#[test]
fn containers_are_created_before_their_children() {
    let fx = ModelFixture::new();
    let ed = Uuid::new_v4();
    let def = Uuid::new_v4();

    // Child listed ahead of its new container
    let op = Operation::new()
        .create(ClasslessDto::new("Definition", def).with("Content", "A satellite"))
        .create(element(ed, "sat").with("Definition", Value::id_list([def])))
        .update(fx.iteration_update().with("Element", Value::id_list([ed])));
    fx.post(&op).unwrap();

    assert_eq!(fx.get("ElementDefinition", ed).unwrap().ids("Definition"), vec![def]);
}

// ============================================================================
// Ordered collections
// ============================================================================

#[test]
fn move_within_ordered_values() {
    let fx = ModelFixture::new();
    let ed = Uuid::new_v4();
    let def = Uuid::new_v4();
    let initial = Value::OrderedList(vec![
        OrderedItem::new(1, "a"),
        OrderedItem::new(2, "b"),
        OrderedItem::new(3, "c"),
    ]);
    let op = Operation::new()
        .create(element(ed, "sat").with("Definition", Value::id_list([def])))
        .create(
            ClasslessDto::new("Definition", def)
                .with("Content", "A satellite")
                .with("Note", initial),
        )
        .update(fx.iteration_update().with("Element", Value::id_list([ed])));
    fx.post(&op).unwrap();
    assert_eq!(notes(&fx, def), ["a", "b", "c"]);

    let moved = Value::OrderedList(vec![OrderedItem::new(3, "c").moved_to(1)]);
    fx.post(&Operation::new().update(ClasslessDto::new("Definition", def).with("Note", moved)))
        .unwrap();
    assert_eq!(notes(&fx, def), ["c", "a", "b"]);
}

#[test]
fn ordered_values_append_new_entries() {
    let fx = ModelFixture::new();
    let ed = Uuid::new_v4();
    let def = Uuid::new_v4();
    let op = Operation::new()
        .create(element(ed, "sat").with("Definition", Value::id_list([def])))
        .create(
            ClasslessDto::new("Definition", def)
                .with("Content", "A satellite")
                .with("Note", Value::OrderedList(vec![OrderedItem::new(1, "a")])),
        )
        .update(fx.iteration_update().with("Element", Value::id_list([ed])));
    fx.post(&op).unwrap();

    let added = Value::OrderedList(vec![OrderedItem::new(2, "b")]);
    fx.post(&Operation::new().update(ClasslessDto::new("Definition", def).with("Note", added)))
        .unwrap();
    assert_eq!(notes(&fx, def), ["a", "b"]);
}

#[test]
fn move_within_ordered_containment() {
    let fx = ModelFixture::new();
    let ids = add_options(&fx, &["a", "b", "c"]);

    let moved = Value::OrderedList(vec![OrderedItem::new(3, ids[2]).moved_to(1)]);
    fx.post(&Operation::new().update(fx.iteration_update().with("Option", moved)))
        .unwrap();

    let iteration = fx.get("Iteration", fx.iteration).unwrap();
    assert_eq!(ordered_members(&iteration, "Option"), vec![ids[2], ids[0], ids[1]]);
}

#[test]
fn move_of_option_deleted_in_same_batch_is_skipped() {
    let fx = ModelFixture::new();
    let ids = add_options(&fx, &["a", "b"]);

    let moved = Value::OrderedList(vec![OrderedItem::new(2, ids[1]).moved_to(1)]);
    let op = Operation::new()
        .delete(ClasslessDto::new("Option", ids[1]))
        .update(fx.iteration_update().with("Option", moved));
    fx.post(&op).unwrap();

    assert!(fx.get("Option", ids[1]).is_none());
    let iteration = fx.get("Iteration", fx.iteration).unwrap();
    assert_eq!(ordered_members(&iteration, "Option"), vec![ids[0]]);
}
