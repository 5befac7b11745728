//! Revision numbering, history and concurrent writers.

use crate::common::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

#[test]
fn each_request_gets_the_next_revision() {
    let fx = ModelFixture::new();
    let d = fx.add_file_store("D");
    assert_eq!(fx.revision(), 3);

    for (expected, name) in [(4, "one"), (5, "two")] {
        let outcome = fx.post(&Operation::new().update(file_store(d, name))).unwrap();
        assert_eq!(outcome.revision, Some(expected));
    }
    assert_eq!(fx.revision(), 5);
}

#[test]
fn unchanged_update_produces_no_revision() {
    let fx = ModelFixture::new();
    let d = fx.add_file_store("D");
    let outcome = fx.post(&Operation::new().update(file_store(d, "D"))).unwrap();
    assert_eq!(outcome.revision, None);
    assert_eq!(fx.revision(), 3);
}

#[test]
fn history_records_actor_and_snapshots() {
    let fx = ModelFixture::new();
    let d = fx.add_file_store("D");
    let actor = Uuid::new_v4();

    fx.engine
        .post(
            &fx.iteration_partition,
            Some(actor),
            &Operation::new().update(file_store(d, "renamed")),
            None,
        )
        .unwrap();

    let history = fx.engine.get_range(&fx.iteration_partition, d, 0, 10).unwrap();
    let revisions: Vec<i64> = history.iter().map(|record| record.revision).collect();
    assert_eq!(revisions, vec![3, 4]);
    assert_eq!(history[0].actor, None);
    assert_eq!(history[1].actor, Some(actor));
    assert_eq!(history[0].snapshot.get("Name"), Some(&Value::from("D")));
    assert_eq!(history[1].snapshot.get("Name"), Some(&Value::from("renamed")));

    let only_latest = fx.engine.get_range(&fx.iteration_partition, d, 4, 4).unwrap();
    assert_eq!(only_latest.len(), 1);
}

#[test]
fn site_directory_and_models_count_separately() {
    let fx = ModelFixture::new();
    let site = Partition::site_directory();
    let root = Uuid::new_v4();
    assert_eq!(
        fx.engine
            .bootstrap(&site, &Thing::new("SiteDirectory", root))
            .unwrap(),
        1
    );
    fx.add_file_store("D");

    assert_eq!(fx.engine.current_revision(&site), Some(1));
    assert_eq!(fx.revision(), 3);
}

#[test]
fn concurrent_writers_get_distinct_revisions() {
    let fx = Arc::new(ModelFixture::new());
    let d = fx.add_file_store("D");

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let fx = Arc::clone(&fx);
            thread::spawn(move || {
                let f = Uuid::new_v4();
                let op = Operation::new()
                    .create(folder(f, &format!("f{}", i)))
                    .update(ClasslessDto::new("DomainFileStore", d).with("Folder", Value::id_list([f])));
                fx.post(&op).unwrap().revision.unwrap()
            })
        })
        .collect();

    let revisions: BTreeSet<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(revisions, (4..=7).collect());
    assert_eq!(fx.revision(), 7);
    assert_eq!(fx.get("DomainFileStore", d).unwrap().ids("Folder").len(), 4);
}
