//! Revision tracking
//!
//! One revision number per write transaction and revision scope:
//! - [`begin_revision`] reads the high-water mark and stamps the transaction
//!   with the next number
//! - [`save_revisions`] snapshots every thing that carries that number and
//!   advances the high-water mark
//!
//! A transaction that changed nothing saves nothing, so the high-water mark
//! only ever names revisions that exist.

use comet_core::{CometResult, Iid, Partition, RevisionRecord, RevisionStore, RevisionView, Thing};
use chrono::Utc;
use tracing::debug;

/// Stamp the transaction with the next revision of `partition`'s scope
///
/// Returns the high-water mark plus one; an untouched scope starts at 1.
pub fn begin_revision<S>(store: &mut S, partition: &Partition) -> CometResult<i64>
where
    S: RevisionStore + ?Sized,
{
    let revision = store.revision_high_water(partition)?.unwrap_or(0) + 1;
    store.set_transaction_revision(revision)?;
    debug!(target: "comet::revision", partition = %partition, revision, "Revision started");
    Ok(revision)
}

/// Record a snapshot of everything the transaction changed
///
/// Returns the changed things with their partitions.
pub fn save_revisions<S>(
    store: &mut S,
    partition: &Partition,
    actor: Option<Iid>,
    revision: i64,
) -> CometResult<Vec<(Partition, Thing)>>
where
    S: RevisionStore + ?Sized,
{
    let changed = store.changed_things(partition, revision)?;
    if changed.is_empty() {
        debug!(target: "comet::revision", partition = %partition, revision, "Nothing changed, revision discarded");
        return Ok(changed);
    }

    let timestamp = Utc::now();
    let records = changed
        .iter()
        .map(|(owner, thing)| RevisionRecord {
            partition: owner.clone(),
            iid: thing.iid,
            type_name: thing.type_name.clone(),
            revision,
            actor,
            timestamp,
            snapshot: thing.clone(),
        })
        .collect();
    store.append_revisions(records)?;
    store.set_revision_high_water(partition, revision)?;
    debug!(
        target: "comet::revision",
        partition = %partition,
        revision,
        things = changed.len(),
        "Revision saved"
    );
    Ok(changed)
}

/// Committed things in `partition` changed after `revision`
pub fn get_since<V>(view: &V, partition: &Partition, revision: i64) -> CometResult<Vec<Thing>>
where
    V: RevisionView + ?Sized,
{
    view.things_since(partition, revision)
}

/// Committed snapshots of one thing between two revisions, inclusive
pub fn get_range<V>(
    view: &V,
    partition: &Partition,
    iid: Iid,
    from: i64,
    to: i64,
) -> CometResult<Vec<RevisionRecord>>
where
    V: RevisionView + ?Sized,
{
    view.revision_history(partition, iid, from, to)
}
