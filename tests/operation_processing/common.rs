//! Shared fixtures for the operation processing suite.

#![allow(dead_code)]

use std::sync::Once;

pub use comet::{
    ecss_model, ClasslessDto, CometEngine, CometError, CometResult, MetaInfoProvider, Operation,
    OrderedItem, Partition, PostOutcome, Thing, Value,
};
pub use uuid::Uuid;

static INIT_TRACING: Once = Once::new();

/// Route engine logs to the test harness output
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

// ============================================================================
// ModelFixture - an engineering model with one iteration
// ============================================================================

/// An engineering model at revision 2: the model itself, then one iteration.
pub struct ModelFixture {
    pub engine: CometEngine,
    pub model: Uuid,
    pub iteration: Uuid,
    pub model_partition: Partition,
    pub iteration_partition: Partition,
}

impl ModelFixture {
    /// Fixture with the default engine
    pub fn new() -> Self {
        Self::with_engine(CometEngine::new(ecss_model().unwrap()))
    }

    /// Fixture over a preconfigured engine
    pub fn with_engine(engine: CometEngine) -> Self {
        init_tracing();
        let model = Uuid::new_v4();
        let iteration = Uuid::new_v4();
        let model_partition = Partition::engineering_model(model);
        let iteration_partition = model_partition.iteration();

        engine
            .bootstrap(&model_partition, &Thing::new("EngineeringModel", model))
            .unwrap();
        let op = Operation::new()
            .create(ClasslessDto::new("Iteration", iteration).with("IterationNumber", 1i64))
            .update(
                ClasslessDto::new("EngineeringModel", model)
                    .with("Iteration", Value::id_list([iteration])),
            );
        let outcome = engine.post(&model_partition, None, &op, None).unwrap();
        assert_eq!(outcome.revision, Some(2));

        ModelFixture {
            engine,
            model,
            iteration,
            model_partition,
            iteration_partition,
        }
    }

    /// Post to the iteration partition
    pub fn post(&self, op: &Operation) -> CometResult<PostOutcome> {
        self.engine.post(&self.iteration_partition, None, op, None)
    }

    /// Update bag for the iteration
    pub fn iteration_update(&self) -> ClasslessDto {
        ClasslessDto::new("Iteration", self.iteration)
    }

    /// Partition a type lives in
    pub fn partition_of(&self, type_name: &str) -> Partition {
        let meta = self.engine.processor().meta();
        self.iteration_partition
            .for_type(meta.is_iteration_scoped(type_name))
    }

    /// Current state of one thing
    pub fn get(&self, type_name: &str, iid: Uuid) -> Option<Thing> {
        self.engine
            .read(&self.partition_of(type_name), type_name, Some(&[iid]))
            .unwrap()
            .into_iter()
            .next()
    }

    /// Latest committed revision of the model
    pub fn revision(&self) -> i64 {
        self.engine
            .current_revision(&self.model_partition)
            .unwrap_or(0)
    }

    /// Create a domain file store in the iteration, returning its id
    pub fn add_file_store(&self, name: &str) -> Uuid {
        let store = Uuid::new_v4();
        let op = Operation::new()
            .create(file_store(store, name))
            .update(self.iteration_update().with("DomainFileStore", Value::id_list([store])));
        self.post(&op).unwrap();
        store
    }
}

// ============================================================================
// Payload builders
// ============================================================================

pub fn file_store(iid: Uuid, name: &str) -> ClasslessDto {
    ClasslessDto::new("DomainFileStore", iid).with("Name", name)
}

pub fn folder(iid: Uuid, name: &str) -> ClasslessDto {
    ClasslessDto::new("Folder", iid).with("Name", name)
}

pub fn element(iid: Uuid, short_name: &str) -> ClasslessDto {
    ClasslessDto::new("ElementDefinition", iid)
        .with("Name", short_name.to_uppercase())
        .with("ShortName", short_name)
}

pub fn option(iid: Uuid, short_name: &str) -> ClasslessDto {
    ClasslessDto::new("Option", iid)
        .with("Name", short_name.to_uppercase())
        .with("ShortName", short_name)
}

pub fn ordered_ids(items: &[(i64, Uuid)]) -> Value {
    Value::OrderedList(
        items
            .iter()
            .map(|(key, iid)| OrderedItem::new(*key, *iid))
            .collect(),
    )
}

/// Ids of an ordered collection in position order
pub fn ordered_members(thing: &Thing, property: &str) -> Vec<Uuid> {
    let mut items = thing.ordered(property);
    items.sort_by_key(|item| item.key);
    items.iter().filter_map(|item| item.value.as_id()).collect()
}
