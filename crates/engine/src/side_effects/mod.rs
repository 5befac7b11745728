//! Per-type side-effect hooks
//!
//! ## Design Principle
//!
//! Type-specific rules live in hooks, not in the processor. The processor
//! calls the six lifecycle hooks (before/after create, update, delete) for
//! every thing it writes, and `validate_property` for every property of a
//! created thing. Each hook receives the active transaction, so it can read
//! state or write further changes that share the request's revision.
//!
//! ## Dispatch
//!
//! [`SideEffectRegistry`] maps a concrete type name to at most one
//! [`OperationSideEffect`]. Types without a hook get the default behavior:
//! every check passes and `before_create` allows the create.
//!
//! ## Failure
//!
//! A hook that returns an error aborts the whole batch. `before_create`
//! returning `Ok(false)` vetoes the create, which also aborts the batch.

mod folder;
mod parameter_subscription_value_set;
mod participant;

pub use folder::FolderSideEffect;
pub use parameter_subscription_value_set::ParameterSubscriptionValueSetSideEffect;
pub use participant::ParticipantSideEffect;

use comet_core::{
    ClasslessDto, CometError, CometResult, MetaInfoProvider, Partition, Thing, ThingStore,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// What a hook can reach while it runs
pub struct HookContext<'a> {
    /// Active transaction
    pub store: &'a mut dyn ThingStore,
    /// Partition of the thing the hook runs for
    pub partition: &'a Partition,
    /// Type metadata
    pub meta: &'a dyn MetaInfoProvider,
}

/// Lifecycle hooks of one concrete type
///
/// Every method has a no-op default; implement only what the type needs.
#[allow(unused_variables)]
pub trait OperationSideEffect: Send + Sync {
    /// Concrete type the hook is registered for
    fn type_name(&self) -> &str;

    /// Extra validation of one property of a thing about to be created
    fn validate_property(&self, thing: &Thing, property: &str) -> CometResult<()> {
        Ok(())
    }

    /// Runs before a create; `Ok(false)` vetoes it
    fn before_create(
        &self,
        thing: &mut Thing,
        container: &Thing,
        ctx: &mut HookContext<'_>,
    ) -> CometResult<bool> {
        Ok(true)
    }

    /// Runs after a create with the persisted thing and the pre-hook snapshot
    fn after_create(
        &self,
        thing: &Thing,
        container: &Thing,
        original: &Thing,
        ctx: &mut HookContext<'_>,
    ) -> CometResult<()> {
        Ok(())
    }

    /// Runs before an update with the raw update bag
    fn before_update(
        &self,
        thing: &mut Thing,
        container: Option<&Thing>,
        raw_update: &ClasslessDto,
        ctx: &mut HookContext<'_>,
    ) -> CometResult<()> {
        Ok(())
    }

    /// Runs after an update that changed something
    fn after_update(
        &self,
        thing: &Thing,
        container: Option<&Thing>,
        original: &Thing,
        ctx: &mut HookContext<'_>,
    ) -> CometResult<()> {
        Ok(())
    }

    /// Runs before a full delete
    fn before_delete(
        &self,
        thing: &Thing,
        container: Option<&Thing>,
        ctx: &mut HookContext<'_>,
    ) -> CometResult<()> {
        Ok(())
    }

    /// Runs after a full delete with the pre-delete snapshot
    fn after_delete(
        &self,
        thing: &Thing,
        container: Option<&Thing>,
        original: &Thing,
        ctx: &mut HookContext<'_>,
    ) -> CometResult<()> {
        Ok(())
    }
}

/// Hook registry keyed by concrete type name
#[derive(Default, Clone)]
pub struct SideEffectRegistry {
    hooks: HashMap<String, Arc<dyn OperationSideEffect>>,
}

impl SideEffectRegistry {
    /// Registry without hooks
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in hooks
    pub fn with_builtin() -> Self {
        let mut hooks: HashMap<String, Arc<dyn OperationSideEffect>> = HashMap::new();
        let builtin: [Arc<dyn OperationSideEffect>; 3] = [
            Arc::new(FolderSideEffect),
            Arc::new(ParameterSubscriptionValueSetSideEffect),
            Arc::new(ParticipantSideEffect),
        ];
        for hook in builtin {
            hooks.insert(hook.type_name().to_string(), hook);
        }
        SideEffectRegistry { hooks }
    }

    /// Register a hook
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the type already has a hook.
    pub fn register(&mut self, hook: Arc<dyn OperationSideEffect>) -> CometResult<()> {
        let type_name = hook.type_name().to_string();
        if self.hooks.contains_key(&type_name) {
            return Err(CometError::configuration(format!(
                "a side effect for '{}' is already registered",
                type_name
            )));
        }
        self.hooks.insert(type_name, hook);
        Ok(())
    }

    /// Hook of a type, if any
    pub fn get(&self, type_name: &str) -> Option<&Arc<dyn OperationSideEffect>> {
        self.hooks.get(type_name)
    }

    /// Number of registered hooks
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// True if no hook is registered
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub(crate) fn validate_property(&self, thing: &Thing, property: &str) -> CometResult<()> {
        match self.get(&thing.type_name) {
            Some(hook) => hook.validate_property(thing, property),
            None => Ok(()),
        }
    }

    pub(crate) fn before_create(
        &self,
        thing: &mut Thing,
        container: &Thing,
        ctx: &mut HookContext<'_>,
    ) -> CometResult<bool> {
        match self.get(&thing.type_name) {
            Some(hook) => {
                trace!(target: "comet::operation", thing = %thing.key(), "BeforeCreate");
                hook.before_create(thing, container, ctx)
            }
            None => Ok(true),
        }
    }

    pub(crate) fn after_create(
        &self,
        thing: &Thing,
        container: &Thing,
        original: &Thing,
        ctx: &mut HookContext<'_>,
    ) -> CometResult<()> {
        match self.get(&thing.type_name) {
            Some(hook) => hook.after_create(thing, container, original, ctx),
            None => Ok(()),
        }
    }

    pub(crate) fn before_update(
        &self,
        thing: &mut Thing,
        container: Option<&Thing>,
        raw_update: &ClasslessDto,
        ctx: &mut HookContext<'_>,
    ) -> CometResult<()> {
        match self.get(&thing.type_name) {
            Some(hook) => {
                trace!(target: "comet::operation", thing = %thing.key(), "BeforeUpdate");
                hook.before_update(thing, container, raw_update, ctx)
            }
            None => Ok(()),
        }
    }

    pub(crate) fn after_update(
        &self,
        thing: &Thing,
        container: Option<&Thing>,
        original: &Thing,
        ctx: &mut HookContext<'_>,
    ) -> CometResult<()> {
        match self.get(&thing.type_name) {
            Some(hook) => hook.after_update(thing, container, original, ctx),
            None => Ok(()),
        }
    }

    pub(crate) fn before_delete(
        &self,
        thing: &Thing,
        container: Option<&Thing>,
        ctx: &mut HookContext<'_>,
    ) -> CometResult<()> {
        match self.get(&thing.type_name) {
            Some(hook) => {
                trace!(target: "comet::operation", thing = %thing.key(), "BeforeDelete");
                hook.before_delete(thing, container, ctx)
            }
            None => Ok(()),
        }
    }

    pub(crate) fn after_delete(
        &self,
        thing: &Thing,
        container: Option<&Thing>,
        original: &Thing,
        ctx: &mut HookContext<'_>,
    ) -> CometResult<()> {
        match self.get(&thing.type_name) {
            Some(hook) => hook.after_delete(thing, container, original, ctx),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for SideEffectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.hooks.keys().collect();
        types.sort();
        f.debug_struct("SideEffectRegistry").field("types", &types).finish()
    }
}
