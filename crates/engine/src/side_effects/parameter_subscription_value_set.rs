use super::{HookContext, OperationSideEffect};
use comet_core::{CometError, CometResult, Thing};

/// Subscription value sets are owned by their subscription
///
/// They come into existence together with the subscription and go away with
/// it; clients can neither create nor delete them directly.
pub struct ParameterSubscriptionValueSetSideEffect;

impl OperationSideEffect for ParameterSubscriptionValueSetSideEffect {
    fn type_name(&self) -> &str {
        "ParameterSubscriptionValueSet"
    }

    fn before_create(
        &self,
        _thing: &mut Thing,
        _container: &Thing,
        _ctx: &mut HookContext<'_>,
    ) -> CometResult<bool> {
        Ok(false)
    }

    fn before_delete(
        &self,
        _thing: &Thing,
        _container: Option<&Thing>,
        _ctx: &mut HookContext<'_>,
    ) -> CometResult<()> {
        Err(CometError::side_effect(
            self.type_name(),
            "value sets are removed together with their subscription",
        ))
    }
}
