use super::{HookContext, OperationSideEffect};
use comet_core::{ClasslessDto, CometError, CometResult, Thing};

const SELECTED_DOMAIN: &str = "SelectedDomain";
const DOMAIN: &str = "Domain";

/// A participant may only select one of its own domains
pub struct ParticipantSideEffect;

impl OperationSideEffect for ParticipantSideEffect {
    fn type_name(&self) -> &str {
        "Participant"
    }

    fn before_update(
        &self,
        thing: &mut Thing,
        _container: Option<&Thing>,
        raw_update: &ClasslessDto,
        _ctx: &mut HookContext<'_>,
    ) -> CometResult<()> {
        let Some(selected) = raw_update.get(SELECTED_DOMAIN) else {
            return Ok(());
        };
        let Some(domain) = selected.as_id().filter(|iid| !iid.is_nil()) else {
            return Err(CometError::side_effect(
                self.type_name(),
                "the selected domain cannot be null",
            ));
        };

        let mut allowed = thing.ids(DOMAIN);
        if let Some(added) = raw_update.get(DOMAIN) {
            allowed.extend(added.ids());
        }
        if !allowed.contains(&domain) {
            return Err(CometError::side_effect(
                self.type_name(),
                format!("domain '{}' is not one of the participant's domains", domain),
            ));
        }
        Ok(())
    }
}
