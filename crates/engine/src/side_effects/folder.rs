use super::{HookContext, OperationSideEffect};
use comet_core::{ClasslessDto, CometError, CometResult, Iid, Thing, Value};
use std::collections::HashSet;

const CONTAINING_FOLDER: &str = "ContainingFolder";

/// Folders form a tree: `ContainingFolder` may not lead back to the folder
pub struct FolderSideEffect;

impl FolderSideEffect {
    fn check_chain(&self, folder: Iid, start: Iid, ctx: &HookContext<'_>) -> CometResult<()> {
        let mut visited = HashSet::new();
        let mut next = Some(start);
        while let Some(current) = next {
            if current == folder {
                return Err(CometError::side_effect(
                    self.type_name(),
                    format!("folder '{}' cannot be contained in itself", folder),
                ));
            }
            if !visited.insert(current) {
                break;
            }
            next = ctx
                .store
                .read(ctx.partition, self.type_name(), Some(&[current]))?
                .into_iter()
                .next()
                .and_then(|record| record.thing.get(CONTAINING_FOLDER).and_then(Value::as_id));
        }
        Ok(())
    }
}

impl OperationSideEffect for FolderSideEffect {
    fn type_name(&self) -> &str {
        "Folder"
    }

    fn before_create(
        &self,
        thing: &mut Thing,
        _container: &Thing,
        ctx: &mut HookContext<'_>,
    ) -> CometResult<bool> {
        if let Some(parent) = thing.get(CONTAINING_FOLDER).and_then(Value::as_id) {
            self.check_chain(thing.iid, parent, ctx)?;
        }
        Ok(true)
    }

    fn before_update(
        &self,
        thing: &mut Thing,
        _container: Option<&Thing>,
        raw_update: &ClasslessDto,
        ctx: &mut HookContext<'_>,
    ) -> CometResult<()> {
        if let Some(parent) = raw_update.get(CONTAINING_FOLDER).and_then(Value::as_id) {
            self.check_chain(thing.iid, parent, ctx)?;
        }
        Ok(())
    }
}
