use std::sync::Arc;

use crate::adapter::ResourceGroupClient;
use crate::diagnostics::Diagnostics;
use crate::error::BuildError;
use crate::keys;
use crate::state::StateBag;
use crate::step::{Step, StepAction, finish, required};

/// Tears down the build's resource group once the image is captured.
///
/// Only groups this run created are deleted. Clearing
/// [`keys::RESOURCE_GROUP_CREATED`] afterwards keeps a later unwind from
/// deleting the group a second time.
pub struct StepDeleteResourceGroup {
    client: Arc<dyn ResourceGroupClient>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl StepDeleteResourceGroup {
    pub fn new(client: Arc<dyn ResourceGroupClient>, diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self { client, diagnostics }
    }

    fn delete(&self, state: &mut StateBag) -> Result<(), BuildError> {
        let name = required(state, keys::RESOURCE_GROUP_NAME)?;
        if state.get_ok(keys::RESOURCE_GROUP_CREATED) != Some(&true) {
            self.diagnostics.say(&format!("Leaving resource group '{name}' in place"));
            return Ok(());
        }

        self.diagnostics.say(&format!("Deleting resource group '{name}' ..."));
        self.client
            .delete_resource_group(&name)
            .map_err(|error| BuildError::adapter(format!("delete resource group '{name}'"), &error))?;
        state.put(keys::RESOURCE_GROUP_CREATED, false);
        Ok(())
    }
}

impl Step for StepDeleteResourceGroup {
    fn name(&self) -> &str {
        "delete-resource-group"
    }

    fn run(&self, state: &mut StateBag) -> StepAction {
        let result = self.delete(state);
        finish(state, self.diagnostics.as_ref(), result)
    }

    fn requires_cleanup(&self) -> bool {
        false
    }
}
