use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use tracing::debug;

use crate::adapter::ResourceGroupClient;
use crate::diagnostics::Diagnostics;
use crate::error::BuildError;
use crate::keys;
use crate::state::StateBag;
use crate::step::{Step, StepAction, finish, required};

/// Creates the temporary resource group the build deploys into.
///
/// A group that already exists is reused and never deleted. Ownership is
/// tracked through [`keys::RESOURCE_GROUP_CREATED`], which is set before the
/// create call so a request that times out after ARM accepted it is still
/// cleaned up.
pub struct StepCreateResourceGroup {
    client: Arc<dyn ResourceGroupClient>,
    tags: BTreeMap<String, String>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl StepCreateResourceGroup {
    pub fn new(client: Arc<dyn ResourceGroupClient>, tags: BTreeMap<String, String>, diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            client,
            tags,
            diagnostics,
        }
    }

    fn create(&self, state: &mut StateBag) -> Result<(), BuildError> {
        let name = required(state, keys::RESOURCE_GROUP_NAME)?;
        let location = required(state, keys::LOCATION)?;

        let exists = self
            .client
            .resource_group_exists(&name)
            .map_err(|error| BuildError::adapter(format!("check resource group '{name}'"), &error))?;
        if exists {
            self.diagnostics.say(&format!("Using existing resource group '{name}'"));
            return Ok(());
        }

        self.diagnostics.say(&format!("Creating resource group '{name}' in '{location}' ..."));
        state.put(keys::RESOURCE_GROUP_CREATED, true);
        self.client
            .create_resource_group(&name, &location, &self.tags)
            .map_err(|error| BuildError::adapter(format!("create resource group '{name}'"), &error))
    }
}

impl Step for StepCreateResourceGroup {
    fn name(&self) -> &str {
        "create-resource-group"
    }

    fn run(&self, state: &mut StateBag) -> StepAction {
        let result = self.create(state);
        finish(state, self.diagnostics.as_ref(), result)
    }

    fn cleanup(&self, state: &mut StateBag) -> anyhow::Result<()> {
        if state.get_ok(keys::RESOURCE_GROUP_CREATED) != Some(&true) {
            return Ok(());
        }
        let name = state.get(keys::RESOURCE_GROUP_NAME)?.clone();
        let exists = self
            .client
            .resource_group_exists(&name)
            .with_context(|| format!("check resource group '{name}'"))?;
        if exists {
            self.diagnostics.say(&format!("Deleting resource group '{name}' ..."));
            self.client
                .delete_resource_group(&name)
                .with_context(|| format!("delete resource group '{name}'"))?;
        } else {
            debug!(resource_group = %name, "resource group already gone");
        }
        state.put(keys::RESOURCE_GROUP_CREATED, false);
        Ok(())
    }
}
