use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::adapter::{DeploymentClient, DeploymentTemplate};
use crate::config::{BuildConfig, ImageReference};
use crate::diagnostics::Diagnostics;
use crate::error::BuildError;
use crate::keys;
use crate::state::StateBag;
use crate::step::{Step, StepAction, finish, required};

/// Parameter values for the VM template, minus the per-run VM name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentParameters {
    pub vm_size: String,
    pub admin_username: String,
    pub admin_password: String,
    pub storage_account: String,
    pub storage_container: String,
    pub image: ImageReference,
}

impl DeploymentParameters {
    pub fn from_config(config: &BuildConfig) -> Self {
        Self {
            vm_size: config.vm_size.clone(),
            admin_username: config.admin_username.clone(),
            admin_password: config.admin_password.clone().unwrap_or_default(),
            storage_account: config.storage_account.clone(),
            storage_container: config.storage_container.clone(),
            image: config.image.clone(),
        }
    }

    /// ARM parameter object (`{"name": {"value": ...}}`) for `vm_name`.
    pub fn to_arm(&self, vm_name: &str) -> Value {
        let values = [
            ("vmName", vm_name),
            ("vmSize", self.vm_size.as_str()),
            ("adminUsername", self.admin_username.as_str()),
            ("adminPassword", self.admin_password.as_str()),
            ("storageAccountName", self.storage_account.as_str()),
            ("storageContainerName", self.storage_container.as_str()),
            ("imagePublisher", self.image.publisher.as_str()),
            ("imageOffer", self.image.offer.as_str()),
            ("imageSku", self.image.sku.as_str()),
            ("imageVersion", self.image.version.as_str()),
        ];
        let parameters: Map<String, Value> = values
            .into_iter()
            .map(|(name, value)| (name.to_string(), json!({ "value": value })))
            .collect();
        Value::Object(parameters)
    }
}

/// Deploys the VM template into the build's resource group and waits for the
/// deployment to settle.
///
/// Anything the deployment provisions lives in the resource group, so the
/// unwind of [`StepCreateResourceGroup`](super::StepCreateResourceGroup)
/// removes it; this step has no compensating action of its own.
pub struct StepDeployTemplate {
    client: Arc<dyn DeploymentClient>,
    template: Value,
    parameters: DeploymentParameters,
    diagnostics: Arc<dyn Diagnostics>,
}

impl StepDeployTemplate {
    pub fn new(
        client: Arc<dyn DeploymentClient>,
        template: Value,
        parameters: DeploymentParameters,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        Self {
            client,
            template,
            parameters,
            diagnostics,
        }
    }

    fn deploy(&self, state: &mut StateBag) -> Result<(), BuildError> {
        let resource_group = required(state, keys::RESOURCE_GROUP_NAME)?;
        let deployment = required(state, keys::DEPLOYMENT_NAME)?;
        let compute_name = required(state, keys::COMPUTE_NAME)?;

        self.diagnostics.say(&format!(
            "Deploying '{deployment}' into resource group '{resource_group}' ..."
        ));
        let template = DeploymentTemplate {
            template: self.template.clone(),
            parameters: self.parameters.to_arm(&compute_name),
        };
        self.client
            .deploy(&resource_group, &deployment, &template)
            .map_err(|error| BuildError::adapter(format!("deploy '{deployment}'"), &error))
    }
}

impl Step for StepDeployTemplate {
    fn name(&self) -> &str {
        "deploy-template"
    }

    fn run(&self, state: &mut StateBag) -> StepAction {
        let result = self.deploy(state);
        finish(state, self.diagnostics.as_ref(), result)
    }

    fn requires_cleanup(&self) -> bool {
        false
    }
}
