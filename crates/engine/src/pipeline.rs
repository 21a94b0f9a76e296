//! Assembly of the standard image build.
//!
//! A build runs `create-resource-group → deploy-template → query-vm →
//! capture-image → delete-resource-group`. Everything the steps need per run
//! is seeded into the initial [`StateBag`]; everything else is injected at
//! construction.

use std::sync::Arc;

use imagesmith_util::ResourceNames;
use serde::Serialize;
use tracing::info;

use crate::adapter::{ArmCloudClient, CaptureSettings, DeploymentClient, ImageCaptureClient, ResourceGroupClient, VirtualMachineQuery};
use crate::config::{BuildConfig, ConfigError};
use crate::diagnostics::Diagnostics;
use crate::error::BuildError;
use crate::keys;
use crate::runner::{CancellationToken, RunReport, Runner};
use crate::state::StateBag;
use crate::step::Step;
use crate::steps::{
    DeploymentParameters, StepCaptureImage, StepCreateResourceGroup, StepDeleteResourceGroup, StepDeployTemplate, StepQueryVm,
};

/// The cloud capabilities a build uses, one handle per concern.
#[derive(Clone)]
pub struct PipelineClients {
    pub virtual_machines: Arc<dyn VirtualMachineQuery>,
    pub resource_groups: Arc<dyn ResourceGroupClient>,
    pub deployments: Arc<dyn DeploymentClient>,
    pub capture: Arc<dyn ImageCaptureClient>,
}

impl PipelineClients {
    /// Uses one client for every concern.
    pub fn shared<C>(client: Arc<C>) -> Self
    where
        C: VirtualMachineQuery + ResourceGroupClient + DeploymentClient + ImageCaptureClient + 'static,
    {
        Self {
            virtual_machines: client.clone(),
            resource_groups: client.clone(),
            deployments: client.clone(),
            capture: client,
        }
    }

    pub fn from_arm(client: ArmCloudClient) -> Self {
        Self::shared(Arc::new(client))
    }
}

pub struct Pipeline {
    runner: Runner,
    names: ResourceNames,
    location: String,
}

impl Pipeline {
    /// Builds the standard step list for `config`. Resource names missing from
    /// the config are generated from the current time.
    pub fn from_config(config: &BuildConfig, clients: PipelineClients, diagnostics: Arc<dyn Diagnostics>) -> Result<Self, ConfigError> {
        let names = config.resource_names(ResourceNames::generate());
        let template = config.template()?;
        let capture = CaptureSettings {
            vhd_prefix: config.capture_name_prefix.clone(),
            container: config.storage_container.clone(),
        };

        let steps: Vec<Box<dyn Step>> = vec![
            Box::new(StepCreateResourceGroup::new(
                clients.resource_groups.clone(),
                config.tags.clone(),
                diagnostics.clone(),
            )),
            Box::new(StepDeployTemplate::new(
                clients.deployments,
                template,
                DeploymentParameters::from_config(config),
                diagnostics.clone(),
            )),
            Box::new(StepQueryVm::new(clients.virtual_machines, diagnostics.clone())),
            Box::new(StepCaptureImage::new(clients.capture, capture, diagnostics.clone())),
            Box::new(StepDeleteResourceGroup::new(clients.resource_groups, diagnostics.clone())),
        ];

        Ok(Self {
            runner: Runner::new(steps).with_diagnostics(diagnostics),
            names,
            location: config.location.clone(),
        })
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.runner = self.runner.with_cancellation(cancellation);
        self
    }

    pub fn names(&self) -> &ResourceNames {
        &self.names
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.runner.step_names()
    }

    /// The state every run starts from.
    pub fn initial_state(&self) -> StateBag {
        let mut state = StateBag::new();
        state.put(keys::RESOURCE_GROUP_NAME, self.names.resource_group.clone());
        state.put(keys::COMPUTE_NAME, self.names.compute.clone());
        state.put(keys::DEPLOYMENT_NAME, self.names.deployment.clone());
        state.put(keys::LOCATION, self.location.clone());
        state
    }

    pub fn run(&self) -> RunReport {
        info!(
            resource_group = %self.names.resource_group,
            compute_name = %self.names.compute,
            location = %self.location,
            "starting image build"
        );
        self.runner.run(self.initial_state())
    }
}

/// What a successful build produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildArtifact {
    pub resource_group: String,
    pub compute_name: String,
    pub os_disk_vhd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_image_uri: Option<String>,
}

impl BuildArtifact {
    pub fn from_state(state: &StateBag) -> Result<Self, BuildError> {
        Ok(Self {
            resource_group: state.get(keys::RESOURCE_GROUP_NAME)?.clone(),
            compute_name: state.get(keys::COMPUTE_NAME)?.clone(),
            os_disk_vhd: state.get(keys::OS_DISK_VHD)?.clone(),
            captured_image_uri: state.get_ok(keys::CAPTURED_IMAGE_URI).cloned(),
        })
    }
}
