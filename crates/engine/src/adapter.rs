//! Cloud capabilities injected into the build steps.
//!
//! Steps depend on these narrow synchronous traits rather than on the REST
//! client, so tests can swap in closures or in-memory fakes. [`ArmCloudClient`]
//! is the production implementation: it drives the async [`ArmClient`] to
//! completion with [`block_on_future`].

use std::collections::BTreeMap;

use anyhow::Result;
use imagesmith_api::ArmClient;
use imagesmith_types::VirtualMachine;
use imagesmith_util::block_on_future;
use serde_json::Value;

/// Reads the current descriptor of a virtual machine.
pub trait VirtualMachineQuery: Send + Sync {
    fn get_virtual_machine(&self, resource_group: &str, name: &str) -> Result<VirtualMachine>;
}

impl<F> VirtualMachineQuery for F
where
    F: Fn(&str, &str) -> Result<VirtualMachine> + Send + Sync,
{
    fn get_virtual_machine(&self, resource_group: &str, name: &str) -> Result<VirtualMachine> {
        self(resource_group, name)
    }
}

pub trait ResourceGroupClient: Send + Sync {
    fn create_resource_group(&self, name: &str, location: &str, tags: &BTreeMap<String, String>) -> Result<()>;
    fn resource_group_exists(&self, name: &str) -> Result<bool>;
    /// Deletes the group and waits until ARM reports it gone.
    fn delete_resource_group(&self, name: &str) -> Result<()>;
}

/// Template plus parameter values submitted as one deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentTemplate {
    pub template: Value,
    pub parameters: Value,
}

pub trait DeploymentClient: Send + Sync {
    /// Submits the deployment and blocks until it reaches a terminal state.
    fn deploy(&self, resource_group: &str, deployment: &str, template: &DeploymentTemplate) -> Result<()>;
}

/// Where a captured image is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    pub vhd_prefix: String,
    pub container: String,
}

pub trait ImageCaptureClient: Send + Sync {
    fn power_off(&self, resource_group: &str, name: &str) -> Result<()>;
    fn generalize(&self, resource_group: &str, name: &str) -> Result<()>;
    /// Captures the VM's OS disk and returns the URI of the resulting image.
    fn capture(&self, resource_group: &str, name: &str, settings: &CaptureSettings) -> Result<String>;
}

/// All capabilities backed by Azure Resource Manager.
#[derive(Debug, Clone)]
pub struct ArmCloudClient {
    client: ArmClient,
}

impl ArmCloudClient {
    pub fn new(client: ArmClient) -> Self {
        Self { client }
    }
}

impl VirtualMachineQuery for ArmCloudClient {
    fn get_virtual_machine(&self, resource_group: &str, name: &str) -> Result<VirtualMachine> {
        let client = self.client.clone();
        let (resource_group, name) = (resource_group.to_string(), name.to_string());
        block_on_future(async move { client.get_virtual_machine(&resource_group, &name).await })
    }
}

impl ResourceGroupClient for ArmCloudClient {
    fn create_resource_group(&self, name: &str, location: &str, tags: &BTreeMap<String, String>) -> Result<()> {
        let client = self.client.clone();
        let (name, location, tags) = (name.to_string(), location.to_string(), tags.clone());
        block_on_future(async move { client.create_resource_group(&name, &location, &tags).await })
    }

    fn resource_group_exists(&self, name: &str) -> Result<bool> {
        let client = self.client.clone();
        let name = name.to_string();
        block_on_future(async move { client.resource_group_exists(&name).await })
    }

    fn delete_resource_group(&self, name: &str) -> Result<()> {
        let client = self.client.clone();
        let name = name.to_string();
        block_on_future(async move { client.delete_resource_group(&name).await })
    }
}

impl DeploymentClient for ArmCloudClient {
    fn deploy(&self, resource_group: &str, deployment: &str, template: &DeploymentTemplate) -> Result<()> {
        let client = self.client.clone();
        let (resource_group, deployment, template) = (resource_group.to_string(), deployment.to_string(), template.clone());
        block_on_future(async move {
            client
                .create_deployment(&resource_group, &deployment, &template.template, &template.parameters)
                .await
        })
    }
}

impl ImageCaptureClient for ArmCloudClient {
    fn power_off(&self, resource_group: &str, name: &str) -> Result<()> {
        let client = self.client.clone();
        let (resource_group, name) = (resource_group.to_string(), name.to_string());
        block_on_future(async move { client.power_off(&resource_group, &name).await })
    }

    fn generalize(&self, resource_group: &str, name: &str) -> Result<()> {
        let client = self.client.clone();
        let (resource_group, name) = (resource_group.to_string(), name.to_string());
        block_on_future(async move { client.generalize(&resource_group, &name).await })
    }

    fn capture(&self, resource_group: &str, name: &str, settings: &CaptureSettings) -> Result<String> {
        let client = self.client.clone();
        let (resource_group, name, settings) = (resource_group.to_string(), name.to_string(), settings.clone());
        block_on_future(async move {
            client
                .capture(&resource_group, &name, &settings.vhd_prefix, &settings.container)
                .await
        })
    }
}
