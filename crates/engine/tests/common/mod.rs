#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use anyhow::{Result, anyhow, bail};
use imagesmith_engine::{CaptureSettings, DeploymentClient, DeploymentTemplate, ImageCaptureClient, ResourceGroupClient, VirtualMachineQuery};
use imagesmith_types::VirtualMachine;

/// In-memory stand-in for the ARM-backed client that journals every call.
#[derive(Default)]
pub struct FakeCloud {
    pub groups: Mutex<BTreeSet<String>>,
    pub calls: Mutex<Vec<String>>,
    pub vm: Mutex<Option<VirtualMachine>>,
    pub fail: Mutex<BTreeMap<&'static str, String>>,
}

impl FakeCloud {
    pub fn with_vm(vm: VirtualMachine) -> Self {
        let cloud = Self::default();
        *cloud.vm.lock().unwrap() = Some(vm);
        cloud
    }

    /// Makes every call to `operation` fail with `message`.
    pub fn failing(self, operation: &'static str, message: &str) -> Self {
        self.fail.lock().unwrap().insert(operation, message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, operation: &'static str, detail: String) -> Result<()> {
        self.calls.lock().unwrap().push(format!("{operation}:{detail}"));
        match self.fail.lock().unwrap().get(operation) {
            Some(message) => bail!("{message}"),
            None => Ok(()),
        }
    }
}

impl VirtualMachineQuery for FakeCloud {
    fn get_virtual_machine(&self, resource_group: &str, name: &str) -> Result<VirtualMachine> {
        self.record("get_vm", format!("{resource_group}/{name}"))?;
        self.vm.lock().unwrap().clone().ok_or_else(|| anyhow!("virtual machine '{name}' not found"))
    }
}

impl ResourceGroupClient for FakeCloud {
    fn create_resource_group(&self, name: &str, _location: &str, _tags: &BTreeMap<String, String>) -> Result<()> {
        self.record("create_rg", name.to_string())?;
        self.groups.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    fn resource_group_exists(&self, name: &str) -> Result<bool> {
        Ok(self.groups.lock().unwrap().contains(name))
    }

    fn delete_resource_group(&self, name: &str) -> Result<()> {
        self.record("delete_rg", name.to_string())?;
        self.groups.lock().unwrap().remove(name);
        Ok(())
    }
}

impl DeploymentClient for FakeCloud {
    fn deploy(&self, resource_group: &str, deployment: &str, _template: &DeploymentTemplate) -> Result<()> {
        self.record("deploy", format!("{resource_group}/{deployment}"))
    }
}

impl ImageCaptureClient for FakeCloud {
    fn power_off(&self, _resource_group: &str, name: &str) -> Result<()> {
        self.record("power_off", name.to_string())
    }

    fn generalize(&self, _resource_group: &str, name: &str) -> Result<()> {
        self.record("generalize", name.to_string())
    }

    fn capture(&self, _resource_group: &str, name: &str, settings: &CaptureSettings) -> Result<String> {
        self.record("capture", name.to_string())?;
        Ok(format!("https://store.blob.core.windows.net/system/{}/{}.vhd", settings.container, settings.vhd_prefix))
    }
}
