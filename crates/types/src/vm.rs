//! Virtual machine resource descriptor.
//!
//! Mirrors the subset of the Azure Resource Manager `virtualMachines` payload
//! the build pipeline reads. Every nested level is optional because the
//! platform populates properties asynchronously after a deployment; a VM that
//! exists but has no disk attached yet deserializes fine and only fails when
//! [`VirtualMachine::os_disk_vhd_uri`] is asked for the disk location.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A provisioned virtual machine as described by the cloud platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<VirtualMachineProperties>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineProperties {
    /// ARM provisioning state, e.g. `Creating` or `Succeeded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_profile: Option<StorageProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_disk: Option<OsDisk>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsDisk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vhd: Option<VirtualHardDisk>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualHardDisk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// A level of the descriptor that can be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorField {
    Properties,
    StorageProfile,
    OsDisk,
    Vhd,
    Uri,
}

impl DescriptorField {
    /// JSON path of the field inside the ARM payload.
    pub fn path(self) -> &'static str {
        match self {
            DescriptorField::Properties => "properties",
            DescriptorField::StorageProfile => "properties.storageProfile",
            DescriptorField::OsDisk => "properties.storageProfile.osDisk",
            DescriptorField::Vhd => "properties.storageProfile.osDisk.vhd",
            DescriptorField::Uri => "properties.storageProfile.osDisk.vhd.uri",
        }
    }
}

impl std::fmt::Display for DescriptorField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// A retrievable descriptor that lacks a field the caller needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("descriptor is missing `{missing}`")]
pub struct ExtractionError {
    pub missing: DescriptorField,
}

impl VirtualMachine {
    /// Builds a descriptor whose OS disk lives at `uri`.
    pub fn with_os_disk_vhd(uri: impl Into<String>) -> Self {
        Self {
            properties: Some(VirtualMachineProperties {
                provisioning_state: Some("Succeeded".into()),
                storage_profile: Some(StorageProfile {
                    os_disk: Some(OsDisk {
                        vhd: Some(VirtualHardDisk { uri: Some(uri.into()) }),
                        ..Default::default()
                    }),
                }),
            }),
            ..Default::default()
        }
    }

    /// Walks `properties → storageProfile → osDisk → vhd → uri` and returns the
    /// first level that is absent as an [`ExtractionError`].
    pub fn os_disk_vhd_uri(&self) -> Result<&str, ExtractionError> {
        let missing = |missing| ExtractionError { missing };

        let properties = self.properties.as_ref().ok_or(missing(DescriptorField::Properties))?;
        let storage_profile = properties
            .storage_profile
            .as_ref()
            .ok_or(missing(DescriptorField::StorageProfile))?;
        let os_disk = storage_profile.os_disk.as_ref().ok_or(missing(DescriptorField::OsDisk))?;
        let vhd = os_disk.vhd.as_ref().ok_or(missing(DescriptorField::Vhd))?;
        vhd.uri.as_deref().ok_or(missing(DescriptorField::Uri))
    }

    /// Provisioning state reported by the platform, if any.
    pub fn provisioning_state(&self) -> Option<&str> {
        self.properties.as_ref()?.provisioning_state.as_deref()
    }
}
