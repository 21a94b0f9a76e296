//! Well-known state keys shared by the build steps.
//!
//! Cloud resource keys use the `arm.` prefix and run-level keys use `build.`.

use crate::error::BuildError;
use crate::state::StateKey;

pub const RESOURCE_GROUP_NAME: StateKey<String> = StateKey::new("arm.ResourceGroupName");
pub const COMPUTE_NAME: StateKey<String> = StateKey::new("arm.ComputeName");
pub const DEPLOYMENT_NAME: StateKey<String> = StateKey::new("arm.DeploymentName");
pub const LOCATION: StateKey<String> = StateKey::new("arm.Location");

/// Set once the run itself created the resource group, cleared once it is gone.
pub const RESOURCE_GROUP_CREATED: StateKey<bool> = StateKey::new("arm.ResourceGroupCreated");

/// URI of the provisioned VM's OS disk; the build artifact.
pub const OS_DISK_VHD: StateKey<String> = StateKey::new("arm.OSDiskVhd");
pub const CAPTURED_IMAGE_URI: StateKey<String> = StateKey::new("arm.CapturedImageUri");

/// Last error recorded by a step. Its presence means the run failed.
pub const ERROR: StateKey<BuildError> = StateKey::new("build.error");
