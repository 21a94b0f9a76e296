//! Concrete build steps, in the order a standard build runs them.

mod capture_image;
mod create_resource_group;
mod delete_resource_group;
mod deploy_template;
mod query_vm;

pub use capture_image::StepCaptureImage;
pub use create_resource_group::StepCreateResourceGroup;
pub use delete_resource_group::StepDeleteResourceGroup;
pub use deploy_template::{DeploymentParameters, StepDeployTemplate};
pub use query_vm::StepQueryVm;
