//! # Imagesmith Engine
//!
//! The engine orchestrates a machine-image build as an ordered list of steps
//! sharing one typed [`StateBag`]. Each step performs a forward action and may
//! register a compensating cleanup; when a step halts or the build is
//! cancelled, the [`Runner`] unwinds every started step in reverse order.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use imagesmith_engine::{Runner, SilentDiagnostics, StateBag, Step, StepQueryVm, keys};
//! use imagesmith_types::VirtualMachine;
//!
//! let query = |_: &str, _: &str| -> anyhow::Result<VirtualMachine> { Ok(VirtualMachine::with_os_disk_vhd("disk.vhd")) };
//! let steps: Vec<Box<dyn Step>> = vec![Box::new(StepQueryVm::new(Arc::new(query), Arc::new(SilentDiagnostics)))];
//!
//! let mut state = StateBag::new();
//! state.put(keys::RESOURCE_GROUP_NAME, "rg1".to_string());
//! state.put(keys::COMPUTE_NAME, "vm1".to_string());
//!
//! let report = Runner::new(steps).run(state);
//! assert!(report.is_completed());
//! assert_eq!(report.state.get(keys::OS_DISK_VHD).map(String::as_str), Ok("disk.vhd"));
//! ```
//!
//! ## Architecture
//!
//! - **`state`**: typed keys over a heterogeneous key/value store
//! - **`step`** and **`runner`**: the step contract and halt-and-unwind execution
//! - **`adapter`**: cloud capabilities injected into steps, backed by ARM
//! - **`steps`**: the concrete build steps
//! - **`pipeline`** and **`config`**: assembling a build from a config file

pub mod adapter;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod keys;
pub mod pipeline;
pub mod runner;
pub mod state;
pub mod step;
pub mod steps;

pub use adapter::{
    ArmCloudClient, CaptureSettings, DeploymentClient, DeploymentTemplate, ImageCaptureClient, ResourceGroupClient, VirtualMachineQuery,
};
pub use config::{BuildConfig, ConfigError, ImageReference};
pub use diagnostics::{Diagnostics, RecordingDiagnostics, SilentDiagnostics, TracingDiagnostics};
pub use error::BuildError;
pub use pipeline::{BuildArtifact, Pipeline, PipelineClients};
pub use runner::{CancellationToken, RunOutcome, RunReport, Runner};
pub use state::{StateBag, StateError, StateKey};
pub use step::{Step, StepAction};
pub use steps::{DeploymentParameters, StepCaptureImage, StepCreateResourceGroup, StepDeleteResourceGroup, StepDeployTemplate, StepQueryVm};
