//! Shared type definitions for the imagesmith workspace.
//!
//! - [`vm`]: the virtual machine resource descriptor returned by the cloud
//!   platform, plus extraction of the OS disk location.
//! - [`image`]: the OS image catalog used to pick a base image.

pub mod image;
pub mod vm;

pub use image::{OsImage, OsImageList};
pub use vm::{
    DescriptorField, ExtractionError, OsDisk, StorageProfile, VirtualHardDisk, VirtualMachine, VirtualMachineProperties,
};
