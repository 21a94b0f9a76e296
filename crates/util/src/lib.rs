//! Small helpers shared by the imagesmith crates.

pub mod async_runtime;
pub mod naming;
pub mod paths;
pub mod redaction;

pub use async_runtime::block_on_future;
pub use naming::{ResourceNames, timestamp_suffix};
pub use paths::expand_tilde;
pub use redaction::redact_sensitive;
