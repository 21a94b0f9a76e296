//! Error types recorded by build steps.

use imagesmith_types::ExtractionError;
use thiserror::Error;

use crate::state::StateError;

/// The failure reason of a build run.
///
/// Steps store one of these under [`keys::ERROR`](crate::keys::ERROR) before
/// halting; the runner never looks further than the halt signal itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// The cloud adapter rejected or failed the call.
    #[error("{operation} failed: {message}")]
    Adapter { operation: String, message: String },

    /// The call succeeded but the returned resource lacks a field the step needs.
    #[error("{resource} was retrieved but is incomplete: {source}")]
    Extraction {
        resource: String,
        #[source]
        source: ExtractionError,
    },

    /// A value an earlier step should have stored is absent.
    #[error("precondition violated: {0}")]
    Precondition(#[from] StateError),

    /// The run was cancelled before or while the step ran.
    #[error("build cancelled at step '{step}'")]
    Cancelled { step: String },

    /// A step halted without recording why.
    #[error("step '{step}' halted without recording an error")]
    Unreported { step: String },

    /// A compensating action failed. Reported, never stored as the run error.
    #[error("cleanup of step '{step}' failed: {message}")]
    Cleanup { step: String, message: String },
}

impl BuildError {
    /// Wraps an adapter failure, keeping the full `anyhow` context chain.
    pub fn adapter(operation: impl Into<String>, error: &anyhow::Error) -> Self {
        BuildError::Adapter {
            operation: operation.into(),
            message: format!("{error:#}"),
        }
    }
}
