//! Progress and error reporting hooks injected into steps.

use std::sync::Mutex;

use tracing::{error, info};

use crate::error::BuildError;

/// Receives human-readable progress and the errors steps record.
///
/// Implementations only observe; nothing they do can change the course of a run.
pub trait Diagnostics: Send + Sync {
    fn say(&self, message: &str);
    fn error(&self, error: &BuildError);
}

/// Forwards diagnostics to `tracing` under the `imagesmith::build` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn say(&self, message: &str) {
        info!(target: "imagesmith::build", "{message}");
    }

    fn error(&self, error: &BuildError) {
        error!(target: "imagesmith::build", error = %error, "build step failed");
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentDiagnostics;

impl Diagnostics for SilentDiagnostics {
    fn say(&self, _message: &str) {}

    fn error(&self, _error: &BuildError) {}
}

/// Keeps every message and error in memory, in the order received.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    messages: Mutex<Vec<String>>,
    errors: Mutex<Vec<BuildError>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|messages| messages.clone()).unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<BuildError> {
        self.errors.lock().map(|errors| errors.clone()).unwrap_or_default()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn say(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }

    fn error(&self, error: &BuildError) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(error.clone());
        }
    }
}
