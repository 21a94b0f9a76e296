use std::sync::Arc;

use crate::adapter::{CaptureSettings, ImageCaptureClient};
use crate::diagnostics::Diagnostics;
use crate::error::BuildError;
use crate::keys;
use crate::state::StateBag;
use crate::step::{Step, StepAction, finish, required};

/// Powers off, generalizes and captures the build VM.
///
/// The URI of the captured image is stored under [`keys::CAPTURED_IMAGE_URI`].
pub struct StepCaptureImage {
    client: Arc<dyn ImageCaptureClient>,
    settings: CaptureSettings,
    diagnostics: Arc<dyn Diagnostics>,
}

impl StepCaptureImage {
    pub fn new(client: Arc<dyn ImageCaptureClient>, settings: CaptureSettings, diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            client,
            settings,
            diagnostics,
        }
    }

    fn capture(&self, state: &mut StateBag) -> Result<(), BuildError> {
        let resource_group = required(state, keys::RESOURCE_GROUP_NAME)?;
        let compute_name = required(state, keys::COMPUTE_NAME)?;
        let adapter_error = |operation: &str, error: anyhow::Error| {
            BuildError::adapter(format!("{operation} '{compute_name}'"), &error)
        };

        self.diagnostics.say(&format!("Powering off '{compute_name}' ..."));
        self.client
            .power_off(&resource_group, &compute_name)
            .map_err(|error| adapter_error("power off", error))?;

        self.diagnostics.say(&format!("Generalizing '{compute_name}' ..."));
        self.client
            .generalize(&resource_group, &compute_name)
            .map_err(|error| adapter_error("generalize", error))?;

        self.diagnostics.say(&format!(
            "Capturing '{compute_name}' into container '{}' ...",
            self.settings.container
        ));
        let uri = self
            .client
            .capture(&resource_group, &compute_name, &self.settings)
            .map_err(|error| adapter_error("capture", error))?;

        self.diagnostics.say(&format!(" -> Image: '{uri}'"));
        state.put(keys::CAPTURED_IMAGE_URI, uri);
        Ok(())
    }
}

impl Step for StepCaptureImage {
    fn name(&self) -> &str {
        "capture-image"
    }

    fn run(&self, state: &mut StateBag) -> StepAction {
        let result = self.capture(state);
        finish(state, self.diagnostics.as_ref(), result)
    }

    fn requires_cleanup(&self) -> bool {
        false
    }
}
