use std::sync::Arc;

use crate::adapter::VirtualMachineQuery;
use crate::diagnostics::Diagnostics;
use crate::error::BuildError;
use crate::keys;
use crate::state::StateBag;
use crate::step::{Step, StepAction, finish, required};

/// Reads the provisioned VM back from the cloud and publishes the URI of its
/// OS disk under [`keys::OS_DISK_VHD`].
///
/// The step only reads, so it never takes part in an unwind.
pub struct StepQueryVm {
    client: Arc<dyn VirtualMachineQuery>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl StepQueryVm {
    pub fn new(client: Arc<dyn VirtualMachineQuery>, diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self { client, diagnostics }
    }

    fn query(&self, state: &mut StateBag) -> Result<(), BuildError> {
        let resource_group = required(state, keys::RESOURCE_GROUP_NAME)?;
        let compute_name = required(state, keys::COMPUTE_NAME)?;

        self.diagnostics.say("Querying the machine's properties ...");
        self.diagnostics.say(&format!(" -> ResourceGroupName : '{resource_group}'"));
        self.diagnostics.say(&format!(" -> ComputeName       : '{compute_name}'"));

        let vm = self
            .client
            .get_virtual_machine(&resource_group, &compute_name)
            .map_err(|error| BuildError::adapter(format!("query virtual machine '{compute_name}'"), &error))?;
        let uri = vm.os_disk_vhd_uri().map_err(|source| BuildError::Extraction {
            resource: format!("virtual machine '{compute_name}'"),
            source,
        })?;

        self.diagnostics.say(&format!(" -> OS Disk           : '{uri}'"));
        state.put(keys::OS_DISK_VHD, uri.to_string());
        Ok(())
    }
}

impl Step for StepQueryVm {
    fn name(&self) -> &str {
        "query-vm"
    }

    fn run(&self, state: &mut StateBag) -> StepAction {
        let result = self.query(state);
        finish(state, self.diagnostics.as_ref(), result)
    }

    fn requires_cleanup(&self) -> bool {
        false
    }
}
