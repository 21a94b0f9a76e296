//! The step contract.
//!
//! A step is one unit of provisioning work with a forward action ([`Step::run`])
//! and a compensating action ([`Step::cleanup`]). Per-run data lives in the
//! [`StateBag`]; a step only holds what it was constructed with.

use crate::diagnostics::Diagnostics;
use crate::error::BuildError;
use crate::keys;
use crate::state::{StateBag, StateKey};

/// What the runner should do after a step's forward action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// Proceed to the next step.
    Continue,
    /// Stop forward progress and unwind.
    Halt,
}

pub trait Step: Send + Sync {
    /// Stable label used in logs and run reports.
    fn name(&self) -> &str;

    /// Performs the forward work.
    ///
    /// Failures never escape: the step reports them through its diagnostics,
    /// stores them under [`keys::ERROR`] and returns [`StepAction::Halt`].
    fn run(&self, state: &mut StateBag) -> StepAction;

    /// Undoes whatever `run` may have created.
    ///
    /// Called at most once, only during an unwind, and possibly after a `run`
    /// that did not finish. Implementations check what exists before acting.
    /// Errors are logged by the runner and never change the run's outcome.
    fn cleanup(&self, _state: &mut StateBag) -> anyhow::Result<()> {
        Ok(())
    }

    /// Whether the runner must call [`Step::cleanup`] once this step has started.
    fn requires_cleanup(&self) -> bool {
        true
    }
}

/// Reports `error`, records it as the run error and halts.
pub fn halt(state: &mut StateBag, diagnostics: &dyn Diagnostics, error: BuildError) -> StepAction {
    diagnostics.error(&error);
    state.put(keys::ERROR, error);
    StepAction::Halt
}

/// Maps the result of a step body onto the action signal.
pub fn finish(state: &mut StateBag, diagnostics: &dyn Diagnostics, result: Result<(), BuildError>) -> StepAction {
    match result {
        Ok(()) => StepAction::Continue,
        Err(error) => halt(state, diagnostics, error),
    }
}

/// Reads a string input an earlier step must have stored.
pub fn required(state: &StateBag, key: StateKey<String>) -> Result<String, BuildError> {
    Ok(state.get(key)?.clone())
}
