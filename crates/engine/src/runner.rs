//! Sequential step runner with halt-and-unwind semantics.
//!
//! Steps run in declared order against one [`StateBag`]. When a step halts, or
//! the run is cancelled, forward progress stops and every step that started
//! and asked for cleanup is unwound in strict reverse order. A completed run
//! performs no cleanup at all; steps that must tear something down on the
//! success path do it as a forward step.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tracing::{debug, info, warn};

use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::error::BuildError;
use crate::keys;
use crate::state::StateBag;
use crate::step::{Step, StepAction};

/// Cooperative cancellation flag shared between the runner and whoever stops it.
///
/// The runner observes it between steps; a step that is already running is
/// never interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Halted,
}

/// What happened during one run, plus the final state.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Steps whose forward action was invoked, in order.
    pub executed: Vec<String>,
    /// Steps whose cleanup ran, in the order it ran.
    pub cleaned_up: Vec<String>,
    pub state: StateBag,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    /// The error recorded for the run, if any.
    pub fn error(&self) -> Option<&BuildError> {
        self.state.get_ok(keys::ERROR)
    }

    /// Returns the final state, or the recorded error when the run failed.
    pub fn into_result(mut self) -> Result<StateBag, BuildError> {
        match self.state.take(keys::ERROR) {
            Some(error) => Err(error),
            None => Ok(self.state),
        }
    }
}

pub struct Runner {
    steps: Vec<Box<dyn Step>>,
    cancellation: CancellationToken,
    diagnostics: Arc<dyn Diagnostics>,
}

impl Runner {
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self {
            steps,
            cancellation: CancellationToken::new(),
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Runs every step until one halts or the run is cancelled, then unwinds.
    pub fn run(&self, mut state: StateBag) -> RunReport {
        let mut started: Vec<&dyn Step> = Vec::new();
        let mut executed = Vec::new();
        let mut outcome = RunOutcome::Completed;

        for step in &self.steps {
            let name = step.name();
            if self.cancellation.is_cancelled() {
                self.record_cancellation(&mut state, name);
                outcome = RunOutcome::Halted;
                break;
            }

            info!(step = %name, "running step");
            let action = step.run(&mut state);
            executed.push(name.to_string());
            if step.requires_cleanup() {
                started.push(step.as_ref());
            }

            match action {
                StepAction::Continue if self.cancellation.is_cancelled() => {
                    self.record_cancellation(&mut state, name);
                    outcome = RunOutcome::Halted;
                    break;
                }
                StepAction::Continue => debug!(step = %name, "step finished"),
                StepAction::Halt => {
                    if !state.contains(keys::ERROR) {
                        let error = BuildError::Unreported { step: name.to_string() };
                        self.diagnostics.error(&error);
                        state.put(keys::ERROR, error);
                    }
                    info!(step = %name, "step halted the build");
                    outcome = RunOutcome::Halted;
                    break;
                }
            }
        }

        let cleaned_up = match outcome {
            RunOutcome::Completed => Vec::new(),
            RunOutcome::Halted => self.unwind(&started, &mut state),
        };

        RunReport {
            outcome,
            executed,
            cleaned_up,
            state,
        }
    }

    fn unwind(&self, started: &[&dyn Step], state: &mut StateBag) -> Vec<String> {
        let mut cleaned_up = Vec::with_capacity(started.len());
        for step in started.iter().rev() {
            let name = step.name();
            debug!(step = %name, "cleaning up");
            if let Err(error) = step.cleanup(state) {
                let error = BuildError::Cleanup {
                    step: name.to_string(),
                    message: format!("{error:#}"),
                };
                warn!(step = %name, error = %error, "cleanup failed; continuing unwind");
                self.diagnostics.error(&error);
            }
            cleaned_up.push(name.to_string());
        }
        cleaned_up
    }

    fn record_cancellation(&self, state: &mut StateBag, step: &str) {
        info!(step = %step, "build cancelled");
        if state.contains(keys::ERROR) {
            return;
        }
        let error = BuildError::Cancelled { step: step.to_string() };
        self.diagnostics.error(&error);
        state.put(keys::ERROR, error);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::diagnostics::RecordingDiagnostics;
    use crate::step::halt;

    #[derive(Default)]
    struct Journal(Mutex<Vec<String>>);

    impl Journal {
        fn push(&self, entry: String) {
            self.0.lock().unwrap().push(entry);
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    struct Scripted {
        name: &'static str,
        action: StepAction,
        record_error: bool,
        cleanup_fails: bool,
        needs_cleanup: bool,
        cancel_while_running: Option<CancellationToken>,
        journal: Arc<Journal>,
    }

    impl Scripted {
        fn new(name: &'static str, journal: &Arc<Journal>) -> Self {
            Self {
                name,
                action: StepAction::Continue,
                record_error: true,
                cleanup_fails: false,
                needs_cleanup: true,
                cancel_while_running: None,
                journal: Arc::clone(journal),
            }
        }

        fn halting(mut self) -> Self {
            self.action = StepAction::Halt;
            self
        }
    }

    impl Step for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn run(&self, state: &mut StateBag) -> StepAction {
            self.journal.push(format!("run:{}", self.name));
            if let Some(token) = &self.cancel_while_running {
                token.cancel();
            }
            if self.action == StepAction::Halt && self.record_error {
                let error = BuildError::Adapter {
                    operation: self.name.to_string(),
                    message: "boom".into(),
                };
                return halt(state, &crate::diagnostics::SilentDiagnostics, error);
            }
            self.action
        }

        fn cleanup(&self, _state: &mut StateBag) -> anyhow::Result<()> {
            self.journal.push(format!("cleanup:{}", self.name));
            if self.cleanup_fails {
                anyhow::bail!("cleanup of {} exploded", self.name);
            }
            Ok(())
        }

        fn requires_cleanup(&self) -> bool {
            self.needs_cleanup
        }
    }

    fn boxed(steps: Vec<Scripted>) -> Vec<Box<dyn Step>> {
        steps.into_iter().map(|step| Box::new(step) as Box<dyn Step>).collect()
    }

    #[test]
    fn halting_step_unwinds_started_steps_in_reverse() {
        let journal = Arc::new(Journal::default());
        let runner = Runner::new(boxed(vec![
            Scripted::new("a", &journal),
            Scripted::new("b", &journal).halting(),
            Scripted::new("c", &journal),
        ]));

        let report = runner.run(StateBag::new());

        assert_eq!(report.outcome, RunOutcome::Halted);
        assert_eq!(journal.entries(), vec!["run:a", "run:b", "cleanup:b", "cleanup:a"]);
        assert_eq!(report.executed, vec!["a", "b"]);
        assert_eq!(report.cleaned_up, vec!["b", "a"]);
        assert!(matches!(report.error(), Some(BuildError::Adapter { operation, .. }) if operation == "b"));
    }

    #[test]
    fn completed_run_performs_no_cleanup() {
        let journal = Arc::new(Journal::default());
        let runner = Runner::new(boxed(vec![Scripted::new("a", &journal), Scripted::new("b", &journal)]));

        let report = runner.run(StateBag::new());

        assert!(report.is_completed());
        assert_eq!(journal.entries(), vec!["run:a", "run:b"]);
        assert!(report.cleaned_up.is_empty());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn steps_without_cleanup_are_not_unwound() {
        let journal = Arc::new(Journal::default());
        let mut read_only = Scripted::new("read", &journal);
        read_only.needs_cleanup = false;
        let runner = Runner::new(boxed(vec![
            Scripted::new("a", &journal),
            read_only,
            Scripted::new("c", &journal).halting(),
        ]));

        let report = runner.run(StateBag::new());

        assert_eq!(report.cleaned_up, vec!["c", "a"]);
    }

    #[test]
    fn cleanup_errors_do_not_stop_the_unwind() {
        let journal = Arc::new(Journal::default());
        let diagnostics = Arc::new(RecordingDiagnostics::new());
        let mut failing = Scripted::new("b", &journal);
        failing.cleanup_fails = true;
        let runner = Runner::new(boxed(vec![
            Scripted::new("a", &journal),
            failing,
            Scripted::new("c", &journal).halting(),
        ]))
        .with_diagnostics(diagnostics.clone());

        let report = runner.run(StateBag::new());

        assert_eq!(report.cleaned_up, vec!["c", "b", "a"]);
        assert!(matches!(report.error(), Some(BuildError::Adapter { operation, .. }) if operation == "c"));
        let errors = diagnostics.errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], BuildError::Cleanup { step, message } if step == "b" && message.contains("exploded")));
    }

    #[test]
    fn cancellation_before_a_step_stops_ahead_of_it() {
        let journal = Arc::new(Journal::default());
        let token = CancellationToken::new();
        let runner = Runner::new(boxed(vec![Scripted::new("a", &journal), Scripted::new("b", &journal)]))
            .with_cancellation(token.clone());
        token.cancel();

        let report = runner.run(StateBag::new());

        assert_eq!(report.outcome, RunOutcome::Halted);
        assert!(journal.entries().is_empty());
        assert_eq!(report.error(), Some(&BuildError::Cancelled { step: "a".into() }));
    }

    #[test]
    fn cancellation_during_a_step_unwinds_that_step_too() {
        let journal = Arc::new(Journal::default());
        let token = CancellationToken::new();
        let mut second = Scripted::new("b", &journal);
        second.cancel_while_running = Some(token.clone());
        let runner = Runner::new(boxed(vec![
            Scripted::new("a", &journal),
            second,
            Scripted::new("c", &journal),
        ]))
        .with_cancellation(token);

        let report = runner.run(StateBag::new());

        assert_eq!(journal.entries(), vec!["run:a", "run:b", "cleanup:b", "cleanup:a"]);
        assert_eq!(report.error(), Some(&BuildError::Cancelled { step: "b".into() }));
    }

    #[test]
    fn silent_halt_is_recorded_as_unreported() {
        let journal = Arc::new(Journal::default());
        let mut silent = Scripted::new("quiet", &journal).halting();
        silent.record_error = false;
        let runner = Runner::new(boxed(vec![silent]));

        let report = runner.run(StateBag::new());

        assert_eq!(
            report.into_result().unwrap_err(),
            BuildError::Unreported { step: "quiet".into() }
        );
    }
}
