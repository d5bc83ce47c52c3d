/*!
 * Atomic composite: an ordered group of commands that commits or rolls back as one
 *
 * Steps run strictly one after another because a later step may depend on
 * what an earlier one changed. `executed_prefix` counts the leading steps that
 * executed successfully; exactly those steps are undone, last first, when a
 * later step fails.
 */

use std::fmt;

use tracing::{error, info, warn};

use crate::command::{Command, CommandId, CommandResult, CommandState};
use crate::error::{CommandError, RollbackError, TransactionError};

/// Lifecycle of a composite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositeState {
    #[default]
    NotStarted,
    Running,
    /// Every step executed
    Committed,
    /// Executed steps were undone; terminal
    RolledBack,
}

impl fmt::Display for CompositeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositeState::NotStarted => write!(f, "not started"),
            CompositeState::Running => write!(f, "running"),
            CompositeState::Committed => write!(f, "committed"),
            CompositeState::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// Ordered sequence of commands executed as a single all-or-nothing unit
pub struct AtomicCompositeCommand {
    id: CommandId,
    name: String,
    steps: Vec<Box<dyn Command>>,
    executed_prefix: usize,
    phase: CompositeState,
    last_failure: Option<TransactionError>,
}

impl AtomicCompositeCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: CommandId::new(),
            name: name.into(),
            steps: Vec::new(),
            executed_prefix: 0,
            phase: CompositeState::NotStarted,
            last_failure: None,
        }
    }

    pub fn with_steps(name: impl Into<String>, steps: Vec<Box<dyn Command>>) -> Self {
        let mut composite = Self::new(name);
        composite.steps = steps;
        composite
    }

    /// Builder-style append
    pub fn step(mut self, command: impl Command + 'static) -> Self {
        self.steps.push(Box::new(command));
        self
    }

    /// Append a step. Only allowed before the composite has run.
    pub fn push(&mut self, command: Box<dyn Command>) -> Result<(), CommandError> {
        match self.phase {
            CompositeState::NotStarted => {
                self.steps.push(command);
                Ok(())
            }
            CompositeState::RolledBack => Err(CommandError::AlreadyRolledBack),
            CompositeState::Running | CompositeState::Committed => {
                Err(CommandError::AlreadyExecuted)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of leading steps currently executed and subject to rollback
    pub fn executed_prefix(&self) -> usize {
        self.executed_prefix
    }

    pub fn phase(&self) -> CompositeState {
        self.phase
    }

    /// Failure from the run that rolled this composite back
    pub fn last_failure(&self) -> Option<&TransactionError> {
        self.last_failure.as_ref()
    }

    /// Execute every step in order.
    ///
    /// On the first failing step, stops and undoes the executed steps in reverse
    /// order, attempting every undo even if some fail, then returns a
    /// [`TransactionError`] carrying the triggering error and any undo failures.
    /// A committed or rolled back composite refuses to run again.
    pub fn run(&mut self) -> Result<(), TransactionError> {
        match self.phase {
            CompositeState::NotStarted => {}
            CompositeState::Committed | CompositeState::Running => {
                return Err(self.refusal(CommandError::AlreadyExecuted));
            }
            CompositeState::RolledBack => {
                return Err(self.refusal(CommandError::AlreadyRolledBack));
            }
        }

        self.phase = CompositeState::Running;

        for index in 0..self.steps.len() {
            let result = self.steps[index].execute();
            if result.is_success() {
                self.executed_prefix += 1;
                continue;
            }

            let description = self.steps[index].description().to_string();
            let cause = result
                .into_error()
                .unwrap_or_else(|| CommandError::Permanent(description.clone()));
            warn!(
                composite = %self.name,
                step = index,
                command = %description,
                error = %cause,
                "Step failed, rolling back {} executed step(s)",
                self.executed_prefix
            );

            let rollback_errors = self.rollback();
            self.phase = CompositeState::RolledBack;

            let failure = TransactionError {
                composite: self.name.clone(),
                failed_step: Some(index),
                cause,
                rollback_errors,
            };
            self.last_failure = Some(failure.clone());
            return Err(failure);
        }

        self.phase = CompositeState::Committed;
        info!(composite = %self.name, steps = self.steps.len(), "Committed");
        Ok(())
    }

    /// Undo steps `executed_prefix - 1` down to `0`, never stopping early
    fn rollback(&mut self) -> Vec<RollbackError> {
        let mut errors = Vec::new();

        while self.executed_prefix > 0 {
            let index = self.executed_prefix - 1;
            let step = &mut self.steps[index];
            let result = step.undo();

            if !result.is_success() {
                let description = step.description().to_string();
                let error = result
                    .into_error()
                    .unwrap_or_else(|| CommandError::Permanent(description.clone()));
                error!(
                    composite = %self.name,
                    step = index,
                    command = %description,
                    error = %error,
                    "Undo failed during rollback"
                );
                errors.push(RollbackError {
                    step: index,
                    description,
                    error,
                });
            }

            self.executed_prefix -= 1;
        }

        errors
    }

    fn refusal(&self, cause: CommandError) -> TransactionError {
        TransactionError {
            composite: self.name.clone(),
            failed_step: None,
            cause,
            rollback_errors: Vec::new(),
        }
    }
}

impl fmt::Debug for AtomicCompositeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicCompositeCommand")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .field("executed_prefix", &self.executed_prefix)
            .field("phase", &self.phase)
            .finish()
    }
}

impl Command for AtomicCompositeCommand {
    fn id(&self) -> CommandId {
        self.id
    }

    fn description(&self) -> &str {
        &self.name
    }

    fn state(&self) -> CommandState {
        match self.phase {
            CompositeState::NotStarted => CommandState::Pending,
            CompositeState::Running => CommandState::Executing,
            CompositeState::Committed => CommandState::Executed,
            CompositeState::RolledBack if self.last_failure.is_some() => CommandState::Failed,
            CompositeState::RolledBack => CommandState::RolledBack,
        }
    }

    fn execute(&mut self) -> CommandResult {
        match self.run() {
            Ok(()) => CommandResult::ok(format!(
                "Committed {} step(s) of {}",
                self.steps.len(),
                self.name
            )),
            Err(failure) => CommandResult::failed(failure.into()),
        }
    }

    /// Roll back a committed composite, every step in reverse order
    fn undo(&mut self) -> CommandResult {
        if self.phase != CompositeState::Committed {
            return CommandResult::failed(CommandError::NotExecuted(self.state()));
        }

        let errors = self.rollback();
        self.phase = CompositeState::RolledBack;

        if errors.is_empty() {
            CommandResult::ok(format!("Rolled back {}", self.name))
        } else {
            CommandResult::failed(CommandError::Rollback(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandCore;
    use std::sync::{Arc, Mutex};

    type Journal = Arc<Mutex<Vec<String>>>;

    /// Records execute/undo calls into a shared journal
    struct Recorder {
        core: CommandCore,
        journal: Journal,
        fail_execute: bool,
        fail_undo: bool,
    }

    impl Recorder {
        fn new(name: &str, journal: &Journal) -> Self {
            Self {
                core: CommandCore::new(name),
                journal: journal.clone(),
                fail_execute: false,
                fail_undo: false,
            }
        }

        fn failing(mut self) -> Self {
            self.fail_execute = true;
            self
        }

        fn failing_undo(mut self) -> Self {
            self.fail_undo = true;
            self
        }
    }

    impl Command for Recorder {
        fn id(&self) -> CommandId {
            self.core.id()
        }

        fn description(&self) -> &str {
            self.core.description()
        }

        fn state(&self) -> CommandState {
            self.core.state()
        }

        fn execute(&mut self) -> CommandResult {
            let name = self.core.description().to_string();
            self.core.execute_with(|| {
                if self.fail_execute {
                    return Err(CommandError::Permanent(format!("{} refused", name)));
                }
                self.journal.lock().unwrap().push(format!("do {}", name));
                Ok(String::new())
            })
        }

        fn undo(&mut self) -> CommandResult {
            let name = self.core.description().to_string();
            self.core.undo_with(|| {
                self.journal.lock().unwrap().push(format!("undo {}", name));
                if self.fail_undo {
                    return Err(CommandError::Permanent(format!("{} stuck", name)));
                }
                Ok(String::new())
            })
        }
    }

    fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn test_all_steps_commit() {
        let log = journal();
        let mut composite = AtomicCompositeCommand::new("all good")
            .step(Recorder::new("a", &log))
            .step(Recorder::new("b", &log))
            .step(Recorder::new("c", &log));

        composite.run().unwrap();

        assert_eq!(composite.executed_prefix(), 3);
        assert_eq!(composite.phase(), CompositeState::Committed);
        assert_eq!(*log.lock().unwrap(), vec!["do a", "do b", "do c"]);
    }

    #[test]
    fn test_failure_rolls_back_in_reverse() {
        let log = journal();
        let mut composite = AtomicCompositeCommand::new("fails at d")
            .step(Recorder::new("a", &log))
            .step(Recorder::new("b", &log))
            .step(Recorder::new("c", &log))
            .step(Recorder::new("d", &log).failing())
            .step(Recorder::new("e", &log));

        let err = composite.run().unwrap_err();

        assert_eq!(err.failed_step, Some(3));
        assert!(err.is_clean_rollback());
        assert_eq!(composite.executed_prefix(), 0);
        assert_eq!(composite.phase(), CompositeState::RolledBack);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["do a", "do b", "do c", "undo c", "undo b", "undo a"]
        );
    }

    #[test]
    fn test_first_step_failure_has_nothing_to_undo() {
        let log = journal();
        let mut composite = AtomicCompositeCommand::new("fails at a")
            .step(Recorder::new("a", &log).failing())
            .step(Recorder::new("b", &log));

        let err = composite.run().unwrap_err();

        assert_eq!(err.failed_step, Some(0));
        assert_eq!(err.cause, CommandError::Permanent("a refused".into()));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_undo_failure_does_not_stop_rollback() {
        let log = journal();
        let mut composite = AtomicCompositeCommand::new("sticky middle")
            .step(Recorder::new("a", &log))
            .step(Recorder::new("b", &log).failing_undo())
            .step(Recorder::new("c", &log))
            .step(Recorder::new("d", &log).failing());

        let err = composite.run().unwrap_err();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["do a", "do b", "do c", "undo c", "undo b", "undo a"]
        );
        assert_eq!(err.rollback_errors.len(), 1);
        assert_eq!(err.rollback_errors[0].step, 1);
        assert_eq!(err.cause, CommandError::Permanent("d refused".into()));
        assert_eq!(composite.executed_prefix(), 0);
    }

    #[test]
    fn test_rolled_back_composite_refuses_rerun() {
        let log = journal();
        let mut composite = AtomicCompositeCommand::new("once")
            .step(Recorder::new("a", &log).failing());
        composite.run().unwrap_err();

        let err = composite.run().unwrap_err();
        assert_eq!(err.failed_step, None);
        assert_eq!(err.cause, CommandError::AlreadyRolledBack);
        assert_eq!(composite.state(), CommandState::Failed);
    }

    #[test]
    fn test_committed_composite_refuses_rerun() {
        let log = journal();
        let mut composite = AtomicCompositeCommand::new("once").step(Recorder::new("a", &log));
        composite.run().unwrap();

        let err = composite.run().unwrap_err();
        assert_eq!(err.cause, CommandError::AlreadyExecuted);
        assert_eq!(*log.lock().unwrap(), vec!["do a"]);
        assert_eq!(composite.executed_prefix(), 1);
    }

    #[test]
    fn test_undo_committed_composite() {
        let log = journal();
        let mut composite = AtomicCompositeCommand::new("reversible")
            .step(Recorder::new("a", &log))
            .step(Recorder::new("b", &log));

        assert!(composite.execute().is_success());
        assert!(composite.undo().is_success());

        assert_eq!(composite.state(), CommandState::RolledBack);
        assert_eq!(*log.lock().unwrap(), vec!["do a", "do b", "undo b", "undo a"]);
        assert!(!composite.undo().is_success());
    }

    #[test]
    fn test_execute_reports_transaction_error() {
        let log = journal();
        let mut composite = AtomicCompositeCommand::new("as command")
            .step(Recorder::new("a", &log))
            .step(Recorder::new("b", &log).failing());

        let result = composite.execute();

        assert!(!result.is_success());
        assert!(matches!(result.error(), Some(CommandError::Transaction(_))));
        assert_eq!(composite.last_failure().map(|f| f.failed_step), Some(Some(1)));
    }

    #[test]
    fn test_push_only_before_run() {
        let log = journal();
        let mut composite = AtomicCompositeCommand::new("locked");
        composite.push(Box::new(Recorder::new("a", &log))).unwrap();
        composite.run().unwrap();

        let err = composite.push(Box::new(Recorder::new("b", &log))).unwrap_err();
        assert_eq!(err, CommandError::AlreadyExecuted);
        assert_eq!(composite.len(), 1);
    }

    #[test]
    fn test_empty_composite_commits() {
        let mut composite = AtomicCompositeCommand::new("empty");
        composite.run().unwrap();
        assert!(composite.is_empty());
        assert_eq!(composite.phase(), CompositeState::Committed);
    }
}
