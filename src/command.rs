/*!
 * Command contract, lifecycle state, and execution results
 */

use std::fmt;

use tracing::debug;
use uuid::Uuid;

use crate::error::{CommandError, ErrorKind};

/// Unique identity of a command instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId(Uuid);

impl CommandId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a single command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandState {
    /// Created, never executed
    #[default]
    Pending,
    /// `execute` is in progress
    Executing,
    /// Receiver mutation applied; eligible for undo
    Executed,
    /// Last `execute` failed; may be executed again
    Failed,
    /// Mutation reversed; terminal
    RolledBack,
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandState::Pending => write!(f, "pending"),
            CommandState::Executing => write!(f, "executing"),
            CommandState::Executed => write!(f, "executed"),
            CommandState::Failed => write!(f, "failed"),
            CommandState::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// Immutable outcome of one `execute` or `undo` call
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    success: bool,
    message: String,
    error: Option<CommandError>,
}

impl CommandResult {
    /// Successful outcome
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
        }
    }

    /// Failed outcome; the message is the error's display text
    pub fn failed(error: CommandError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            error: Some(error),
        }
    }

    /// Failed outcome with a custom message
    pub fn failed_with(message: impl Into<String>, error: CommandError) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn error(&self) -> Option<&CommandError> {
        self.error.as_ref()
    }

    /// Category of the failure, `None` on success
    pub fn kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(CommandError::kind)
    }

    /// Take the error out of a failed result.
    ///
    /// A failed result without an attached error becomes `CommandError::Permanent`
    /// carrying the message.
    pub fn into_error(self) -> Option<CommandError> {
        if self.success {
            return None;
        }
        Some(self.error.unwrap_or(CommandError::Permanent(self.message)))
    }
}

/// An executable, reversible unit of work bound to exactly one receiver.
///
/// Implementations report every failure through [`CommandResult`]; they must not
/// panic to signal a failed mutation. `undo` is only meaningful once the command
/// is [`CommandState::Executed`]; in any other state it must leave the receiver
/// untouched and return a failed result.
pub trait Command: Send {
    fn id(&self) -> CommandId;

    fn description(&self) -> &str;

    fn state(&self) -> CommandState;

    /// Apply the receiver mutation
    fn execute(&mut self) -> CommandResult;

    /// Reverse the mutation applied by the last successful `execute`
    fn undo(&mut self) -> CommandResult;
}

impl<C: Command + ?Sized> Command for Box<C> {
    fn id(&self) -> CommandId {
        (**self).id()
    }

    fn description(&self) -> &str {
        (**self).description()
    }

    fn state(&self) -> CommandState {
        (**self).state()
    }

    fn execute(&mut self) -> CommandResult {
        (**self).execute()
    }

    fn undo(&mut self) -> CommandResult {
        (**self).undo()
    }
}

/// Lifecycle bookkeeping shared by concrete commands.
///
/// A command keeps one `CommandCore` next to its receiver handle and routes its
/// `execute`/`undo` through [`execute_with`](Self::execute_with) and
/// [`undo_with`](Self::undo_with), supplying only the receiver mutation.
#[derive(Debug, Clone)]
pub struct CommandCore {
    id: CommandId,
    description: String,
    state: CommandState,
}

impl CommandCore {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: CommandId::new(),
            description: description.into(),
            state: CommandState::Pending,
        }
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    /// Run `action` if the lifecycle allows it.
    ///
    /// Allowed from `Pending` and `Failed`. An `Executed` command is rejected
    /// with `AlreadyExecuted` and a rolled back one with `AlreadyRolledBack`;
    /// in both cases `action` is not called.
    pub fn execute_with<F>(&mut self, action: F) -> CommandResult
    where
        F: FnOnce() -> Result<String, CommandError>,
    {
        match self.state {
            CommandState::Pending | CommandState::Failed => {}
            CommandState::Executed | CommandState::Executing => {
                return CommandResult::failed(CommandError::AlreadyExecuted);
            }
            CommandState::RolledBack => {
                return CommandResult::failed(CommandError::AlreadyRolledBack);
            }
        }

        self.state = CommandState::Executing;
        match action() {
            Ok(message) => {
                self.state = CommandState::Executed;
                debug!(command = %self.description, "Executed");
                CommandResult::ok(message)
            }
            Err(error) => {
                self.state = CommandState::Failed;
                debug!(command = %self.description, %error, "Execute failed");
                CommandResult::failed(error)
            }
        }
    }

    /// Run `action` if the command is `Executed`.
    ///
    /// On success the state moves to `RolledBack`. A failed undo leaves the
    /// command `Executed` so the caller can see it still holds a mutation.
    pub fn undo_with<F>(&mut self, action: F) -> CommandResult
    where
        F: FnOnce() -> Result<String, CommandError>,
    {
        if self.state != CommandState::Executed {
            return CommandResult::failed(CommandError::NotExecuted(self.state));
        }

        match action() {
            Ok(message) => {
                self.state = CommandState::RolledBack;
                debug!(command = %self.description, "Rolled back");
                CommandResult::ok(message)
            }
            Err(error) => {
                debug!(command = %self.description, %error, "Undo failed");
                CommandResult::failed(error)
            }
        }
    }
}
