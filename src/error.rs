/*!
 * Error types for Relay
 */

use std::fmt;
use std::io;
use std::time::Duration;

use relay_core_resilience::{ResilienceError, Retryable};
use thiserror::Error;

use crate::command::CommandState;
use crate::receivers::account::AccountError;
use crate::receivers::device::DeviceError;

pub type Result<T> = std::result::Result<T, RelayError>;

/// Failure reported by a command's `execute` or `undo`.
///
/// Commands never panic or unwind to signal failure; they hand one of these
/// back inside a [`CommandResult`](crate::command::CommandResult).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    /// Temporary failure such as a lost connection
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Receiver did not answer in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Failure that will not go away by retrying
    #[error("Permanent failure: {0}")]
    Permanent(String),

    /// Device receiver rejected the operation
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Account receiver rejected the operation
    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    /// Input was rejected before reaching the receiver
    #[error("Validation failed: {0}")]
    Validation(String),

    /// `execute` called on a command that already executed
    #[error("Command already executed")]
    AlreadyExecuted,

    /// `execute` called on a command that was rolled back
    #[error("Command already rolled back")]
    AlreadyRolledBack,

    /// `undo` called on a command that is not in the executed state
    #[error("Nothing to undo: command is {0}")]
    NotExecuted(CommandState),

    /// Composite failed and has been rolled back
    #[error(transparent)]
    Transaction(Box<TransactionError>),

    /// One or more steps could not be undone
    #[error("Rollback incomplete: {} step(s) failed to undo", .0.len())]
    Rollback(Vec<RollbackError>),
}

impl CommandError {
    /// Coarse category for reporting and matching
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::Transient(_) | CommandError::Timeout(_) => ErrorKind::Transient,
            CommandError::Permanent(_) => ErrorKind::Permanent,
            CommandError::Device(_) => ErrorKind::Device,
            CommandError::Account(_) => ErrorKind::Account,
            CommandError::Validation(_) => ErrorKind::Validation,
            CommandError::AlreadyExecuted
            | CommandError::AlreadyRolledBack
            | CommandError::NotExecuted(_) => ErrorKind::Lifecycle,
            CommandError::Transaction(_) => ErrorKind::Transaction,
            CommandError::Rollback(_) => ErrorKind::Rollback,
        }
    }

    /// Check if this error is transient (temporary, worth retrying)
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl Retryable for CommandError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

impl From<TransactionError> for CommandError {
    fn from(err: TransactionError) -> Self {
        CommandError::Transaction(Box::new(err))
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Retryable failures
    Transient,
    /// Non-retryable failures without a more specific category
    Permanent,
    /// Device receiver failures
    Device,
    /// Account receiver failures
    Account,
    /// Rejected input
    Validation,
    /// Command called in the wrong lifecycle state
    Lifecycle,
    /// Composite failure after rollback
    Transaction,
    /// Failure while undoing
    Rollback,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Permanent => write!(f, "permanent"),
            ErrorKind::Device => write!(f, "device"),
            ErrorKind::Account => write!(f, "account"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Lifecycle => write!(f, "lifecycle"),
            ErrorKind::Transaction => write!(f, "transaction"),
            ErrorKind::Rollback => write!(f, "rollback"),
        }
    }
}

/// A step that could not be undone during rollback
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Undo of step {step} ({description}) failed: {error}")]
pub struct RollbackError {
    /// Index of the step inside its composite
    pub step: usize,
    /// Description of the step
    pub description: String,
    /// What the step's undo reported
    pub error: CommandError,
}

/// Aggregate failure of an atomic composite.
///
/// Produced only after every already-executed step has had its undo attempted.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct TransactionError {
    /// Name of the composite
    pub composite: String,
    /// Index of the step that failed, `None` if the composite refused to run at all
    pub failed_step: Option<usize>,
    /// Error reported by the failing step
    pub cause: CommandError,
    /// Undo failures met while rolling back, in rollback order
    pub rollback_errors: Vec<RollbackError>,
}

impl TransactionError {
    /// True when every executed step was undone cleanly
    pub fn is_clean_rollback(&self) -> bool {
        self.rollback_errors.is_empty()
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failed_step {
            Some(step) => write!(
                f,
                "Transaction '{}' rolled back after step {} failed: {}",
                self.composite, step, self.cause
            )?,
            None => write!(
                f,
                "Transaction '{}' refused to run: {}",
                self.composite, self.cause
            )?,
        }

        if !self.rollback_errors.is_empty() {
            write!(
                f,
                " ({} rollback error(s))",
                self.rollback_errors.len()
            )?;
        }

        Ok(())
    }
}

/// Errors from the ambient layer: configuration and logging setup
#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Retry policy or dead-letter settings were rejected
    #[error(transparent)]
    Resilience(#[from] ResilienceError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
