/*!
 * Relay - reversible, retryable commands
 *
 * Requests are wrapped as command objects that can be executed, undone,
 * composed into all-or-nothing transactions, and queued for a worker that
 * retries transient failures and dead-letters the rest.
 *
 * - `command`: the Command trait, lifecycle states and results
 * - `composite`: atomic composites with reverse-order rollback
 * - `queue`, `bus`, `worker`: FIFO transport, producer side, consumer side
 * - `receivers`: sample receivers (PLC device, bank account, email service)
 *
 * Retry policies and the dead-letter store live in `relay-core-resilience`.
 */

pub mod bus;
pub mod command;
pub mod composite;
pub mod config;
pub mod error;
pub mod logging;
pub mod queue;
pub mod receivers;
pub mod retrying;
pub mod worker;

// Re-export commonly used types
pub use bus::CommandBus;
pub use command::{Command, CommandCore, CommandId, CommandResult, CommandState};
pub use composite::{AtomicCompositeCommand, CompositeState};
pub use config::{BackoffConfig, LogLevel, LoggingConfig, RelayConfig, WorkerConfig};
pub use error::{CommandError, ErrorKind, RelayError, Result, RollbackError, TransactionError};
pub use queue::{CommandEnvelope, InMemoryQueue, Queue};
pub use retrying::RetryingCommand;
pub use worker::{CommandWorker, DeadLetterRecord, DrainReport, Outcome};

pub use relay_core_resilience::{
    Backoff, DeadLetterQueue, DeadLetterStats, FailureReason, RetryPolicy, Retryable,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
