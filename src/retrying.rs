/*!
 * Per-command retry for synchronous callers
 *
 * Wraps a command so that its own `execute` retries in place under a
 * [`RetryPolicy`]. Used for steps of an atomic composite that talk to flaky
 * receivers: the composite only sees the final outcome.
 */

use std::thread;

use relay_core_resilience::RetryPolicy;
use tracing::warn;

use crate::command::{Command, CommandId, CommandResult, CommandState};

/// Command wrapper that retries `execute` according to its policy.
///
/// Backoff delays are applied with a blocking sleep on the calling thread.
pub struct RetryingCommand<C: Command> {
    inner: C,
    policy: RetryPolicy,
    attempts: u32,
}

impl<C: Command> RetryingCommand<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            attempts: 0,
        }
    }

    /// Attempts made by the last `execute`
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: Command> Command for RetryingCommand<C> {
    fn id(&self) -> CommandId {
        self.inner.id()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn state(&self) -> CommandState {
        self.inner.state()
    }

    fn execute(&mut self) -> CommandResult {
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.attempts = attempt;

            let result = self.inner.execute();
            if result.is_success() {
                return result;
            }

            let retry = result
                .error()
                .is_some_and(|error| self.policy.should_retry(attempt, error));
            if !retry {
                return result;
            }

            let delay = self.policy.delay_for(attempt);
            warn!(
                command = %self.inner.description(),
                attempt,
                max_attempts = self.policy.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                "Retrying after failure: {}",
                result.message()
            );
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
    }

    fn undo(&mut self) -> CommandResult {
        self.inner.undo()
    }
}
