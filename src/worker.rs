/*!
 * Consumer-side worker: executes queued commands under a retry policy
 *
 * Each dequeued envelope ends in exactly one of two places: acknowledged after
 * a successful execute, or recorded in the dead-letter queue once retries are
 * exhausted or the error is not retryable. Retries run in place on the same
 * envelope and command instance rather than going back to the tail of the
 * queue. No queue lock is held during execute or backoff.
 */

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use relay_core_resilience::{DeadLetterQueue, FailureReason, RetryPolicy, Retryable};
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::error::{CommandError, Result};
use crate::queue::{CommandEnvelope, Queue};

/// A command that will not be retried again
pub struct DeadLetterRecord {
    envelope: CommandEnvelope,
    last_error: CommandError,
    reason: FailureReason,
    dead_lettered_at: SystemTime,
}

impl DeadLetterRecord {
    pub fn envelope(&self) -> &CommandEnvelope {
        &self.envelope
    }

    pub fn last_error(&self) -> &CommandError {
        &self.last_error
    }

    pub fn attempts_made(&self) -> u32 {
        self.reason.attempts()
    }

    pub fn reason(&self) -> FailureReason {
        self.reason
    }

    pub fn dead_lettered_at(&self) -> SystemTime {
        self.dead_lettered_at
    }

    pub fn into_envelope(self) -> CommandEnvelope {
        self.envelope
    }
}

impl fmt::Debug for DeadLetterRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeadLetterRecord")
            .field("envelope", &self.envelope)
            .field("last_error", &self.last_error)
            .field("reason", &self.reason)
            .field("dead_lettered_at", &self.dead_lettered_at)
            .finish()
    }
}

/// What happened to one dequeued envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Executed successfully and acknowledged
    Processed,
    /// Moved to the dead-letter queue
    DeadLettered,
}

/// Totals for one drain pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    pub processed: usize,
    pub dead_lettered: usize,
}

impl DrainReport {
    /// Envelopes handled in this pass
    pub fn total(&self) -> usize {
        self.processed + self.dead_lettered
    }

    /// `(processed_count, dead_letter_count)`
    pub fn as_tuple(&self) -> (usize, usize) {
        (self.processed, self.dead_lettered)
    }
}

/// Pulls envelopes off a queue and executes them
pub struct CommandWorker {
    queue: Arc<dyn Queue>,
    policy: RetryPolicy,
    dead_letters: DeadLetterQueue<DeadLetterRecord>,
}

impl CommandWorker {
    pub fn new(queue: Arc<dyn Queue>, policy: RetryPolicy) -> Self {
        Self {
            queue,
            policy,
            dead_letters: DeadLetterQueue::unbounded(),
        }
    }

    /// Build a worker from configuration, validating the retry policy and dead-letter capacity
    pub fn from_config(queue: Arc<dyn Queue>, config: &WorkerConfig) -> Result<Self> {
        let dead_letters = match config.dead_letter_capacity {
            Some(capacity) => DeadLetterQueue::bounded(capacity)?,
            None => DeadLetterQueue::unbounded(),
        };

        Ok(Self {
            queue,
            policy: config.retry_policy()?,
            dead_letters,
        })
    }

    /// Replace the dead-letter store, e.g. with a bounded one
    pub fn with_dead_letter_queue(
        mut self,
        dead_letters: DeadLetterQueue<DeadLetterRecord>,
    ) -> Self {
        self.dead_letters = dead_letters;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn queue(&self) -> &Arc<dyn Queue> {
        &self.queue
    }

    pub fn dead_letters(&self) -> &DeadLetterQueue<DeadLetterRecord> {
        &self.dead_letters
    }

    /// Remove all dead-letter records, e.g. to inspect or resubmit them
    pub fn take_dead_letters(&mut self) -> Vec<DeadLetterRecord> {
        self.dead_letters.drain()
    }

    /// Process the envelopes present when the call starts.
    ///
    /// Stops early if the queue runs dry (other workers may be draining too).
    /// Commands enqueued after the call starts are left for the next pass.
    pub async fn drain(&mut self) -> DrainReport {
        let budget = self.queue.size();
        let mut report = DrainReport::default();

        for _ in 0..budget {
            match self.poll_once().await {
                Some(Outcome::Processed) => report.processed += 1,
                Some(Outcome::DeadLettered) => report.dead_lettered += 1,
                None => break,
            }
        }

        info!(
            queue = %self.queue.name(),
            processed = report.processed,
            dead_lettered = report.dead_lettered,
            "Drain complete"
        );
        report
    }

    /// Process at most one envelope; `None` if the queue was empty
    pub async fn poll_once(&mut self) -> Option<Outcome> {
        let envelope = self.queue.dequeue()?;
        Some(self.process(envelope).await)
    }

    async fn process(&mut self, mut envelope: CommandEnvelope) -> Outcome {
        let policy = envelope
            .retry_policy()
            .cloned()
            .unwrap_or_else(|| self.policy.clone());

        loop {
            let attempt = envelope.record_attempt();
            let result = envelope.command_mut().execute();

            if result.is_success() {
                info!(
                    command = %envelope.command().description(),
                    attempt,
                    "Executed: {}",
                    result.message()
                );
                return Outcome::Processed;
            }

            let last_error = result
                .into_error()
                .unwrap_or_else(|| CommandError::Permanent("command reported failure".to_string()));

            if policy.should_retry(attempt, &last_error) {
                let delay = policy.delay_for(attempt);
                warn!(
                    command = %envelope.command().description(),
                    attempt,
                    max_attempts = policy.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "Retrying command"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                continue;
            }

            let reason = if last_error.is_retryable() {
                FailureReason::RetriesExhausted { attempts: attempt }
            } else {
                FailureReason::NonRetryable { attempts: attempt }
            };
            error!(
                command = %envelope.command().description(),
                attempts = attempt,
                error = %last_error,
                "Dead-lettered: {}",
                reason
            );

            let record = DeadLetterRecord {
                envelope,
                last_error,
                reason,
                dead_lettered_at: SystemTime::now(),
            };
            if let Some(evicted) = self.dead_letters.push(record) {
                warn!(
                    command = %evicted.envelope.command().description(),
                    "Dead-letter queue full, evicted oldest record"
                );
            }
            return Outcome::DeadLettered;
        }
    }
}
