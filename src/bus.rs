/*!
 * Producer-side entry point for queued commands
 */

use std::sync::Arc;

use relay_core_resilience::RetryPolicy;
use tracing::debug;

use crate::command::{Command, CommandId};
use crate::queue::{CommandEnvelope, Queue};
use crate::worker::DeadLetterRecord;

/// Wraps commands in envelopes and places them on a queue.
///
/// Producers go through the bus and never touch the queue directly.
#[derive(Clone)]
pub struct CommandBus {
    queue: Arc<dyn Queue>,
}

impl CommandBus {
    pub fn new(queue: Arc<dyn Queue>) -> Self {
        Self { queue }
    }

    /// Enqueue a command with a fresh envelope, returning its id for cancellation
    pub fn send(&self, command: impl Command + 'static) -> CommandId {
        self.send_envelope(CommandEnvelope::new(Box::new(command)))
    }

    /// Enqueue an already boxed command
    pub fn send_boxed(&self, command: Box<dyn Command>) -> CommandId {
        self.send_envelope(CommandEnvelope::new(command))
    }

    /// Enqueue a command that the worker should retry under `policy` instead of its default
    pub fn send_with_policy(
        &self,
        command: impl Command + 'static,
        policy: RetryPolicy,
    ) -> CommandId {
        self.send_envelope(CommandEnvelope::new(Box::new(command)).with_retry_policy(policy))
    }

    /// Put a dead-lettered command back on the queue with its attempt count reset.
    ///
    /// Workers never do this on their own; it is an explicit operator action.
    pub fn resubmit(&self, record: DeadLetterRecord) -> CommandId {
        let mut envelope = record.into_envelope();
        envelope.reset_for_resubmit();
        self.send_envelope(envelope)
    }

    /// Remove a command that has not been picked up by a worker yet.
    ///
    /// Returns false if a worker already dequeued it; a running command is never interrupted.
    pub fn cancel(&self, id: CommandId) -> bool {
        match self.queue.cancel(id) {
            Some(envelope) => {
                debug!(
                    command = %envelope.command().description(),
                    queue = %self.queue.name(),
                    "Cancelled queued command"
                );
                true
            }
            None => false,
        }
    }

    /// Commands waiting on the queue
    pub fn pending(&self) -> usize {
        self.queue.size()
    }

    fn send_envelope(&self, envelope: CommandEnvelope) -> CommandId {
        let id = envelope.id();
        debug!(
            command = %envelope.command().description(),
            queue = %self.queue.name(),
            "Enqueued command"
        );
        self.queue.enqueue(envelope);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryQueue;
    use crate::receivers::email::{EmailService, SendEmailCommand};
    use crate::receivers::shared;

    #[test]
    fn test_send_wraps_in_fresh_envelope() {
        let queue = Arc::new(InMemoryQueue::new("mail"));
        let bus = CommandBus::new(queue.clone());
        let service = shared(EmailService::default());

        let id = bus.send(SendEmailCommand::new(service, "a@example.com", "hi", ""));

        assert_eq!(bus.pending(), 1);
        let envelope = queue.dequeue().unwrap();
        assert_eq!(envelope.id(), id);
        assert_eq!(envelope.attempt_count(), 0);
        assert!(envelope.retry_policy().is_none());
    }

    #[test]
    fn test_send_with_policy_attaches_override() {
        let queue = Arc::new(InMemoryQueue::new("mail"));
        let bus = CommandBus::new(queue.clone());
        let service = shared(EmailService::default());

        bus.send_with_policy(
            SendEmailCommand::new(service, "a@example.com", "hi", ""),
            RetryPolicy::immediate(7),
        );

        let envelope = queue.dequeue().unwrap();
        assert_eq!(envelope.retry_policy().map(|p| p.max_retries()), Some(7));
    }

    #[test]
    fn test_cancel_before_dequeue() {
        let queue = Arc::new(InMemoryQueue::new("mail"));
        let bus = CommandBus::new(queue.clone());
        let service = shared(EmailService::default());

        let id = bus.send(SendEmailCommand::new(service, "a@example.com", "hi", ""));
        assert!(bus.cancel(id));
        assert!(!bus.cancel(id));
        assert_eq!(bus.pending(), 0);
    }
}
