/*!
 * FIFO transport of command envelopes
 *
 * The queue is the only mutable state shared between workers. Every operation
 * takes the lock for a single push, pop, or removal and releases it before
 * returning, so no two workers can dequeue the same envelope and nobody holds
 * the lock while a command runs or backs off.
 */

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use relay_core_resilience::RetryPolicy;

use crate::command::{Command, CommandId};

/// A queued command plus its delivery metadata
pub struct CommandEnvelope {
    command: Box<dyn Command>,
    attempt_count: u32,
    enqueued_at: SystemTime,
    retry_policy: Option<RetryPolicy>,
}

impl CommandEnvelope {
    /// Wrap a command with no attempts made yet
    pub fn new(command: Box<dyn Command>) -> Self {
        Self {
            command,
            attempt_count: 0,
            enqueued_at: SystemTime::now(),
            retry_policy: None,
        }
    }

    /// Override the worker's retry policy for this command
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn id(&self) -> CommandId {
        self.command.id()
    }

    pub fn command(&self) -> &dyn Command {
        self.command.as_ref()
    }

    pub fn command_mut(&mut self) -> &mut dyn Command {
        self.command.as_mut()
    }

    pub fn into_command(self) -> Box<dyn Command> {
        self.command
    }

    /// Attempts made so far
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn enqueued_at(&self) -> SystemTime {
        self.enqueued_at
    }

    pub fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry_policy.as_ref()
    }

    pub(crate) fn record_attempt(&mut self) -> u32 {
        self.attempt_count += 1;
        self.attempt_count
    }

    /// Clear delivery history so the envelope can be sent again
    pub(crate) fn reset_for_resubmit(&mut self) {
        self.attempt_count = 0;
        self.enqueued_at = SystemTime::now();
    }
}

impl fmt::Debug for CommandEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEnvelope")
            .field("id", &self.command.id())
            .field("command", &self.command.description())
            .field("state", &self.command.state())
            .field("attempt_count", &self.attempt_count)
            .field("enqueued_at", &self.enqueued_at)
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

/// FIFO queue of envelopes, safe to share between workers
pub trait Queue: Send + Sync {
    fn name(&self) -> &str;

    /// Append at the tail
    fn enqueue(&self, envelope: CommandEnvelope);

    /// Remove and return the head, or `None` when the queue is empty. Never blocks waiting for work.
    fn dequeue(&self) -> Option<CommandEnvelope>;

    fn size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Remove a not-yet-dequeued envelope
    fn cancel(&self, id: CommandId) -> Option<CommandEnvelope>;
}

/// Mutex-guarded in-process queue
pub struct InMemoryQueue {
    name: String,
    envelopes: Mutex<VecDeque<CommandEnvelope>>,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            envelopes: Mutex::new(VecDeque::new()),
        }
    }

    fn envelopes(&self) -> MutexGuard<'_, VecDeque<CommandEnvelope>> {
        // Each critical section is a single VecDeque call, so a poisoned lock still holds a valid deque.
        self.envelopes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for InMemoryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryQueue")
            .field("name", &self.name)
            .field("size", &self.size())
            .finish()
    }
}

impl Queue for InMemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn enqueue(&self, envelope: CommandEnvelope) {
        self.envelopes().push_back(envelope);
    }

    fn dequeue(&self) -> Option<CommandEnvelope> {
        self.envelopes().pop_front()
    }

    fn size(&self) -> usize {
        self.envelopes().len()
    }

    fn cancel(&self, id: CommandId) -> Option<CommandEnvelope> {
        let mut envelopes = self.envelopes();
        let index = envelopes.iter().position(|e| e.id() == id)?;
        envelopes.remove(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receivers::account::{BankAccount, DepositCommand};
    use crate::receivers::shared;

    fn envelope(amount: i64) -> CommandEnvelope {
        let account = shared(BankAccount::new("acct", 0));
        CommandEnvelope::new(Box::new(DepositCommand::new(account, amount)))
    }

    #[test]
    fn test_fifo_order() {
        let queue = InMemoryQueue::new("orders");
        let first = envelope(1);
        let second = envelope(2);
        let (first_id, second_id) = (first.id(), second.id());

        queue.enqueue(first);
        queue.enqueue(second);
        assert_eq!(queue.size(), 2);

        assert_eq!(queue.dequeue().map(|e| e.id()), Some(first_id));
        assert_eq!(queue.dequeue().map(|e| e.id()), Some(second_id));
        assert!(queue.dequeue().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_cancel_removes_only_target() {
        let queue = InMemoryQueue::new("orders");
        let keep = envelope(1);
        let drop = envelope(2);
        let (keep_id, drop_id) = (keep.id(), drop.id());
        queue.enqueue(keep);
        queue.enqueue(drop);

        let cancelled = queue.cancel(drop_id).unwrap();
        assert_eq!(cancelled.id(), drop_id);
        assert!(queue.cancel(drop_id).is_none());

        assert_eq!(queue.size(), 1);
        assert_eq!(queue.dequeue().map(|e| e.id()), Some(keep_id));
    }

    #[test]
    fn test_new_envelope_has_no_attempts() {
        let mut env = envelope(5);
        assert_eq!(env.attempt_count(), 0);
        assert!(env.retry_policy().is_none());

        assert_eq!(env.record_attempt(), 1);
        env.reset_for_resubmit();
        assert_eq!(env.attempt_count(), 0);
    }
}
