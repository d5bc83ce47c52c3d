//! Dead-Letter Queue: quarantine for work that will not be retried again
//!
//! When an item exhausts its retry budget, or fails with an error that is not
//! worth retrying, it is routed here instead of being dropped. Callers can
//! inspect the entries, drain them for reporting, or hand them back to a
//! producer for manual resubmission. Nothing in this crate resubmits entries
//! on its own.
//!
//! # Design
//!
//! The queue is generic over the entry type so the resilience crate stays free
//! of any knowledge about commands or envelopes. It is unbounded by default.
//! A bounded queue drops its oldest entry on overflow and counts the drop in
//! [`DeadLetterStats::total_dropped`], returning the evicted entry to the
//! caller so it can be logged.
//!
//! # Example
//!
//! ```
//! use relay_core_resilience::dead_letter::{DeadLetterQueue, FailureReason};
//!
//! let mut dlq = DeadLetterQueue::unbounded();
//! dlq.push(("send-email", FailureReason::RetriesExhausted { attempts: 4 }));
//!
//! assert_eq!(dlq.len(), 1);
//! let entries = dlq.drain();
//! assert_eq!(entries.len(), 1);
//! assert!(dlq.is_empty());
//! ```

use std::collections::VecDeque;
use std::fmt;

use crate::error::ResilienceError;

/// Reason an item was sent to the dead-letter queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Every permitted attempt failed with a retryable error
    RetriesExhausted { attempts: u32 },

    /// The error was classified as not retryable, so no further attempts were made
    NonRetryable { attempts: u32 },
}

impl FailureReason {
    /// Attempts made before the item was quarantined
    pub fn attempts(&self) -> u32 {
        match self {
            FailureReason::RetriesExhausted { attempts }
            | FailureReason::NonRetryable { attempts } => *attempts,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::RetriesExhausted { attempts } => {
                write!(f, "retries exhausted after {} attempts", attempts)
            }
            FailureReason::NonRetryable { attempts } => {
                write!(f, "non-retryable error after {} attempts", attempts)
            }
        }
    }
}

/// In-memory dead-letter queue, optionally bounded
#[derive(Debug)]
pub struct DeadLetterQueue<T> {
    entries: VecDeque<T>,
    max_capacity: Option<usize>,
    total_received: u64,
    total_dropped: u64,
}

impl<T> Default for DeadLetterQueue<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T> DeadLetterQueue<T> {
    /// Create a queue that never evicts entries
    pub fn unbounded() -> Self {
        Self {
            entries: VecDeque::new(),
            max_capacity: None,
            total_received: 0,
            total_dropped: 0,
        }
    }

    /// Create a queue holding at most `max_capacity` entries
    pub fn bounded(max_capacity: usize) -> Result<Self, ResilienceError> {
        if max_capacity == 0 {
            return Err(ResilienceError::ZeroCapacity);
        }

        Ok(Self {
            entries: VecDeque::with_capacity(max_capacity.min(1024)),
            max_capacity: Some(max_capacity),
            total_received: 0,
            total_dropped: 0,
        })
    }

    /// Append an entry.
    ///
    /// If a bounded queue is full, the oldest entry is evicted and returned.
    pub fn push(&mut self, entry: T) -> Option<T> {
        self.total_received += 1;

        let evicted = match self.max_capacity {
            Some(max) if self.entries.len() >= max => {
                self.total_dropped += 1;
                self.entries.pop_front()
            }
            _ => None,
        };

        self.entries.push_back(entry);
        evicted
    }

    /// Remove and return every entry, oldest first
    pub fn drain(&mut self) -> Vec<T> {
        self.entries.drain(..).collect()
    }

    /// Peek at all entries without removing them
    pub fn entries(&self) -> &VecDeque<T> {
        &self.entries
    }

    /// Entries matching a predicate
    pub fn filter<F>(&self, predicate: F) -> Vec<&T>
    where
        F: Fn(&T) -> bool,
    {
        self.entries.iter().filter(|e| predicate(e)).collect()
    }

    /// Number of entries currently in the queue
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get statistics
    pub fn stats(&self) -> DeadLetterStats {
        DeadLetterStats {
            current_count: self.entries.len(),
            max_capacity: self.max_capacity,
            total_received: self.total_received,
            total_dropped: self.total_dropped,
        }
    }
}

/// Statistics for the dead-letter queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterStats {
    /// Current number of entries
    pub current_count: usize,
    /// Maximum capacity, `None` when unbounded
    pub max_capacity: Option<usize>,
    /// Total entries ever received
    pub total_received: u64,
    /// Total entries evicted due to capacity overflow
    pub total_dropped: u64,
}
