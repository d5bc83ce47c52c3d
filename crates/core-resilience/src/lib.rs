//! Relay Core Resilience: Pure-logic retry and quarantine primitives
//!
//! # Overview
//!
//! This crate provides the failure-handling building blocks that the command
//! worker is assembled from:
//!
//! - **Retry Policy**: Decides whether a failed attempt should be retried and
//!   how long to wait first, with fixed or capped exponential backoff
//! - **Retryable**: The classification hook an error implements to opt into retries
//! - **Dead-Letter Queue**: Quarantine for items that failed for good
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Commands, receivers, or queues
//! - Threads, runtimes, or timers (delays are returned, never slept)
//!
//! # Architecture
//!
//! ```text
//!         attempt fails
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Retry Policy                      │  ← should_retry(attempt, error)
//! │  (max retries + backoff schedule)       │  ← delay_for(attempt)
//! └─────────────┬───────────────────────────┘
//!               │ exhausted or non-retryable?
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Dead-Letter Queue                 │  ← Permanent failure quarantine
//! │  (unbounded or bounded ring)            │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage Example
//!
//! ```
//! use relay_core_resilience::prelude::*;
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! struct Timeout;
//! impl Retryable for Timeout {
//!     fn is_retryable(&self) -> bool { true }
//! }
//!
//! let policy = RetryPolicy::fixed(2, Duration::from_millis(50));
//! let mut dead_letters = DeadLetterQueue::unbounded();
//!
//! let mut attempts = 0;
//! loop {
//!     attempts += 1;
//!     let error = Timeout; // every attempt fails in this example
//!     if policy.should_retry(attempts, &error) {
//!         let _pause = policy.delay_for(attempts); // caller decides how to wait
//!         continue;
//!     }
//!     dead_letters.push(FailureReason::RetriesExhausted { attempts });
//!     break;
//! }
//!
//! assert_eq!(attempts, 3);
//! assert_eq!(dead_letters.len(), 1);
//! ```

pub mod dead_letter;
pub mod error;
pub mod retry;

// Re-export main types for convenience
pub use dead_letter::{DeadLetterQueue, DeadLetterStats, FailureReason};
pub use error::ResilienceError;
pub use retry::{Backoff, RetryPolicy, Retryable};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use relay_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::dead_letter::{DeadLetterQueue, DeadLetterStats, FailureReason};
    pub use super::error::ResilienceError;
    pub use super::retry::{Backoff, RetryPolicy, Retryable};
}
