/*!
 * Reference receivers and the commands that drive them
 *
 * Each receiver follows the same convention: operations that mutate state
 * return the value they replaced, so the command that called them can put it
 * back on undo.
 */

pub mod account;
pub mod device;
pub mod email;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

/// Receiver handle shared between the commands that target it.
///
/// Commands lock the receiver for the length of one `execute` or `undo`.
/// Running two commands against the same receiver from different workers at
/// the same time is the caller's responsibility to avoid.
pub type Shared<R> = Arc<Mutex<R>>;

/// Wrap a receiver for sharing between commands
pub fn shared<R>(receiver: R) -> Shared<R> {
    Arc::new(Mutex::new(receiver))
}

/// Lock a shared receiver, recovering the guard if a previous holder panicked
pub(crate) fn lock<R: ?Sized>(receiver: &Mutex<R>) -> MutexGuard<'_, R> {
    receiver.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read a label for a command description without waiting on the receiver.
///
/// Falls back to `<locked>` while someone else holds the lock, so a command can
/// be built by a caller that is itself holding the receiver.
pub(crate) fn label<R: ?Sized, F>(receiver: &Mutex<R>, name: F) -> String
where
    F: FnOnce(&R) -> String,
{
    match receiver.try_lock() {
        Ok(guard) => name(&*guard),
        Err(TryLockError::Poisoned(poisoned)) => name(&*poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => LOCKED_LABEL.to_string(),
    }
}

const LOCKED_LABEL: &str = "<locked>";
