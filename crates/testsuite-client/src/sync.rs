//! Poison-tolerant locking.

use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Lock `mutex`, recovering the guard if a previous holder panicked.
///
/// Guarded values in this crate are plain snapshots, so a poisoned lock
/// still holds a consistent value.
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("{} lock poisoned, recovering", what);
            poisoned.into_inner()
        }
    }
}
