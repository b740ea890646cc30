use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Locks `mutex`, recovering the guard if another thread poisoned it.
///
/// The guarded maps stay structurally valid across a panic in another
/// thread; state may at worst be stale.
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, op: &'static str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(op, "recovered a poisoned cache lock");
            poisoned.into_inner()
        }
    }
}
