//! Lock utilities
//!
//! The discovery and realtime layers guard small registries (visited sets,
//! listener maps, peer tables) with `std::sync::Mutex`. A panicking listener
//! must not take those registries down with it, so poisoned locks are
//! recovered instead of propagated.

use std::sync::{Mutex, MutexGuard};
use tracing::warn;

/// Lock a mutex, recovering the guard if a previous holder panicked
pub fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Recovering poisoned lock");
            poisoned.into_inner()
        }
    }
}
