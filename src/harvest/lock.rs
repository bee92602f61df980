//! Single-flight guard for harvest runs.
//!
//! At most one run may hold a [`RunLock`] at a time. The lock is released
//! when the returned [`RunGuard`] drops, including on error and panic paths.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

static GLOBAL: RunLock = RunLock::new();

#[derive(Debug, Default)]
pub struct RunLock {
    running: AtomicBool,
}

impl RunLock {
    pub const fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
        }
    }

    /// Process-wide lock shared by every caller of
    /// [`harvest_and_store`](crate::harvest::pipeline::harvest_and_store).
    pub fn global() -> &'static RunLock {
        &GLOBAL
    }

    /// Acquires the lock, or returns `None` if a run is already in progress.
    pub fn try_acquire(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| {
                debug!("Run lock acquired");
                RunGuard { lock: self }
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Holds the [`RunLock`] until dropped.
#[derive(Debug)]
pub struct RunGuard<'a> {
    lock: &'a RunLock,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.lock.running.store(false, Ordering::Release);
        debug!("Run lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_holder() {
        let lock = RunLock::new();

        let guard = lock.try_acquire();
        assert!(guard.is_some());
        assert!(lock.is_running());
        assert!(lock.try_acquire().is_none());

        drop(guard);
        assert!(!lock.is_running());
        assert!(lock.try_acquire().is_some());
    }

    #[test]
    fn test_released_on_panic() {
        let lock = RunLock::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = lock.try_acquire().unwrap();
            panic!("harvest blew up");
        }));

        assert!(result.is_err());
        assert!(!lock.is_running());
    }
}
