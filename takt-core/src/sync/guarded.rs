//! `Guarded<T>`: a value behind a reader/writer lock with timed acquisition.
//!
//! There is no unbounded blocking entry point. Every acquisition takes a
//! timeout; callers that must eventually succeed go through
//! `enter_shared`/`enter_exclusive`, which retry with a growing timeout.
//! Access handles release the lock when dropped, on every exit path.

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::backoff::{retry_until_acquired, CancelToken, RetryPolicy};
use crate::error::AcquireError;

pub struct Guarded<T> {
    label: &'static str,
    lock: RwLock<T>,
}

impl<T> Guarded<T> {
    pub fn new(label: &'static str, value: T) -> Self {
        Self {
            label,
            lock: RwLock::new(value),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn try_enter_shared(&self, timeout: Duration) -> Result<SharedAccess<'_, T>, AcquireError> {
        match self.lock.try_read_for(timeout) {
            Some(guard) => {
                log::trace!(target: "lock", "{} entered shared", self.label);
                Ok(SharedAccess {
                    guard,
                    label: self.label,
                })
            }
            None => Err(AcquireError::Timeout {
                label: self.label,
                waited: timeout,
            }),
        }
    }

    pub fn try_enter_exclusive(
        &self,
        timeout: Duration,
    ) -> Result<ExclusiveAccess<'_, T>, AcquireError> {
        match self.lock.try_write_for(timeout) {
            Some(guard) => {
                log::trace!(target: "lock", "{} entered exclusive", self.label);
                Ok(ExclusiveAccess {
                    guard,
                    label: self.label,
                })
            }
            None => Err(AcquireError::Timeout {
                label: self.label,
                waited: timeout,
            }),
        }
    }

    /// Shared acquisition that retries until it succeeds or `cancel` fires.
    pub fn enter_shared(
        &self,
        policy: &RetryPolicy,
        cancel: &CancelToken,
    ) -> Result<SharedAccess<'_, T>, AcquireError> {
        retry_until_acquired(self.label, policy, cancel, |t| self.try_enter_shared(t))
    }

    /// Exclusive acquisition that retries until it succeeds or `cancel` fires.
    pub fn enter_exclusive(
        &self,
        policy: &RetryPolicy,
        cancel: &CancelToken,
    ) -> Result<ExclusiveAccess<'_, T>, AcquireError> {
        retry_until_acquired(self.label, policy, cancel, |t| self.try_enter_exclusive(t))
    }

    pub fn into_inner(self) -> T {
        self.lock.into_inner()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Guarded<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guarded").field("label", &self.label).finish_non_exhaustive()
    }
}

/// Shared access to a guarded value. Released on drop.
pub struct SharedAccess<'a, T> {
    guard: RwLockReadGuard<'a, T>,
    label: &'static str,
}

impl<T> Deref for SharedAccess<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> Drop for SharedAccess<'_, T> {
    fn drop(&mut self) {
        log::trace!(target: "lock", "{} released shared", self.label);
    }
}

/// Exclusive access to a guarded value. Released on drop.
pub struct ExclusiveAccess<'a, T> {
    guard: RwLockWriteGuard<'a, T>,
    label: &'static str,
}

impl<T> Deref for ExclusiveAccess<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for ExclusiveAccess<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for ExclusiveAccess<'_, T> {
    fn drop(&mut self) {
        log::trace!(target: "lock", "{} released exclusive", self.label);
    }
}
