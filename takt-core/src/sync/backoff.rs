//! Growing timeouts for acquisitions that must eventually succeed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::AcquireError;

pub const DEFAULT_INITIAL_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_GROWTH: f64 = 1.06;
pub const DEFAULT_CEILING: Duration = Duration::from_millis(2250);

/// Shared cancellation flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub growth: f64,
    pub ceiling: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: DEFAULT_INITIAL_TIMEOUT,
            growth: DEFAULT_GROWTH,
            ceiling: DEFAULT_CEILING,
        }
    }
}

impl RetryPolicy {
    pub fn new(initial: Duration, growth: f64, ceiling: Duration) -> Self {
        Self {
            initial: initial.min(ceiling),
            growth: growth.max(1.0),
            ceiling,
        }
    }

    /// Same growth and ceiling, different starting timeout.
    pub fn starting_at(&self, initial: Duration) -> Self {
        Self::new(initial, self.growth, self.ceiling)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            next_ms: self.initial.as_nanos() as f64 / 1e6,
            growth: self.growth,
            ceiling_ms: self.ceiling.as_nanos() as f64 / 1e6,
        }
    }
}

/// Endless sequence of timeouts: `initial, initial*growth, ...` capped at the ceiling.
#[derive(Debug, Clone)]
pub struct Backoff {
    next_ms: f64,
    growth: f64,
    ceiling_ms: f64,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next_ms.min(self.ceiling_ms);
        self.next_ms = (current * self.growth).min(self.ceiling_ms);
        Some(Duration::from_nanos((current * 1e6).round() as u64))
    }
}

/// Run `attempt` with growing timeouts until it succeeds or `cancel` fires.
///
/// `attempt` must not block longer than the timeout it is handed. A
/// `Timeout` result is swallowed and retried; `Cancelled` is returned as is.
pub fn retry_until_acquired<A>(
    label: &'static str,
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut attempt: impl FnMut(Duration) -> Result<A, AcquireError>,
) -> Result<A, AcquireError> {
    for timeout in policy.backoff() {
        if cancel.is_cancelled() {
            return Err(AcquireError::Cancelled { label });
        }
        match attempt(timeout) {
            Ok(access) => return Ok(access),
            Err(AcquireError::Timeout { waited, .. }) => {
                log::debug!(target: "lock", "{} contended after {:?}, backing off", label, waited);
            }
            Err(e @ AcquireError::Cancelled { .. }) => return Err(e),
        }
    }
    unreachable!("backoff sequence is endless")
}
