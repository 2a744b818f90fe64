//! Lock coordination: guarded values and retry-with-backoff acquisition.

mod backoff;
mod guarded;

pub use backoff::{
    retry_until_acquired, Backoff, CancelToken, RetryPolicy, DEFAULT_CEILING, DEFAULT_GROWTH,
    DEFAULT_INITIAL_TIMEOUT,
};
pub use guarded::{ExclusiveAccess, Guarded, SharedAccess};
