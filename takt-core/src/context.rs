//! Process-wide context: role, read-only mode, license status, shutdown.
//!
//! Exactly one `ProcessContext` exists per running process. It is created at
//! startup and shared as `Arc<ProcessContext>` with every component that
//! needs it.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use takt_types::LicenseStatus;

use crate::sync::{CancelToken, RetryPolicy};

pub struct ProcessContext {
    is_server: bool,
    read_only: AtomicBool,
    license_status: RwLock<LicenseStatus>,
    retry: RetryPolicy,
    shutdown: CancelToken,
}

impl ProcessContext {
    pub fn new(is_server: bool, retry: RetryPolicy) -> Self {
        Self {
            is_server,
            read_only: AtomicBool::new(false),
            license_status: RwLock::new(LicenseStatus::Valid),
            retry,
            shutdown: CancelToken::new(),
        }
    }

    /// Server-role context with default lock timings.
    pub fn server() -> Self {
        Self::new(true, RetryPolicy::default())
    }

    /// Gates recording and other server-side effects.
    pub fn is_server(&self) -> bool {
        self.is_server
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    pub fn license_status(&self) -> LicenseStatus {
        *self.license_status.read()
    }

    /// Only the dispatcher calls this, while applying a state switch.
    pub(crate) fn set_system_state(&self, read_only: bool, status: LicenseStatus) {
        *self.license_status.write() = status;
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn shutdown_token(&self) -> &CancelToken {
        &self.shutdown
    }

    pub fn request_shutdown(&self) {
        log::info!("shutdown requested");
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self::server()
    }
}
