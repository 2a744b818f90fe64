//! Periodic data-model fingerprint check.
//!
//! Runs only for offline-activated licenses. A failed check switches the
//! system to read-only; a danger-band result publishes one warning, repeated
//! only after a clean check in between.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use takt_types::LicenseStatus;

use super::fingerprint::FingerprintVerdict;
use super::manager::LicenseManager;
use crate::dispatch::{DispatchEvent, TransmissionDispatcher};

/// Result of one fingerprint check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Skipped,
    Clean,
    Warned,
    /// Danger persists; the warning was already sent.
    Suppressed,
    Failed(LicenseStatus),
}

pub struct FingerprintMonitor {
    manager: Arc<LicenseManager>,
    dispatcher: Arc<TransmissionDispatcher>,
    warned: bool,
}

impl FingerprintMonitor {
    pub fn new(manager: Arc<LicenseManager>, dispatcher: Arc<TransmissionDispatcher>) -> Self {
        Self {
            manager,
            dispatcher,
            warned: false,
        }
    }

    pub fn check(&mut self) -> CheckOutcome {
        if !self.manager.is_offline_activated() || self.dispatcher.context().is_read_only() {
            return CheckOutcome::Skipped;
        }
        match self.manager.recheck_fingerprint() {
            Ok(FingerprintVerdict::Clean) => {
                if self.warned {
                    log::info!(target: "license", "data model fingerprint is clean again");
                }
                self.warned = false;
                CheckOutcome::Clean
            }
            Ok(FingerprintVerdict::Danger(reports)) => {
                if self.warned {
                    return CheckOutcome::Suppressed;
                }
                let modules: Vec<_> = reports.iter().map(|r| r.module.name()).collect();
                let message = format!(
                    "the data model has drifted from the licensed one ({}); contact support before it diverges further",
                    modules.join(", ")
                );
                log::warn!(target: "license", "{}", message);
                self.dispatcher
                    .events()
                    .publish(&DispatchEvent::LicenseWarning { message });
                self.warned = true;
                CheckOutcome::Warned
            }
            Err(e) => {
                let status = e.status();
                log::error!(target: "license", "data model fingerprint check failed: {}", e);
                self.manager
                    .switch(self.dispatcher.as_ref(), true, status, e.to_string());
                CheckOutcome::Failed(status)
            }
        }
    }

    /// Start checking every `interval`. Returns `None` when the license was
    /// not activated offline.
    pub fn spawn(self, interval: Duration) -> Option<MonitorHandle> {
        if !self.manager.is_offline_activated() {
            log::debug!(target: "license", "license is not offline-activated; fingerprint monitor not started");
            return None;
        }
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let spawned = thread::Builder::new()
            .name("takt-license".into())
            .spawn(move || self.run(interval, shutdown_rx));
        match spawned {
            Ok(join_handle) => Some(MonitorHandle {
                shutdown_tx,
                join_handle: Some(join_handle),
            }),
            Err(e) => {
                log::error!(target: "license", "failed to spawn fingerprint monitor: {}", e);
                None
            }
        }
    }

    fn run(mut self, interval: Duration, shutdown_rx: Receiver<()>) {
        log::info!(target: "license", "fingerprint monitor running every {:?}", interval);
        let ticker = crossbeam_channel::tick(interval);
        loop {
            crossbeam_channel::select! {
                recv(shutdown_rx) -> _ => break,
                recv(ticker) -> _ => {
                    if self.dispatcher.context().is_shutting_down() {
                        break;
                    }
                    self.check();
                }
            }
        }
        log::info!(target: "license", "fingerprint monitor stopped");
    }
}

pub struct MonitorHandle {
    shutdown_tx: Sender<()>,
    join_handle: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
