//! DispatchWorker: a dedicated thread that applies queued transmissions.
//!
//! Submitters never block on state locks; they enqueue and return. The
//! worker drains the queue in order, so application order is submission
//! order. Outcomes are published on the dispatcher's event bus.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use takt_types::{DispatchOutcome, Dispatcher, Transmission};

use super::TransmissionDispatcher;
use crate::error::TransmissionError;

enum WorkerCmd {
    Dispatch(Transmission),
    Shutdown,
}

pub struct DispatchWorker {
    dispatcher: Arc<TransmissionDispatcher>,
    rx: Receiver<WorkerCmd>,
}

impl DispatchWorker {
    /// Start the worker thread and return the handle used to feed it.
    pub fn spawn(dispatcher: Arc<TransmissionDispatcher>) -> DispatchHandle {
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = DispatchWorker { dispatcher, rx };
        let join_handle = thread::Builder::new()
            .name("takt-dispatch".into())
            .spawn(move || worker.run());
        let join_handle = match join_handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!(target: "dispatch", "failed to spawn dispatch worker: {}", e);
                None
            }
        };
        DispatchHandle { tx, join_handle }
    }

    fn run(self) {
        log::info!(target: "dispatch", "dispatch worker started");
        loop {
            match self.rx.recv() {
                Ok(WorkerCmd::Dispatch(transmission)) => {
                    let unique_id = transmission.unique_id();
                    if let Err(e) = self.dispatcher.receive(transmission) {
                        // Undeclared failure: already logged by the dispatcher. The
                        // submitter is gone, so the worker keeps going only if the
                        // process is not shutting down.
                        log::error!(target: "dispatch", "queued transmission {} failed: {}", unique_id, e);
                        if self.dispatcher.context().is_shutting_down() {
                            break;
                        }
                    }
                }
                Ok(WorkerCmd::Shutdown) | Err(_) => break,
            }
        }
        log::info!(target: "dispatch", "dispatch worker stopped");
    }
}

/// Submitter-side handle. Dropping it drains the queue and joins the worker.
pub struct DispatchHandle {
    tx: Sender<WorkerCmd>,
    join_handle: Option<JoinHandle<()>>,
}

impl DispatchHandle {
    /// Enqueue a transmission. Fails only if the worker has stopped.
    pub fn submit(&self, transmission: Transmission) -> Result<DispatchOutcome, TransmissionError> {
        self.tx
            .send(WorkerCmd::Dispatch(transmission))
            .map(|_| DispatchOutcome::Queued)
            .map_err(|_| TransmissionError::Internal("dispatch worker disconnected".into()))
    }

    /// Number of transmissions waiting to be applied.
    pub fn backlog(&self) -> usize {
        self.tx.len()
    }

    /// Apply everything already queued, then stop the worker.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.tx.send(WorkerCmd::Shutdown);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Dispatcher for DispatchHandle {
    type Error = TransmissionError;

    fn dispatch(&self, transmission: Transmission) -> Result<DispatchOutcome, TransmissionError> {
        self.submit(transmission)
    }
}

impl Drop for DispatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
