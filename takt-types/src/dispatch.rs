//! Dispatch abstraction for direct and queued execution.

use serde::{Deserialize, Serialize};

use crate::Transmission;

/// What happened to a submitted transmission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchOutcome {
    /// Applied to state as transmission `number`.
    Applied { number: u64 },
    /// Re-delivery of an already applied number; nothing changed.
    Stale { number: u64 },
    /// Retired message kind, dropped before classification.
    Dropped { unique_id: u16 },
    /// Declared failure; state was left untouched by this transmission.
    Rejected { number: u64, reason: String },
    /// Undeclared failure. Only seen in `TransmissionProcessed` events; the
    /// submitter gets the error itself.
    Failed { number: u64, reason: String },
    /// Accepted into a dispatch queue; the result is published as an event.
    Queued,
}

impl DispatchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, DispatchOutcome::Applied { .. })
    }
}

/// Trait for submitting transmissions to the state engine.
///
/// Implementations can apply inline (serialized by a mutex) or hand the
/// transmission to a dedicated dispatch thread.
pub trait Dispatcher {
    type Error;

    fn dispatch(&self, transmission: Transmission) -> Result<DispatchOutcome, Self::Error>;
}
