//! Error types for each subsystem.

use std::io;
use std::time::Duration;

use thiserror::Error;

use takt_types::{
    DepartmentId, LicenseStatus, PlantId, ResourceId, ScenarioId, UserId,
};

/// Failure to acquire a guarded value.
///
/// `Timeout` is an internal retry signal and never escapes a retry loop;
/// only `Cancelled` does.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AcquireError {
    #[error("timed out after {waited:?} acquiring {label}")]
    Timeout { label: &'static str, waited: Duration },
    #[error("acquisition of {label} cancelled")]
    Cancelled { label: &'static str },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("scenario {0} not found")]
    ScenarioNotFound(ScenarioId),
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("user {0} already exists")]
    DuplicateUser(UserId),
    #[error("a user named '{0}' already exists")]
    DuplicateUserName(String),
    #[error("plant {0} not found")]
    PlantNotFound(PlantId),
    #[error("department {0} not found")]
    DepartmentNotFound(DepartmentId),
    #[error("resource {0} not found")]
    ResourceNotFound(ResourceId),
    #[error("{kind} with id {id} already exists")]
    DuplicateEntity { kind: &'static str, id: u64 },
    #[error("state access cancelled")]
    Cancelled,
}

impl From<AcquireError> for StateError {
    fn from(_: AcquireError) -> Self {
        StateError::Cancelled
    }
}

/// Failure while decoding or applying a transmission.
#[derive(Debug, Error)]
pub enum TransmissionError {
    /// Unknown unique id. Always a defect in the sender or the registry.
    #[error("unknown transmission unique id {0}")]
    UnknownTag(u16),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("system is read-only ({0}); write transmissions are rejected")]
    ReadOnly(LicenseStatus),
    #[error("could not decode transmission {unique_id}: {message}")]
    Decode { unique_id: u16, message: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl TransmissionError {
    /// Declared failures are logged and swallowed by the dispatcher;
    /// everything else is logged and returned to the submitter.
    pub fn is_declared(&self) -> bool {
        !matches!(
            self,
            TransmissionError::Internal(_) | TransmissionError::State(StateError::Cancelled)
        )
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("not a takt state stream (bad magic)")]
    BadMagic,
    #[error(
        "format version {found} is older than the minimum supported version {floor}; \
         upgrade it with an intermediate release first"
    )]
    BelowFloor { found: u32, floor: u32 },
    #[error("format version {found} is newer than this build supports ({current})")]
    NewerThanSupported { found: u32, current: u32 },
    #[error("corrupt stream: {0}")]
    Corrupt(String),
    #[error(transparent)]
    State(#[from] StateError),
}

#[derive(Debug, Error)]
pub enum LicenseError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("malformed license key: {0}")]
    Parse(String),
    #[error("license signature does not match the key descriptor")]
    SignatureMismatch,
    #[error("license check failed: {0}")]
    Status(LicenseStatus),
    #[error("data model diverged in '{module}': {ratio:.3} found, fail threshold {threshold:.3}")]
    Divergence {
        module: &'static str,
        ratio: f64,
        threshold: f64,
    },
    #[error("plant count changed from {expected} to {found}")]
    PlantCountChanged { expected: u64, found: u64 },
    #[error("malformed activation key: {0}")]
    BadActivationKey(String),
    #[error("could not read state for the license check: {0}")]
    State(#[from] StateError),
}

impl LicenseError {
    /// The status the process must switch to when this error is raised.
    pub fn status(&self) -> LicenseStatus {
        match self {
            LicenseError::Status(status) => *status,
            LicenseError::Divergence { .. } | LicenseError::PlantCountChanged { .. } => {
                LicenseStatus::DataModelDivergence
            }
            LicenseError::Io(_)
            | LicenseError::Parse(_)
            | LicenseError::SignatureMismatch
            | LicenseError::BadActivationKey(_)
            | LicenseError::State(_) => LicenseStatus::InvalidKey,
        }
    }
}
