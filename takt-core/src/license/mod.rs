//! Licensing: the signed key descriptor, limit checks, and the data-model
//! fingerprint used for offline activation.

mod fingerprint;
mod key;
mod manager;
mod monitor;

pub use fingerprint::{
    hash16, sample_indices, Band, DataModelActivation, EntityCounts, FingerprintModule,
    FingerprintVerdict, ModuleReport, Thresholds, FINGERPRINT_VERSION, SAMPLE_COUNT,
};
pub use key::{checksum, load_license, verify_signature, LicenseKey};
pub use manager::{LicenseManager, LicenseUsage};
pub use monitor::{CheckOutcome, FingerprintMonitor, MonitorHandle};
