//! # takt-types
//!
//! Shared type definitions for the takt scheduling server.
//! This crate contains the scenario data model, users, system settings and the
//! transmission messages that flow into the dispatcher. It has no behavior
//! beyond small lookups; locking, persistence and dispatch live in takt-core.

pub mod dispatch;
mod license;
pub mod state;
pub mod transmission;

pub use dispatch::{DispatchOutcome, Dispatcher};
pub use license::LicenseStatus;
pub use state::*;
pub use transmission::*;

/// Declares a `u64` identifier newtype with the usual conversions.
macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            Default,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(id: u64) -> Self {
                Self(id)
            }
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Unique identifier for a scenario within the scenario collection.
    ScenarioId
);
id_type!(
    /// Unique identifier for a user account.
    UserId
);
id_type!(PlantId);
id_type!(DepartmentId);
id_type!(ResourceId);
id_type!(CapabilityId);
id_type!(ItemId);
id_type!(JobId);
id_type!(OperationId);
id_type!(PurchaseOrderId);
id_type!(WarehouseId);
id_type!(CustomerId);
