//! Transmissions: the only messages that may mutate server state.
//!
//! A `Transmission` is an immutable envelope around a `TransmissionKind`.
//! Each kind has a stable small-integer unique id used on the wire to pick a
//! decoder; the dispatcher itself matches on the decoded variant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Capability, Customer, Department, DepartmentId, Item, Job, JobId, LicenseStatus, Plant,
    PlantId, PurchaseOrder, Resource, ResourceId, ScenarioId, SystemSettings, User, UserId,
    UserPermission, Warehouse,
};

// ============================================================================
// Unique ids
// ============================================================================

pub const BATCH_ID: u16 = 1;
pub const SYSTEM_SETTINGS_ID: u16 = 10;
pub const USER_ID: u16 = 20;
pub const SCENARIO_ID: u16 = 30;
pub const SCENARIO_EDIT_ID: u16 = 31;
pub const ERP_IMPORT_ID: u16 = 32;
pub const IMPORT_SIGNAL_ID: u16 = 40;
pub const SYSTEM_STATE_SWITCH_ID: u16 = 50;

/// Unique ids of transmissions that no longer exist. Old recordings may still
/// contain them; they decode to `TransmissionKind::Retired` and are dropped.
pub const RETIRED_IDS: &[u16] = &[
    5,  // client heartbeat, replaced by transport keepalive
    33, // scenario undo set
    60, // legacy license refresh
];

pub fn is_retired(unique_id: u16) -> bool {
    RETIRED_IDS.contains(&unique_id)
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SystemSettingsAction {
    Rename(String),
    SetSessionTimeout(u32),
    SetRecording(bool),
    Replace(SystemSettings),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UserAction {
    Add(User),
    Remove(UserId),
    Rename(UserId, String),
    SetPermission(UserId, UserPermission),
    SetActive(UserId, bool),
}

/// Collection-level scenario operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScenarioAction {
    Create { name: String },
    Copy { source: ScenarioId, name: String },
    Rename(ScenarioId, String),
    Delete(ScenarioId),
}

/// A single change to a scenario's planning data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DetailEdit {
    AddPlant(Plant),
    RemovePlant(PlantId),
    AddDepartment { plant: PlantId, department: Department },
    AddResource { plant: PlantId, department: DepartmentId, resource: Resource },
    SetResourceActive(ResourceId, bool),
    AddCapability(Capability),
    AddItem(Item),
    AddJob(Job),
    RemoveJob(JobId),
    AddPurchaseOrder(PurchaseOrder),
    AddWarehouse(Warehouse),
    AddCustomer(Customer),
    SetClock(DateTime<Utc>),
    SetNotes(String),
}

/// A batch of edits applied to one scenario under a single exclusive guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioEdit {
    pub scenario: ScenarioId,
    pub edits: Vec<DetailEdit>,
}

/// Bulk upsert from an ERP system. Entities are matched by external id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErpImport {
    pub scenario: ScenarioId,
    pub plants: Vec<Plant>,
    pub capabilities: Vec<Capability>,
    pub items: Vec<Item>,
    pub jobs: Vec<Job>,
    pub purchase_orders: Vec<PurchaseOrder>,
    pub warehouses: Vec<Warehouse>,
    pub customers: Vec<Customer>,
}

/// Import lifecycle signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImportSignal {
    /// An import run began; each listed scenario must acknowledge completion.
    Started { scenarios: Vec<ScenarioId> },
    /// One scenario finished processing the import.
    ScenarioFinished(ScenarioId),
    /// The import source finished sending data.
    Completed,
}

/// Read-only toggle, dispatched so observers see mode changes in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStateSwitch {
    pub read_only: bool,
    pub status: LicenseStatus,
    pub reason: String,
}

// ============================================================================
// Kind + envelope
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransmissionKind {
    /// Members are applied in order.
    Batch(Vec<TransmissionKind>),
    SystemSettings(SystemSettingsAction),
    User(UserAction),
    Scenario(ScenarioAction),
    ScenarioEdit(ScenarioEdit),
    ErpImport(ErpImport),
    Import(ImportSignal),
    SystemStateSwitch(SystemStateSwitch),
    /// A retired message kind from an old recording. Never constructed by
    /// current clients.
    Retired { unique_id: u16 },
}

impl TransmissionKind {
    pub fn unique_id(&self) -> u16 {
        match self {
            TransmissionKind::Batch(_) => BATCH_ID,
            TransmissionKind::SystemSettings(_) => SYSTEM_SETTINGS_ID,
            TransmissionKind::User(_) => USER_ID,
            TransmissionKind::Scenario(_) => SCENARIO_ID,
            TransmissionKind::ScenarioEdit(_) => SCENARIO_EDIT_ID,
            TransmissionKind::ErpImport(_) => ERP_IMPORT_ID,
            TransmissionKind::Import(_) => IMPORT_SIGNAL_ID,
            TransmissionKind::SystemStateSwitch(_) => SYSTEM_STATE_SWITCH_ID,
            TransmissionKind::Retired { unique_id } => *unique_id,
        }
    }

    /// Whether applying this kind mutates data. Writes are rejected in
    /// read-only mode; the state switch itself must always get through.
    /// Import signals only move completion tracking, so an import already
    /// in flight can still finish.
    pub fn is_write(&self) -> bool {
        match self {
            TransmissionKind::Batch(members) => members.iter().any(|m| m.is_write()),
            TransmissionKind::SystemStateSwitch(_)
            | TransmissionKind::Import(_)
            | TransmissionKind::Retired { .. } => false,
            TransmissionKind::SystemSettings(_)
            | TransmissionKind::User(_)
            | TransmissionKind::Scenario(_)
            | TransmissionKind::ScenarioEdit(_)
            | TransmissionKind::ErpImport(_) => true,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransmissionKind::Batch(_) => "batch",
            TransmissionKind::SystemSettings(_) => "system-settings",
            TransmissionKind::User(_) => "user",
            TransmissionKind::Scenario(_) => "scenario",
            TransmissionKind::ScenarioEdit(_) => "scenario-edit",
            TransmissionKind::ErpImport(_) => "erp-import",
            TransmissionKind::Import(_) => "import-signal",
            TransmissionKind::SystemStateSwitch(_) => "system-state-switch",
            TransmissionKind::Retired { .. } => "retired",
        }
    }
}

/// Immutable change-request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transmission {
    /// Sequence number. `None` means the dispatcher stamps the next number;
    /// `Some(n)` with `n` at or below the last applied number is a stale
    /// re-delivery and is ignored.
    pub number: Option<u64>,
    pub instigator: Option<UserId>,
    pub created: DateTime<Utc>,
    pub kind: TransmissionKind,
}

impl Transmission {
    pub fn new(kind: TransmissionKind) -> Self {
        Self {
            number: None,
            instigator: None,
            created: Utc::now(),
            kind,
        }
    }

    pub fn numbered(number: u64, kind: TransmissionKind) -> Self {
        Self {
            number: Some(number),
            ..Self::new(kind)
        }
    }

    pub fn with_instigator(mut self, user: UserId) -> Self {
        self.instigator = Some(user);
        self
    }

    pub fn unique_id(&self) -> u16 {
        self.kind.unique_id()
    }
}
