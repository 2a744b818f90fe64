//! Planning data owned by a single scenario.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    CapabilityId, CustomerId, DepartmentId, ItemId, JobId, OperationId, PlantId,
    PurchaseOrderId, ResourceId, WarehouseId,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    pub id: PlantId,
    pub external_id: String,
    pub name: String,
    pub departments: Vec<Department>,
}

impl Plant {
    pub fn new(id: PlantId, external_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            external_id: external_id.into(),
            name: name.into(),
            departments: Vec::new(),
        }
    }

    pub fn department_mut(&mut self, id: DepartmentId) -> Option<&mut Department> {
        self.departments.iter_mut().find(|d| d.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub external_id: String,
    pub name: String,
    pub resources: Vec<Resource>,
}

impl Department {
    pub fn new(id: DepartmentId, external_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            external_id: external_id.into(),
            name: name.into(),
            resources: Vec::new(),
        }
    }
}

/// A machine, cell or crew that operations are scheduled onto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub external_id: String,
    pub name: String,
    pub active: bool,
    /// Capabilities this resource can perform
    pub capabilities: Vec<CapabilityId>,
}

impl Resource {
    pub fn new(id: ResourceId, external_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            external_id: external_id.into(),
            name: name.into(),
            active: true,
            capabilities: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub id: CapabilityId,
    pub external_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub external_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationAttribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub name: String,
    pub required_capability: Option<CapabilityId>,
    pub attributes: Vec<OperationAttribute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub external_id: String,
    pub name: String,
    pub customer: Option<CustomerId>,
    pub due: Option<DateTime<Utc>>,
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: PurchaseOrderId,
    pub external_id: String,
    pub item: ItemId,
    pub quantity: f64,
    pub warehouse: Option<WarehouseId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub external_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub external_id: String,
    pub name: String,
}

/// The planning dataset of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDetail {
    /// Planning clock: the "now" the schedule is computed against
    pub clock: DateTime<Utc>,
    pub plants: Vec<Plant>,
    pub capabilities: Vec<Capability>,
    pub items: Vec<Item>,
    pub jobs: Vec<Job>,
    pub purchase_orders: Vec<PurchaseOrder>,
    pub warehouses: Vec<Warehouse>,
    pub customers: Vec<Customer>,
    /// Planner notes; server-only, stripped when serializing for clients
    pub notes: String,
}

impl ScenarioDetail {
    pub fn new(clock: DateTime<Utc>) -> Self {
        Self {
            clock,
            plants: Vec::new(),
            capabilities: Vec::new(),
            items: Vec::new(),
            jobs: Vec::new(),
            purchase_orders: Vec::new(),
            warehouses: Vec::new(),
            customers: Vec::new(),
            notes: String::new(),
        }
    }

    pub fn plant(&self, id: PlantId) -> Option<&Plant> {
        self.plants.iter().find(|p| p.id == id)
    }

    pub fn plant_mut(&mut self, id: PlantId) -> Option<&mut Plant> {
        self.plants.iter_mut().find(|p| p.id == id)
    }

    pub fn departments(&self) -> impl Iterator<Item = &Department> {
        self.plants.iter().flat_map(|p| p.departments.iter())
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.departments().flat_map(|d| d.resources.iter())
    }

    pub fn resource_mut(&mut self, id: ResourceId) -> Option<&mut Resource> {
        self.plants
            .iter_mut()
            .flat_map(|p| p.departments.iter_mut())
            .flat_map(|d| d.resources.iter_mut())
            .find(|r| r.id == id)
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.jobs.iter().flat_map(|j| j.operations.iter())
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn plant_count(&self) -> usize {
        self.plants.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources().count()
    }
}
