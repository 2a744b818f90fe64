use takt_types::{
    Capability, CapabilityId, Customer, CustomerId, Department, DepartmentId, Item, ItemId, Job,
    JobId, Operation, OperationAttribute, OperationId, Plant, PlantId, PurchaseOrder,
    PurchaseOrderId, Resource, ResourceId, ScenarioDetail, Warehouse, WarehouseId,
};

use crate::error::CodecError;
use crate::persistence::codec::Reader;
use crate::persistence::versions::{
    VersionTable, V_BASE, V_CUSTOMERS, V_OPERATION_ATTRIBUTES, V_PURCHASE_ORDERS,
    V_USER_PERMISSIONS,
};

pub(crate) static DETAIL: VersionTable<ScenarioDetail> = VersionTable::new(
    "scenario-detail",
    &[
        (V_OPERATION_ATTRIBUTES, read_detail_v400),
        (V_PURCHASE_ORDERS, read_detail_v350),
        (V_CUSTOMERS, read_detail_v200),
        (V_BASE, read_detail_v100),
    ],
);

pub(crate) static PLANT: VersionTable<Plant> = VersionTable::new(
    "plant",
    &[(V_USER_PERMISSIONS, read_plant_v300), (V_BASE, read_plant_v100)],
);

pub(crate) static JOB: VersionTable<Job> = VersionTable::new(
    "job",
    &[(V_CUSTOMERS, read_job_v200), (V_BASE, read_job_v100)],
);

pub(crate) static OPERATION: VersionTable<Operation> = VersionTable::new(
    "operation",
    &[
        (V_OPERATION_ATTRIBUTES, read_operation_v400),
        (V_BASE, read_operation_v100),
    ],
);

pub fn read_detail(r: &mut Reader<'_>) -> Result<ScenarioDetail, CodecError> {
    DETAIL.decode(r)
}

// ============================================================
// Scenario detail
// ============================================================

fn read_detail_v400(r: &mut Reader<'_>) -> Result<ScenarioDetail, CodecError> {
    let mut detail = read_detail_v350(r)?;
    detail.notes = r.string()?;
    Ok(detail)
}

fn read_detail_v350(r: &mut Reader<'_>) -> Result<ScenarioDetail, CodecError> {
    let mut detail = read_detail_v200(r)?;
    detail.purchase_orders = r.list(read_purchase_order)?;
    Ok(detail)
}

fn read_detail_v200(r: &mut Reader<'_>) -> Result<ScenarioDetail, CodecError> {
    let mut detail = read_detail_v100(r)?;
    detail.customers = r.list(read_customer)?;
    Ok(detail)
}

fn read_detail_v100(r: &mut Reader<'_>) -> Result<ScenarioDetail, CodecError> {
    let mut detail = ScenarioDetail::new(r.datetime()?);
    detail.plants = r.list(|r| PLANT.decode(r))?;
    detail.capabilities = r.list(read_capability)?;
    detail.items = r.list(read_item)?;
    detail.jobs = r.list(|r| JOB.decode(r))?;
    detail.warehouses = r.list(read_warehouse)?;
    Ok(detail)
}

// ============================================================
// Plants
// ============================================================

fn read_plant_v300(r: &mut Reader<'_>) -> Result<Plant, CodecError> {
    let mut plant = Plant::new(PlantId::new(r.u64()?), r.string()?, r.string()?);
    plant.departments = r.list(read_department)?;
    Ok(plant)
}

fn read_plant_v100(r: &mut Reader<'_>) -> Result<Plant, CodecError> {
    let mut plant = Plant::new(PlantId::new(r.u64()?), r.string()?, r.string()?);
    // Calendar id; calendars are no longer part of the model.
    let _calendar = r.u64()?;
    plant.departments = r.list(read_department)?;
    Ok(plant)
}

fn read_department(r: &mut Reader<'_>) -> Result<Department, CodecError> {
    let mut department = Department::new(DepartmentId::new(r.u64()?), r.string()?, r.string()?);
    department.resources = r.list(read_resource)?;
    Ok(department)
}

fn read_resource(r: &mut Reader<'_>) -> Result<Resource, CodecError> {
    let mut resource = Resource::new(ResourceId::new(r.u64()?), r.string()?, r.string()?);
    resource.active = r.bool()?;
    resource.capabilities = r.list(|r| r.u64().map(CapabilityId::new))?;
    Ok(resource)
}

// ============================================================
// Catalog entities
// ============================================================

fn read_capability(r: &mut Reader<'_>) -> Result<Capability, CodecError> {
    Ok(Capability {
        id: CapabilityId::new(r.u64()?),
        external_id: r.string()?,
        name: r.string()?,
    })
}

fn read_item(r: &mut Reader<'_>) -> Result<Item, CodecError> {
    Ok(Item {
        id: ItemId::new(r.u64()?),
        external_id: r.string()?,
        name: r.string()?,
    })
}

fn read_warehouse(r: &mut Reader<'_>) -> Result<Warehouse, CodecError> {
    Ok(Warehouse {
        id: WarehouseId::new(r.u64()?),
        external_id: r.string()?,
        name: r.string()?,
    })
}

fn read_customer(r: &mut Reader<'_>) -> Result<Customer, CodecError> {
    Ok(Customer {
        id: CustomerId::new(r.u64()?),
        external_id: r.string()?,
        name: r.string()?,
    })
}

fn read_purchase_order(r: &mut Reader<'_>) -> Result<PurchaseOrder, CodecError> {
    Ok(PurchaseOrder {
        id: PurchaseOrderId::new(r.u64()?),
        external_id: r.string()?,
        item: ItemId::new(r.u64()?),
        quantity: r.f64()?,
        warehouse: r.option(|r| r.u64().map(WarehouseId::new))?,
    })
}

// ============================================================
// Jobs and operations
// ============================================================

fn read_job_v200(r: &mut Reader<'_>) -> Result<Job, CodecError> {
    Ok(Job {
        id: JobId::new(r.u64()?),
        external_id: r.string()?,
        name: r.string()?,
        customer: r.option(|r| r.u64().map(CustomerId::new))?,
        due: r.option(|r| r.datetime())?,
        operations: r.list(|r| OPERATION.decode(r))?,
    })
}

fn read_job_v100(r: &mut Reader<'_>) -> Result<Job, CodecError> {
    Ok(Job {
        id: JobId::new(r.u64()?),
        external_id: r.string()?,
        name: r.string()?,
        customer: None,
        due: r.option(|r| r.datetime())?,
        operations: r.list(|r| OPERATION.decode(r))?,
    })
}

fn read_operation_v400(r: &mut Reader<'_>) -> Result<Operation, CodecError> {
    let mut op = read_operation_v100(r)?;
    op.attributes = r.list(|r| {
        Ok(OperationAttribute {
            name: r.string()?,
            value: r.string()?,
        })
    })?;
    Ok(op)
}

fn read_operation_v100(r: &mut Reader<'_>) -> Result<Operation, CodecError> {
    Ok(Operation {
        id: OperationId::new(r.u64()?),
        name: r.string()?,
        required_capability: r.option(|r| r.u64().map(CapabilityId::new))?,
        attributes: Vec::new(),
    })
}
