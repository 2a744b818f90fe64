use chrono::{DateTime, TimeZone, Utc};

use takt_types::{
    Capability, CapabilityId, Customer, CustomerId, Department, DepartmentId, Item, ItemId, Job,
    JobId, Operation, OperationAttribute, OperationId, Plant, PlantId, PurchaseOrder,
    PurchaseOrderId, Resource, ResourceId, ScenarioDetail, ScenarioId, SystemSettings, User,
    UserId, UserPermission, Warehouse, WarehouseId,
};

use super::{ScenarioSnapshot, StateSnapshot};

mod legacy;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}

fn sample_detail() -> ScenarioDetail {
    let mut detail = ScenarioDetail::new(at(1_700_000_000));

    let mut resource = Resource::new(ResourceId::new(100), "R-100", "Lathe");
    resource.capabilities = vec![CapabilityId::new(1)];
    let mut department = Department::new(DepartmentId::new(10), "D-10", "Machining");
    department.resources.push(resource);
    let mut plant = Plant::new(PlantId::new(1), "P-1", "Main plant");
    plant.departments.push(department);
    detail.plants.push(plant);

    detail.capabilities.push(Capability {
        id: CapabilityId::new(1),
        external_id: "CAP-TURN".into(),
        name: "Turning".into(),
    });
    detail.items.push(Item {
        id: ItemId::new(5),
        external_id: "ITEM-5".into(),
        name: "Shaft".into(),
    });
    detail.warehouses.push(Warehouse {
        id: WarehouseId::new(3),
        external_id: "WH-3".into(),
        name: "North".into(),
    });
    detail.customers.push(Customer {
        id: CustomerId::new(9),
        external_id: "C-9".into(),
        name: "Acme".into(),
    });
    detail.jobs.push(Job {
        id: JobId::new(40),
        external_id: "J-40".into(),
        name: "Order 40".into(),
        customer: Some(CustomerId::new(9)),
        due: Some(at(1_700_600_000)),
        operations: vec![Operation {
            id: OperationId::new(400),
            name: "Turn".into(),
            required_capability: Some(CapabilityId::new(1)),
            attributes: vec![OperationAttribute {
                name: "coolant".into(),
                value: "yes".into(),
            }],
        }],
    });
    detail.purchase_orders.push(PurchaseOrder {
        id: PurchaseOrderId::new(77),
        external_id: "PO-77".into(),
        item: ItemId::new(5),
        quantity: 12.5,
        warehouse: Some(WarehouseId::new(3)),
    });
    detail.notes = "Rush order for Acme".into();
    detail
}

fn sample_snapshot() -> StateSnapshot {
    let mut admin = User::new(UserId::new(1), "admin", UserPermission::Administrator);
    admin.password_hash = "argon2$abc".into();
    admin.last_login = Some(at(1_700_000_500));
    let planner = User::new(UserId::new(2), "planner", UserPermission::Planner);

    StateSnapshot {
        start_date: at(1_600_000_000),
        last_transmission_number: 42,
        settings: SystemSettings {
            instance_name: "plant-floor".into(),
            session_timeout_minutes: 30,
            recording_enabled: false,
        },
        next_scenario_id: 3,
        scenarios: vec![ScenarioSnapshot {
            id: ScenarioId::new(1),
            name: "Live".into(),
            detail: sample_detail(),
        }],
        users: vec![admin, planner],
    }
}
