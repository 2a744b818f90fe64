pub mod scenario;
pub mod settings;
pub mod user;

pub use scenario::{
    Capability, Customer, Department, Item, Job, Operation, OperationAttribute, Plant,
    PurchaseOrder, Resource, ScenarioDetail, Warehouse,
};
pub use settings::SystemSettings;
pub use user::{User, UserPermission};
