//! Scenario-affecting transmissions. All of them hold the scenario collection
//! exclusively; edits additionally hold the target scenario's detail.

use chrono::Utc;

use takt_types::{
    Capability, Customer, DetailEdit, ErpImport, Item, Job, Plant, PurchaseOrder, ScenarioAction,
    ScenarioDetail, ScenarioEdit, Warehouse,
};

use super::events::DispatchEvent;
use crate::context::ProcessContext;
use crate::error::{StateError, TransmissionError};
use crate::state::SystemState;

pub(super) fn dispatch_scenario(
    action: &ScenarioAction,
    state: &SystemState,
    ctx: &ProcessContext,
    effects: &mut Vec<DispatchEvent>,
) -> Result<(), TransmissionError> {
    match action {
        ScenarioAction::Create { name } => {
            let name = validated_name(name)?;
            let id = state
                .write_scenarios(ctx)?
                .create(name, ScenarioDetail::new(Utc::now()));
            log::info!(target: "dispatch", "created scenario {} '{}'", id, name);
            effects.push(DispatchEvent::ScenarioChanged { scenario: id });
        }
        ScenarioAction::Copy { source, name } => {
            let name = validated_name(name)?;
            let id = state.edit_scenario(ctx, *source, |collection, detail| {
                collection.create(name, detail.clone())
            })?;
            log::info!(target: "dispatch", "copied scenario {} into {} '{}'", source, id, name);
            effects.push(DispatchEvent::ScenarioChanged { scenario: id });
        }
        ScenarioAction::Rename(id, name) => {
            let name = validated_name(name)?;
            let mut collection = state.write_scenarios(ctx)?;
            let scenario = collection
                .get_mut(*id)
                .ok_or(StateError::ScenarioNotFound(*id))?;
            scenario.name = name.to_string();
            effects.push(DispatchEvent::ScenarioChanged { scenario: *id });
        }
        ScenarioAction::Delete(id) => {
            let mut collection = state.write_scenarios(ctx)?;
            if collection.production().map(|s| s.id()) == Some(*id) {
                return Err(TransmissionError::Validation(
                    "the production scenario cannot be deleted".into(),
                ));
            }
            let removed = collection.remove(*id)?;
            log::info!(target: "dispatch", "deleted scenario {} '{}'", removed.id(), removed.name);
            effects.push(DispatchEvent::ScenarioDeleted { scenario: *id });
        }
    }
    Ok(())
}

fn validated_name(name: &str) -> Result<&str, TransmissionError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TransmissionError::Validation("scenario name is empty".into()));
    }
    Ok(name)
}

/// Applies every edit to a draft and commits only if all succeed.
pub(super) fn dispatch_scenario_edit(
    edit: &ScenarioEdit,
    state: &SystemState,
    ctx: &ProcessContext,
    effects: &mut Vec<DispatchEvent>,
) -> Result<(), TransmissionError> {
    state.edit_scenario(ctx, edit.scenario, |_, detail| {
        let mut draft = detail.clone();
        for e in &edit.edits {
            apply_edit(&mut draft, e)?;
        }
        *detail = draft;
        Ok::<_, TransmissionError>(())
    })??;
    effects.push(DispatchEvent::ScenarioChanged {
        scenario: edit.scenario,
    });
    Ok(())
}

fn apply_edit(detail: &mut ScenarioDetail, edit: &DetailEdit) -> Result<(), TransmissionError> {
    match edit {
        DetailEdit::AddPlant(plant) => {
            ensure_unique("plant", plant.id.get(), detail.plants.iter().map(|p| p.id.get()))?;
            detail.plants.push(plant.clone());
        }
        DetailEdit::RemovePlant(id) => {
            let before = detail.plants.len();
            detail.plants.retain(|p| p.id != *id);
            if detail.plants.len() == before {
                return Err(StateError::PlantNotFound(*id).into());
            }
        }
        DetailEdit::AddDepartment { plant, department } => {
            ensure_unique(
                "department",
                department.id.get(),
                detail.departments().map(|d| d.id.get()),
            )?;
            detail
                .plant_mut(*plant)
                .ok_or(StateError::PlantNotFound(*plant))?
                .departments
                .push(department.clone());
        }
        DetailEdit::AddResource {
            plant,
            department,
            resource,
        } => {
            ensure_unique(
                "resource",
                resource.id.get(),
                detail.resources().map(|r| r.id.get()),
            )?;
            detail
                .plant_mut(*plant)
                .ok_or(StateError::PlantNotFound(*plant))?
                .department_mut(*department)
                .ok_or(StateError::DepartmentNotFound(*department))?
                .resources
                .push(resource.clone());
        }
        DetailEdit::SetResourceActive(id, active) => {
            detail
                .resource_mut(*id)
                .ok_or(StateError::ResourceNotFound(*id))?
                .active = *active;
        }
        DetailEdit::AddCapability(capability) => {
            ensure_unique(
                "capability",
                capability.id.get(),
                detail.capabilities.iter().map(|c| c.id.get()),
            )?;
            detail.capabilities.push(capability.clone());
        }
        DetailEdit::AddItem(item) => {
            ensure_unique("item", item.id.get(), detail.items.iter().map(|i| i.id.get()))?;
            detail.items.push(item.clone());
        }
        DetailEdit::AddJob(job) => {
            ensure_unique("job", job.id.get(), detail.jobs.iter().map(|j| j.id.get()))?;
            check_job(detail, job)?;
            detail.jobs.push(job.clone());
        }
        DetailEdit::RemoveJob(id) => {
            let before = detail.jobs.len();
            detail.jobs.retain(|j| j.id != *id);
            if detail.jobs.len() == before {
                return Err(TransmissionError::Validation(format!("job {} not found", id)));
            }
        }
        DetailEdit::AddPurchaseOrder(po) => {
            ensure_unique(
                "purchase order",
                po.id.get(),
                detail.purchase_orders.iter().map(|p| p.id.get()),
            )?;
            check_purchase_order(detail, po)?;
            detail.purchase_orders.push(po.clone());
        }
        DetailEdit::AddWarehouse(warehouse) => {
            ensure_unique(
                "warehouse",
                warehouse.id.get(),
                detail.warehouses.iter().map(|w| w.id.get()),
            )?;
            detail.warehouses.push(warehouse.clone());
        }
        DetailEdit::AddCustomer(customer) => {
            ensure_unique(
                "customer",
                customer.id.get(),
                detail.customers.iter().map(|c| c.id.get()),
            )?;
            detail.customers.push(customer.clone());
        }
        DetailEdit::SetClock(clock) => detail.clock = *clock,
        DetailEdit::SetNotes(notes) => detail.notes = notes.clone(),
    }
    Ok(())
}

fn check_job(detail: &ScenarioDetail, job: &Job) -> Result<(), TransmissionError> {
    if let Some(customer) = job.customer {
        if !detail.customers.iter().any(|c| c.id == customer) {
            return Err(TransmissionError::Validation(format!(
                "job {} references unknown customer {}",
                job.id, customer
            )));
        }
    }
    Ok(())
}

fn check_purchase_order(detail: &ScenarioDetail, po: &PurchaseOrder) -> Result<(), TransmissionError> {
    if !detail.items.iter().any(|i| i.id == po.item) {
        return Err(TransmissionError::Validation(format!(
            "purchase order {} references unknown item {}",
            po.id, po.item
        )));
    }
    if let Some(wh) = po.warehouse {
        if !detail.warehouses.iter().any(|w| w.id == wh) {
            return Err(TransmissionError::Validation(format!(
                "purchase order {} references unknown warehouse {}",
                po.id, wh
            )));
        }
    }
    if !(po.quantity.is_finite() && po.quantity > 0.0) {
        return Err(TransmissionError::Validation(format!(
            "purchase order {} has invalid quantity {}",
            po.id, po.quantity
        )));
    }
    Ok(())
}

fn ensure_unique(
    kind: &'static str,
    id: u64,
    mut existing: impl Iterator<Item = u64>,
) -> Result<(), StateError> {
    if existing.any(|e| e == id) {
        return Err(StateError::DuplicateEntity { kind, id });
    }
    Ok(())
}

// ============================================================
// ERP import
// ============================================================

/// Entities an ERP system upserts, matched by external id.
trait ErpEntity: Clone {
    const KIND: &'static str;
    fn external_id(&self) -> &str;
    fn key(&self) -> u64;
    fn rekey_from(&mut self, existing: &Self);
}

macro_rules! erp_entity {
    ($ty:ty, $kind:literal) => {
        impl ErpEntity for $ty {
            const KIND: &'static str = $kind;

            fn external_id(&self) -> &str {
                &self.external_id
            }

            fn key(&self) -> u64 {
                self.id.get()
            }

            fn rekey_from(&mut self, existing: &Self) {
                self.id = existing.id;
            }
        }
    };
}

erp_entity!(Plant, "plant");
erp_entity!(Capability, "capability");
erp_entity!(Item, "item");
erp_entity!(Job, "job");
erp_entity!(PurchaseOrder, "purchase order");
erp_entity!(Warehouse, "warehouse");
erp_entity!(Customer, "customer");

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct UpsertCount {
    added: usize,
    updated: usize,
}

impl std::ops::AddAssign for UpsertCount {
    fn add_assign(&mut self, rhs: Self) {
        self.added += rhs.added;
        self.updated += rhs.updated;
    }
}

/// Replace entities whose external id matches (keeping the existing id),
/// append the rest. A new entity may not reuse another entity's id.
fn upsert<T: ErpEntity>(existing: &mut Vec<T>, incoming: &[T]) -> Result<UpsertCount, StateError> {
    let mut count = UpsertCount::default();
    for entity in incoming {
        match existing
            .iter()
            .position(|e| e.external_id() == entity.external_id())
        {
            Some(pos) => {
                let mut replacement = entity.clone();
                replacement.rekey_from(&existing[pos]);
                existing[pos] = replacement;
                count.updated += 1;
            }
            None => {
                ensure_unique(T::KIND, entity.key(), existing.iter().map(|e| e.key()))?;
                existing.push(entity.clone());
                count.added += 1;
            }
        }
    }
    Ok(count)
}

pub(super) fn dispatch_erp_import(
    import: &ErpImport,
    state: &SystemState,
    ctx: &ProcessContext,
    effects: &mut Vec<DispatchEvent>,
) -> Result<(), TransmissionError> {
    let count = state.edit_scenario(ctx, import.scenario, |_, detail| {
        let mut draft = detail.clone();
        let mut count = UpsertCount::default();
        count += upsert(&mut draft.plants, &import.plants)?;
        count += upsert(&mut draft.capabilities, &import.capabilities)?;
        count += upsert(&mut draft.items, &import.items)?;
        count += upsert(&mut draft.warehouses, &import.warehouses)?;
        count += upsert(&mut draft.customers, &import.customers)?;
        count += upsert(&mut draft.jobs, &import.jobs)?;
        count += upsert(&mut draft.purchase_orders, &import.purchase_orders)?;
        // References are checked against the merged model, so an import may
        // bring a customer and the jobs that use it together.
        for job in &draft.jobs {
            check_job(&draft, job)?;
        }
        for po in &draft.purchase_orders {
            check_purchase_order(&draft, po)?;
        }
        *detail = draft;
        Ok::<_, TransmissionError>(count)
    })??;
    log::info!(
        target: "dispatch",
        "erp import into scenario {}: {} added, {} updated",
        import.scenario,
        count.added,
        count.updated
    );
    effects.push(DispatchEvent::ScenarioChanged {
        scenario: import.scenario,
    });
    Ok(())
}
