//! Writers. Always the latest layout; client mode blanks server-only fields.

use std::io::{self, Write};

use takt_types::{
    Capability, Customer, Department, Item, Job, Operation, Plant, PurchaseOrder, Resource,
    ScenarioDetail, SystemSettings, User, UserPermission, Warehouse,
};

use super::codec::Writer;
use super::versions::CURRENT_VERSION;
use super::{ScenarioSnapshot, StateSnapshot};

pub fn write_state<W: Write>(w: &mut Writer<W>, state: &StateSnapshot) -> io::Result<()> {
    w.header(CURRENT_VERSION)?;
    w.datetime(&state.start_date)?;
    w.u64(state.last_transmission_number)?;
    write_settings(w, &state.settings)?;
    w.u64(state.next_scenario_id)?;
    w.list(&state.scenarios, write_scenario)?;
    w.list(&state.users, write_user)?;
    Ok(())
}

fn write_settings<W: Write>(w: &mut Writer<W>, s: &SystemSettings) -> io::Result<()> {
    w.str(&s.instance_name)?;
    w.u32(s.session_timeout_minutes)?;
    w.bool(s.recording_enabled)
}

fn write_scenario<W: Write>(w: &mut Writer<W>, s: &ScenarioSnapshot) -> io::Result<()> {
    w.u64(s.id.get())?;
    w.str(&s.name)?;
    write_detail(w, &s.detail)
}

pub fn write_detail<W: Write>(w: &mut Writer<W>, d: &ScenarioDetail) -> io::Result<()> {
    // V_BASE
    w.datetime(&d.clock)?;
    w.list(&d.plants, write_plant)?;
    w.list(&d.capabilities, write_capability)?;
    w.list(&d.items, write_item)?;
    w.list(&d.jobs, write_job)?;
    w.list(&d.warehouses, write_warehouse)?;
    // V_CUSTOMERS
    w.list(&d.customers, write_customer)?;
    // V_PURCHASE_ORDERS
    w.list(&d.purchase_orders, write_purchase_order)?;
    // V_OPERATION_ATTRIBUTES
    let notes = if w.mode().is_client() { "" } else { d.notes.as_str() };
    w.str(notes)
}

fn write_plant<W: Write>(w: &mut Writer<W>, p: &Plant) -> io::Result<()> {
    w.u64(p.id.get())?;
    w.str(&p.external_id)?;
    w.str(&p.name)?;
    w.list(&p.departments, write_department)
}

fn write_department<W: Write>(w: &mut Writer<W>, d: &Department) -> io::Result<()> {
    w.u64(d.id.get())?;
    w.str(&d.external_id)?;
    w.str(&d.name)?;
    w.list(&d.resources, write_resource)
}

fn write_resource<W: Write>(w: &mut Writer<W>, r: &Resource) -> io::Result<()> {
    w.u64(r.id.get())?;
    w.str(&r.external_id)?;
    w.str(&r.name)?;
    w.bool(r.active)?;
    w.list(&r.capabilities, |w, c| w.u64(c.get()))
}

fn write_capability<W: Write>(w: &mut Writer<W>, c: &Capability) -> io::Result<()> {
    w.u64(c.id.get())?;
    w.str(&c.external_id)?;
    w.str(&c.name)
}

fn write_item<W: Write>(w: &mut Writer<W>, i: &Item) -> io::Result<()> {
    w.u64(i.id.get())?;
    w.str(&i.external_id)?;
    w.str(&i.name)
}

fn write_warehouse<W: Write>(w: &mut Writer<W>, wh: &Warehouse) -> io::Result<()> {
    w.u64(wh.id.get())?;
    w.str(&wh.external_id)?;
    w.str(&wh.name)
}

fn write_customer<W: Write>(w: &mut Writer<W>, c: &Customer) -> io::Result<()> {
    w.u64(c.id.get())?;
    w.str(&c.external_id)?;
    w.str(&c.name)
}

fn write_job<W: Write>(w: &mut Writer<W>, j: &Job) -> io::Result<()> {
    w.u64(j.id.get())?;
    w.str(&j.external_id)?;
    w.str(&j.name)?;
    w.option(j.customer.as_ref(), |w, c| w.u64(c.get()))?;
    w.option(j.due.as_ref(), |w, due| w.datetime(due))?;
    w.list(&j.operations, write_operation)
}

fn write_operation<W: Write>(w: &mut Writer<W>, op: &Operation) -> io::Result<()> {
    w.u64(op.id.get())?;
    w.str(&op.name)?;
    w.option(op.required_capability.as_ref(), |w, c| w.u64(c.get()))?;
    w.list(&op.attributes, |w, a| {
        w.str(&a.name)?;
        w.str(&a.value)
    })
}

fn write_purchase_order<W: Write>(w: &mut Writer<W>, po: &PurchaseOrder) -> io::Result<()> {
    w.u64(po.id.get())?;
    w.str(&po.external_id)?;
    w.u64(po.item.get())?;
    w.f64(po.quantity)?;
    w.option(po.warehouse.as_ref(), |w, wh| w.u64(wh.get()))
}

pub(super) fn permission_code(p: UserPermission) -> u8 {
    match p {
        UserPermission::Viewer => 0,
        UserPermission::Planner => 1,
        UserPermission::Administrator => 2,
    }
}

fn write_user<W: Write>(w: &mut Writer<W>, u: &User) -> io::Result<()> {
    let client = w.mode().is_client();
    w.u64(u.id.get())?;
    w.str(&u.name)?;
    w.u8(permission_code(u.permission))?;
    w.bool(u.active)?;
    w.str(if client { "" } else { &u.password_hash })?;
    let last_login = if client { None } else { u.last_login.as_ref() };
    w.option(last_login, |w, t| w.datetime(t))
}
