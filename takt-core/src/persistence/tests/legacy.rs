//! Streams written by older releases, built field by field in their layouts.

use takt_types::{ScenarioId, UserId, UserPermission};

use super::at;
use crate::error::CodecError;
use crate::persistence::codec::{WriteMode, Writer};
use crate::persistence::load::{DETAIL, JOB, OPERATION, PLANT, USER};
use crate::persistence::versions::{V_BASE, V_CUSTOMERS, V_PURCHASE_ORDERS, V_USER_PERMISSIONS};
use crate::persistence::{decode_snapshot, decode_state};

type W = Writer<Vec<u8>>;

fn state_prefix(w: &mut W, version: u32) {
    w.header(version).unwrap();
    w.datetime(&at(1_500_000_000)).unwrap();
    w.u64(7).unwrap();
    w.str("legacy").unwrap();
    w.u32(45).unwrap();
    w.bool(true).unwrap();
    w.u64(2).unwrap();
}

/// Plant with one department and one resource. Pre-300 plants carry a
/// calendar id after the name.
fn plant(w: &mut W, with_calendar: bool) {
    w.u64(1).unwrap();
    w.str("P-1").unwrap();
    w.str("Old plant").unwrap();
    if with_calendar {
        w.u64(555).unwrap();
    }
    w.u32(1).unwrap();
    w.u64(10).unwrap();
    w.str("D-10").unwrap();
    w.str("Assembly").unwrap();
    w.u32(1).unwrap();
    w.u64(100).unwrap();
    w.str("R-100").unwrap();
    w.str("Press").unwrap();
    w.bool(false).unwrap();
    w.u32(0).unwrap();
}

fn catalogs(w: &mut W) {
    // capabilities
    w.u32(1).unwrap();
    w.u64(1).unwrap();
    w.str("CAP-PRESS").unwrap();
    w.str("Pressing").unwrap();
    // items
    w.u32(0).unwrap();
}

fn job(w: &mut W, with_customer: bool) {
    w.u32(1).unwrap();
    w.u64(40).unwrap();
    w.str("J-40").unwrap();
    w.str("Old order").unwrap();
    if with_customer {
        w.bool(true).unwrap();
        w.u64(9).unwrap();
    }
    w.bool(false).unwrap();
    // operations, pre-400 layout without attributes
    w.u32(1).unwrap();
    w.u64(400).unwrap();
    w.str("Press").unwrap();
    w.bool(true).unwrap();
    w.u64(1).unwrap();
}

fn warehouses(w: &mut W) {
    w.u32(1).unwrap();
    w.u64(3).unwrap();
    w.str("WH-3").unwrap();
    w.str("South").unwrap();
}

fn v100_stream() -> Vec<u8> {
    let mut w = Writer::new(Vec::new(), WriteMode::Full);
    state_prefix(&mut w, V_BASE);
    w.u32(1).unwrap();
    w.u64(1).unwrap();
    w.str("Live").unwrap();
    w.datetime(&at(1_500_000_100)).unwrap();
    w.u32(1).unwrap();
    plant(&mut w, true);
    catalogs(&mut w);
    job(&mut w, false);
    warehouses(&mut w);
    // users: id, name, is_admin, active, password hash
    w.u32(2).unwrap();
    w.u64(1).unwrap();
    w.str("root").unwrap();
    w.bool(true).unwrap();
    w.bool(true).unwrap();
    w.str("md5$old").unwrap();
    w.u64(2).unwrap();
    w.str("sam").unwrap();
    w.bool(false).unwrap();
    w.bool(false).unwrap();
    w.str("").unwrap();
    w.into_inner()
}

fn v300_stream() -> Vec<u8> {
    let mut w = Writer::new(Vec::new(), WriteMode::Full);
    state_prefix(&mut w, V_USER_PERMISSIONS);
    w.u32(1).unwrap();
    w.u64(1).unwrap();
    w.str("Live").unwrap();
    w.datetime(&at(1_500_000_100)).unwrap();
    w.u32(1).unwrap();
    plant(&mut w, false);
    catalogs(&mut w);
    job(&mut w, true);
    warehouses(&mut w);
    // customers
    w.u32(1).unwrap();
    w.u64(9).unwrap();
    w.str("C-9").unwrap();
    w.str("Acme").unwrap();
    // users: id, name, permission, active, password hash, last login
    w.u32(1).unwrap();
    w.u64(1).unwrap();
    w.str("viewer").unwrap();
    w.u8(0).unwrap();
    w.bool(true).unwrap();
    w.str("argon2$x").unwrap();
    w.bool(true).unwrap();
    w.datetime(&at(1_500_000_900)).unwrap();
    w.into_inner()
}

#[test]
fn base_stream_defaults_later_fields() {
    let (snapshot, version) = decode_snapshot(&v100_stream()).unwrap();
    assert_eq!(version, V_BASE);
    assert_eq!(snapshot.last_transmission_number, 7);
    assert_eq!(snapshot.settings.instance_name, "legacy");

    let detail = &snapshot.scenarios[0].detail;
    assert_eq!(detail.plants.len(), 1);
    assert_eq!(detail.plants[0].departments[0].resources[0].name, "Press");
    assert!(!detail.plants[0].departments[0].resources[0].active);
    assert!(detail.customers.is_empty());
    assert!(detail.purchase_orders.is_empty());
    assert!(detail.notes.is_empty());
    assert_eq!(detail.jobs[0].customer, None);
    assert!(detail.jobs[0].operations[0].attributes.is_empty());
    assert_eq!(detail.warehouses[0].name, "South");

    let root = &snapshot.users[0];
    assert_eq!(root.permission, UserPermission::Administrator);
    assert_eq!(root.password_hash, "md5$old");
    assert!(root.last_login.is_none());
    assert_eq!(snapshot.users[1].permission, UserPermission::Planner);
    assert!(!snapshot.users[1].active);
}

#[test]
fn permissions_stream_reads_customers_and_logins() {
    let (snapshot, version) = decode_snapshot(&v300_stream()).unwrap();
    assert_eq!(version, V_USER_PERMISSIONS);

    let detail = &snapshot.scenarios[0].detail;
    assert_eq!(detail.customers[0].name, "Acme");
    assert_eq!(detail.jobs[0].customer.map(|c| c.get()), Some(9));
    assert!(detail.purchase_orders.is_empty());

    let viewer = &snapshot.users[0];
    assert_eq!(viewer.permission, UserPermission::Viewer);
    assert_eq!(viewer.last_login, Some(at(1_500_000_900)));
}

#[test]
fn legacy_state_keeps_its_format_version_until_saved() {
    let state = decode_state(&v100_stream()).unwrap();
    assert_eq!(state.format_version(), V_BASE);
    let ctx = crate::context::ProcessContext::server();
    let users = state.read_users(&ctx).unwrap();
    assert!(users.get(UserId::new(1)).is_some());
    drop(users);
    let plants = state
        .read_scenario_detail(&ctx, ScenarioId::new(1), |d| d.plant_count())
        .unwrap();
    assert_eq!(plants, 1);
}

#[test]
fn streams_below_the_floor_are_fatal() {
    let mut bytes = v100_stream();
    bytes[4..8].copy_from_slice(&(V_BASE - 1).to_le_bytes());
    match decode_snapshot(&bytes) {
        Err(CodecError::BelowFloor { found, floor }) => {
            assert_eq!(found, V_BASE - 1);
            assert_eq!(floor, V_BASE);
        }
        other => panic!("expected BelowFloor, got {:?}", other.map(|(_, v)| v)),
    }
}

#[test]
fn decode_tables_are_well_formed() {
    assert!(DETAIL.is_well_formed());
    assert!(PLANT.is_well_formed());
    assert!(JOB.is_well_formed());
    assert!(OPERATION.is_well_formed());
    assert!(USER.is_well_formed());
    assert_eq!(DETAIL.floor(), V_BASE);
    assert_eq!(USER.floor(), V_BASE);
}

#[test]
fn tables_switch_decoders_exactly_at_thresholds() {
    // A pinned reader selects the same decoder anywhere inside a band.
    for (table_thresholds, version, expected) in [
        (DETAIL.thresholds().collect::<Vec<_>>(), V_CUSTOMERS - 1, V_BASE),
        (DETAIL.thresholds().collect(), V_CUSTOMERS, V_CUSTOMERS),
        (DETAIL.thresholds().collect(), V_PURCHASE_ORDERS - 1, V_CUSTOMERS),
        (DETAIL.thresholds().collect(), V_PURCHASE_ORDERS, V_PURCHASE_ORDERS),
    ] {
        let chosen = table_thresholds.into_iter().find(|t| *t <= version).unwrap();
        assert_eq!(chosen, expected, "version {}", version);
    }
}
