#![allow(dead_code)]
//! Test harness utilities for takt-core integration tests.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};

use takt_core::context::ProcessContext;
use takt_core::dispatch::{EventBus, TransmissionDispatcher};
use takt_core::state::SystemState;
use takt_types::{
    DetailEdit, DispatchOutcome, Plant, PlantId, ScenarioAction, ScenarioEdit, ScenarioId,
    Transmission, TransmissionKind, User, UserAction, UserId, UserPermission,
};

pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// A blank server-role state with its dispatcher.
pub fn make_dispatcher() -> Arc<TransmissionDispatcher> {
    Arc::new(TransmissionDispatcher::new(
        Arc::new(SystemState::blank(epoch())),
        Arc::new(ProcessContext::server()),
        Arc::new(EventBus::new()),
    ))
}

pub fn send(d: &TransmissionDispatcher, kind: TransmissionKind) -> DispatchOutcome {
    d.receive(Transmission::new(kind)).unwrap()
}

pub fn create_scenario(d: &TransmissionDispatcher, name: &str) -> DispatchOutcome {
    send(d, TransmissionKind::Scenario(ScenarioAction::Create { name: name.into() }))
}

pub fn add_plants(d: &TransmissionDispatcher, scenario: ScenarioId, ids: std::ops::Range<u64>) -> DispatchOutcome {
    let edits = ids
        .map(|i| DetailEdit::AddPlant(Plant::new(PlantId::new(i), format!("P-{}", i), format!("Plant {}", i))))
        .collect();
    send(d, TransmissionKind::ScenarioEdit(ScenarioEdit { scenario, edits }))
}

pub fn add_user(d: &TransmissionDispatcher, id: u64, name: &str) -> DispatchOutcome {
    send(
        d,
        TransmissionKind::User(UserAction::Add(User::new(UserId::new(id), name, UserPermission::Planner))),
    )
}

/// Run `f` on a helper thread and panic if it does not finish in `limit`.
pub fn within<T: Send + 'static>(limit: Duration, f: impl FnOnce() -> T + Send + 'static) -> T {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(f());
    });
    rx.recv_timeout(limit)
        .unwrap_or_else(|_| panic!("did not finish within {:?}", limit))
}
