//! Transmission dispatch: the only path by which state mutates.
//!
//! `TransmissionDispatcher::receive` applies one transmission at a time. The
//! pipeline guard serializes callers, so application order is a total order
//! visible through the state's transmission counter. `DispatchWorker` puts
//! the same dispatcher behind a queue for fire-and-forget submission.

pub mod events;
mod import;
pub mod registry;
mod scenario;
mod system;
mod users;
pub mod worker;

pub use events::{DispatchEvent, EventBus};
pub use import::ImportTracker;
pub use worker::{DispatchHandle, DispatchWorker};

use std::sync::Arc;

use takt_types::{is_retired, DispatchOutcome, Dispatcher, Transmission, TransmissionKind};

use crate::context::ProcessContext;
use crate::error::TransmissionError;
use crate::recording::TransmissionRecorder;
use crate::state::{SystemState, WRITER_INITIAL_TIMEOUT};
use crate::sync::Guarded;

/// State owned by the dispatch pipeline itself. Only touched while the
/// pipeline guard is held.
struct Pipeline {
    imports: ImportTracker,
    recorder: Option<TransmissionRecorder>,
}

pub struct TransmissionDispatcher {
    state: Arc<SystemState>,
    ctx: Arc<ProcessContext>,
    events: Arc<EventBus>,
    pipeline: Guarded<Pipeline>,
}

impl TransmissionDispatcher {
    pub fn new(state: Arc<SystemState>, ctx: Arc<ProcessContext>, events: Arc<EventBus>) -> Self {
        Self {
            state,
            ctx,
            events,
            pipeline: Guarded::new(
                "dispatch-pipeline",
                Pipeline {
                    imports: ImportTracker::new(),
                    recorder: None,
                },
            ),
        }
    }

    /// Record accepted transmissions. Only used when the process is the server.
    pub fn with_recorder(self, recorder: TransmissionRecorder) -> Self {
        let Self {
            state,
            ctx,
            events,
            pipeline,
        } = self;
        let mut pipeline = pipeline.into_inner();
        pipeline.recorder = Some(recorder);
        Self {
            state,
            ctx,
            events,
            pipeline: Guarded::new("dispatch-pipeline", pipeline),
        }
    }

    pub fn state(&self) -> &Arc<SystemState> {
        &self.state
    }

    pub fn context(&self) -> &Arc<ProcessContext> {
        &self.ctx
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Apply one transmission.
    ///
    /// Order of checks: retired kinds are dropped, stale numbers are ignored,
    /// writes are rejected in read-only mode, then the transmission is
    /// recorded and applied. Declared failures come back as
    /// `Ok(DispatchOutcome::Rejected)`; undeclared ones are returned as `Err`
    /// and the caller decides whether they are fatal.
    pub fn receive(&self, transmission: Transmission) -> Result<DispatchOutcome, TransmissionError> {
        let policy = self.ctx.retry_policy().starting_at(WRITER_INITIAL_TIMEOUT);
        let mut pipeline = self
            .pipeline
            .enter_exclusive(&policy, self.ctx.shutdown_token())
            .map_err(|e| TransmissionError::State(e.into()))?;

        let unique_id = transmission.unique_id();
        if matches!(transmission.kind, TransmissionKind::Retired { .. }) || is_retired(unique_id) {
            log::debug!(target: "dispatch", "dropping retired transmission {}", unique_id);
            return Ok(DispatchOutcome::Dropped { unique_id });
        }

        let last = self.state.last_transmission_number();
        let number = match transmission.number {
            Some(n) if n <= last => {
                log::debug!(target: "dispatch", "transmission {} is stale (last applied {})", n, last);
                return Ok(DispatchOutcome::Stale { number: n });
            }
            Some(n) => n,
            None => last + 1,
        };

        if transmission.kind.is_write() && self.ctx.is_read_only() {
            let err = TransmissionError::ReadOnly(self.ctx.license_status());
            log::warn!(
                target: "dispatch",
                "rejected {} #{}: {}",
                transmission.kind.name(),
                number,
                err
            );
            self.state.advance_transmission_number(number);
            let outcome = DispatchOutcome::Rejected {
                number,
                reason: err.to_string(),
            };
            self.publish_processed(number, unique_id, &outcome);
            return Ok(outcome);
        }

        if self.ctx.is_server() && self.recording_enabled() {
            if let Some(recorder) = pipeline.recorder.as_mut() {
                let stamped = Transmission {
                    number: Some(number),
                    ..transmission.clone()
                };
                recorder.record(number, &stamped);
            }
        }

        let mut effects = Vec::new();
        let result = dispatch_transmission(
            &transmission.kind,
            &self.state,
            &self.ctx,
            &mut pipeline.imports,
            &mut effects,
        );
        self.state.advance_transmission_number(number);

        let outcome = match result {
            Ok(()) => {
                log::debug!(target: "dispatch", "applied {} #{}", transmission.kind.name(), number);
                DispatchOutcome::Applied { number }
            }
            Err(e) if e.is_declared() => {
                log::warn!(
                    target: "dispatch",
                    "rejected {} #{}: {}",
                    transmission.kind.name(),
                    number,
                    e
                );
                DispatchOutcome::Rejected {
                    number,
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                log::error!(
                    target: "dispatch",
                    "unexpected failure applying {} #{} from {:?}: {}",
                    transmission.kind.name(),
                    number,
                    transmission.instigator,
                    e
                );
                for event in &effects {
                    self.events.publish(event);
                }
                let failed = DispatchOutcome::Failed {
                    number,
                    reason: e.to_string(),
                };
                self.publish_processed(number, unique_id, &failed);
                return Err(e);
            }
        };

        for event in &effects {
            self.events.publish(event);
        }
        self.publish_processed(number, unique_id, &outcome);
        Ok(outcome)
    }

    fn publish_processed(&self, number: u64, unique_id: u16, outcome: &DispatchOutcome) {
        self.events.publish(&DispatchEvent::TransmissionProcessed {
            number,
            unique_id,
            outcome: outcome.clone(),
        });
    }

    fn recording_enabled(&self) -> bool {
        match self.state.read_settings(&self.ctx) {
            Ok(settings) => settings.recording_enabled,
            Err(_) => false,
        }
    }

    /// Scenarios still owing an acknowledgement for the current import.
    pub fn pending_import_scenarios(&self) -> Result<usize, TransmissionError> {
        let pipeline = self
            .pipeline
            .enter_shared(self.ctx.retry_policy(), self.ctx.shutdown_token())
            .map_err(|e| TransmissionError::State(e.into()))?;
        Ok(pipeline.imports.pending_count())
    }
}

impl Dispatcher for TransmissionDispatcher {
    type Error = TransmissionError;

    fn dispatch(&self, transmission: Transmission) -> Result<DispatchOutcome, TransmissionError> {
        self.receive(transmission)
    }
}

/// Route one transmission kind to the aggregate that owns it.
fn dispatch_transmission(
    kind: &TransmissionKind,
    state: &SystemState,
    ctx: &ProcessContext,
    imports: &mut ImportTracker,
    effects: &mut Vec<DispatchEvent>,
) -> Result<(), TransmissionError> {
    match kind {
        TransmissionKind::Batch(members) => {
            for (i, member) in members.iter().enumerate() {
                if let Err(e) = dispatch_transmission(member, state, ctx, imports, effects) {
                    if !e.is_declared() {
                        return Err(e);
                    }
                    log::warn!(
                        target: "dispatch",
                        "batch member {} ({}) rejected: {}",
                        i,
                        member.name(),
                        e
                    );
                }
            }
            Ok(())
        }
        TransmissionKind::SystemSettings(a) => system::dispatch_settings(a, state, ctx, effects),
        TransmissionKind::User(a) => users::dispatch_user(a, state, ctx, effects),
        TransmissionKind::Scenario(a) => scenario::dispatch_scenario(a, state, ctx, effects),
        TransmissionKind::ScenarioEdit(e) => scenario::dispatch_scenario_edit(e, state, ctx, effects),
        TransmissionKind::ErpImport(i) => scenario::dispatch_erp_import(i, state, ctx, effects),
        TransmissionKind::Import(s) => import::dispatch_import_signal(s, imports, effects),
        TransmissionKind::SystemStateSwitch(s) => system::dispatch_state_switch(s, ctx, effects),
        TransmissionKind::Retired { unique_id } => {
            log::debug!(target: "dispatch", "dropping retired batch member {}", unique_id);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StateError;
    use chrono::{DateTime, Utc};
    use std::thread;
    use std::time::Duration;
    use takt_types::{
        Customer, CustomerId, DetailEdit, ErpImport, Job, JobId, ImportSignal, LicenseStatus, Plant, PlantId, ScenarioAction, ScenarioEdit,
        ScenarioId, SystemSettingsAction, SystemStateSwitch, User, UserAction, UserId,
        UserPermission,
    };

    fn dispatcher() -> TransmissionDispatcher {
        TransmissionDispatcher::new(
            Arc::new(SystemState::blank(DateTime::<Utc>::UNIX_EPOCH)),
            Arc::new(ProcessContext::server()),
            Arc::new(EventBus::new()),
        )
    }

    fn create(name: &str) -> Transmission {
        Transmission::new(TransmissionKind::Scenario(ScenarioAction::Create {
            name: name.into(),
        }))
    }

    #[test]
    fn unstamped_transmissions_get_the_next_number() {
        let d = dispatcher();
        assert_eq!(d.receive(create("Live")).unwrap(), DispatchOutcome::Applied { number: 1 });
        assert_eq!(d.receive(create("B")).unwrap(), DispatchOutcome::Applied { number: 2 });
        assert_eq!(d.state().last_transmission_number(), 2);
    }

    #[test]
    fn stale_numbers_are_no_ops() {
        let d = dispatcher();
        d.receive(Transmission { number: Some(5), ..create("Live") }).unwrap();
        let outcome = d.receive(Transmission { number: Some(5), ..create("Again") }).unwrap();
        assert_eq!(outcome, DispatchOutcome::Stale { number: 5 });
        let ctx = ProcessContext::server();
        assert_eq!(d.state().read_scenarios(&ctx).unwrap().len(), 1);
    }

    #[test]
    fn retired_kinds_are_dropped_before_numbering() {
        let d = dispatcher();
        let outcome = d
            .receive(Transmission::new(TransmissionKind::Retired { unique_id: 60 }))
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Dropped { unique_id: 60 });
        assert_eq!(d.state().last_transmission_number(), 0);
    }

    #[test]
    fn declared_failures_are_rejected_not_raised() {
        let d = dispatcher();
        let outcome = d
            .receive(Transmission::new(TransmissionKind::ScenarioEdit(ScenarioEdit {
                scenario: ScenarioId::new(42),
                edits: vec![DetailEdit::SetNotes("x".into())],
            })))
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Rejected { number: 1, .. }));
        assert_eq!(d.state().last_transmission_number(), 1);
    }

    #[test]
    fn failed_edit_leaves_detail_untouched() {
        let d = dispatcher();
        d.receive(create("Live")).unwrap();
        let id = ScenarioId::new(1);
        let plant = Plant::new(PlantId::new(1), "P1", "One");
        let outcome = d
            .receive(Transmission::new(TransmissionKind::ScenarioEdit(ScenarioEdit {
                scenario: id,
                edits: vec![DetailEdit::AddPlant(plant.clone()), DetailEdit::AddPlant(plant)],
            })))
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Rejected { .. }));
        let ctx = ProcessContext::server();
        let plants = d.state().read_scenario_detail(&ctx, id, |s| s.plant_count()).unwrap();
        assert_eq!(plants, 0);
    }

    #[test]
    fn batch_continues_past_a_rejected_member() {
        let d = dispatcher();
        let batch = TransmissionKind::Batch(vec![
            TransmissionKind::SystemSettings(SystemSettingsAction::SetSessionTimeout(0)),
            TransmissionKind::User(UserAction::Add(User::new(
                UserId::new(1),
                "ana",
                UserPermission::Planner,
            ))),
        ]);
        let outcome = d.receive(Transmission::new(batch)).unwrap();
        assert!(outcome.is_applied());
        let ctx = ProcessContext::server();
        assert_eq!(d.state().read_users(&ctx).unwrap().len(), 1);
        assert_eq!(d.state().read_settings(&ctx).unwrap().session_timeout_minutes, 60);
    }

    #[test]
    fn read_only_mode_rejects_writes_but_accepts_the_switch_back() {
        let d = dispatcher();
        let switch = |read_only: bool, status: LicenseStatus| {
            Transmission::new(TransmissionKind::SystemStateSwitch(SystemStateSwitch {
                read_only,
                status,
                reason: "test".into(),
            }))
        };
        d.receive(switch(true, LicenseStatus::Expired)).unwrap();
        assert!(d.context().is_read_only());

        let outcome = d.receive(create("Live")).unwrap();
        match outcome {
            DispatchOutcome::Rejected { reason, .. } => assert!(reason.contains("read-only")),
            other => panic!("expected rejection, got {:?}", other),
        }

        d.receive(switch(false, LicenseStatus::Valid)).unwrap();
        assert!(!d.context().is_read_only());
        assert!(d.receive(create("Live")).unwrap().is_applied());
    }

    #[test]
    fn leaving_read_only_with_a_failing_status_is_rejected() {
        let d = dispatcher();
        let outcome = d
            .receive(Transmission::new(TransmissionKind::SystemStateSwitch(SystemStateSwitch {
                read_only: false,
                status: LicenseStatus::Expired,
                reason: String::new(),
            })))
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Rejected { .. }));
    }

    #[test]
    fn events_follow_the_mutation_and_processed_comes_last() {
        let d = dispatcher();
        let rx = d.events().subscribe_channel();
        d.receive(create("Live")).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            DispatchEvent::ScenarioChanged { scenario: ScenarioId::new(1) }
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            DispatchEvent::TransmissionProcessed { number: 1, .. }
        ));
    }

    #[test]
    fn undeclared_failures_still_publish_processed() {
        let d = Arc::new(dispatcher());
        d.receive(create("Live")).unwrap();
        let rx = d.events().subscribe_channel();
        let reader = d.state().read_scenarios(d.context()).unwrap();

        let sender = Arc::clone(&d);
        let edit = Transmission::new(TransmissionKind::ScenarioEdit(ScenarioEdit {
            scenario: ScenarioId::new(1),
            edits: vec![DetailEdit::SetNotes("x".into())],
        }));
        let waiter = thread::spawn(move || sender.receive(edit));
        thread::sleep(Duration::from_millis(300));
        d.context().request_shutdown();
        let result = waiter.join().unwrap();
        drop(reader);

        assert!(matches!(result, Err(TransmissionError::State(StateError::Cancelled))));
        assert_eq!(d.state().last_transmission_number(), 2);
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        match &events[0] {
            DispatchEvent::TransmissionProcessed {
                number: 2,
                outcome: DispatchOutcome::Failed { number: 2, reason },
                ..
            } => assert!(reason.contains("cancel")),
            other => panic!("expected a failed TransmissionProcessed, got {:?}", other),
        }
    }

    #[test]
    fn erp_import_with_a_dangling_customer_is_rejected() {
        let d = dispatcher();
        d.receive(create("Live")).unwrap();
        let id = ScenarioId::new(1);
        let job = |customer: u64| Job {
            id: JobId::new(1),
            external_id: "J-1".into(),
            name: "Order".into(),
            customer: Some(CustomerId::new(customer)),
            due: None,
            operations: Vec::new(),
        };
        let import = |import: ErpImport| Transmission::new(TransmissionKind::ErpImport(import));

        let outcome = d
            .receive(import(ErpImport {
                scenario: id,
                plants: vec![Plant::new(PlantId::new(1), "P1", "One")],
                jobs: vec![job(7)],
                ..Default::default()
            }))
            .unwrap();
        match outcome {
            DispatchOutcome::Rejected { reason, .. } => assert!(reason.contains("unknown customer")),
            other => panic!("expected rejection, got {:?}", other),
        }
        let ctx = ProcessContext::server();
        let (plants, jobs) = d
            .state()
            .read_scenario_detail(&ctx, id, |s| (s.plant_count(), s.jobs.len()))
            .unwrap();
        assert_eq!((plants, jobs), (0, 0));

        // The customer may arrive in the same import as the job.
        let outcome = d
            .receive(import(ErpImport {
                scenario: id,
                customers: vec![Customer {
                    id: CustomerId::new(7),
                    external_id: "C-7".into(),
                    name: "Acme".into(),
                }],
                jobs: vec![job(7)],
                ..Default::default()
            }))
            .unwrap();
        assert!(outcome.is_applied());
    }

    #[test]
    fn import_completion_is_published_once() {
        let d = dispatcher();
        let rx = d.events().subscribe_channel();
        let signal = |s: ImportSignal| Transmission::new(TransmissionKind::Import(s));
        d.receive(signal(ImportSignal::Started { scenarios: vec![ScenarioId::new(1)] })).unwrap();
        d.receive(signal(ImportSignal::Completed)).unwrap();
        assert_eq!(d.pending_import_scenarios().unwrap(), 1);
        d.receive(signal(ImportSignal::ScenarioFinished(ScenarioId::new(1)))).unwrap();
        let completions = rx
            .try_iter()
            .filter(|e| *e == DispatchEvent::ImportCompleted)
            .count();
        assert_eq!(completions, 1);
    }

    #[test]
    fn import_in_flight_completes_after_switching_to_read_only() {
        let d = dispatcher();
        let rx = d.events().subscribe_channel();
        let signal = |s: ImportSignal| Transmission::new(TransmissionKind::Import(s));
        d.receive(signal(ImportSignal::Started { scenarios: vec![ScenarioId::new(1)] })).unwrap();
        d.receive(Transmission::new(TransmissionKind::SystemStateSwitch(SystemStateSwitch {
            read_only: true,
            status: LicenseStatus::Expired,
            reason: "expired".into(),
        })))
        .unwrap();

        assert!(d.receive(signal(ImportSignal::ScenarioFinished(ScenarioId::new(1)))).unwrap().is_applied());
        assert!(d.receive(signal(ImportSignal::Completed)).unwrap().is_applied());
        assert_eq!(d.pending_import_scenarios().unwrap(), 0);
        assert!(rx.try_iter().any(|e| e == DispatchEvent::ImportCompleted));
    }

    #[test]
    fn production_scenario_cannot_be_deleted() {
        let d = dispatcher();
        d.receive(create("Live")).unwrap();
        d.receive(create("What-if")).unwrap();
        let delete = |id| Transmission::new(TransmissionKind::Scenario(ScenarioAction::Delete(id)));
        assert!(matches!(
            d.receive(delete(ScenarioId::new(1))).unwrap(),
            DispatchOutcome::Rejected { .. }
        ));
        assert!(d.receive(delete(ScenarioId::new(2))).unwrap().is_applied());
    }
}
