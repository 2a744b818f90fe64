use std::fmt::Display;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use takt_types::{
    Dispatcher, LicenseStatus, ScenarioDetail, SystemStateSwitch, Transmission, TransmissionKind,
};

use super::fingerprint::{DataModelActivation, FingerprintVerdict};
use super::key::{load_license, LicenseKey};
use crate::config::LicensePaths;
use crate::context::ProcessContext;
use crate::error::{LicenseError, StateError};
use crate::state::SystemState;
use crate::sync::Guarded;

/// Entity totals the license limits are checked against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LicenseUsage {
    /// Plants in the largest scenario
    pub max_scenario_plants: usize,
    pub active_users: usize,
}

/// Holds the installed license and decides the process's license status.
///
/// Status changes never touch the context directly; they are dispatched as
/// `SystemStateSwitch` transmissions so observers see them in order.
pub struct LicenseManager {
    state: Arc<SystemState>,
    ctx: Arc<ProcessContext>,
    key: RwLock<Option<LicenseKey>>,
    activation: RwLock<Option<DataModelActivation>>,
}

impl LicenseManager {
    pub fn new(state: Arc<SystemState>, ctx: Arc<ProcessContext>) -> Self {
        Self {
            state,
            ctx,
            key: RwLock::new(None),
            activation: RwLock::new(None),
        }
    }

    pub fn key(&self) -> Option<LicenseKey> {
        self.key.read().clone()
    }

    pub fn activation(&self) -> Option<DataModelActivation> {
        self.activation.read().clone()
    }

    /// Whether the installed license was activated offline with a fingerprint.
    pub fn is_offline_activated(&self) -> bool {
        self.activation.read().is_some()
    }

    pub fn usage(&self) -> Result<LicenseUsage, StateError> {
        let (details, active_users) = self.state.read_scenarios_and_users(&self.ctx, |scenarios, users| {
            let details: Vec<_> = scenarios.iter().map(|s| Arc::clone(s.detail())).collect();
            (details, users.active_count())
        })?;

        let mut max_scenario_plants = 0;
        for detail in details {
            let plants = read_detail(&detail, &self.ctx, |d| d.plant_count())?;
            max_scenario_plants = max_scenario_plants.max(plants);
        }
        Ok(LicenseUsage {
            max_scenario_plants,
            active_users,
        })
    }

    /// Check a key's dates and limits against the current state.
    pub fn evaluate(&self, key: &LicenseKey, now: DateTime<Utc>) -> Result<(), LicenseError> {
        if key.expiration < now {
            return Err(LicenseError::Status(LicenseStatus::Expired));
        }
        if key.maintenance_expiration < now {
            return Err(LicenseError::Status(LicenseStatus::MaintenanceExpired));
        }
        let usage = self.usage()?;
        if usage.max_scenario_plants > key.max_plants as usize {
            log::warn!(target: "license", "{} plants in use, license allows {}", usage.max_scenario_plants, key.max_plants);
            return Err(LicenseError::Status(LicenseStatus::PlantsExceeded));
        }
        if usage.active_users > key.max_users as usize {
            log::warn!(target: "license", "{} active users, license allows {}", usage.active_users, key.max_users);
            return Err(LicenseError::Status(LicenseStatus::UsersExceeded));
        }
        Ok(())
    }

    /// Compare the production scenario against the installed fingerprint.
    /// Clean when the license was not activated offline.
    pub fn recheck_fingerprint(&self) -> Result<FingerprintVerdict, LicenseError> {
        let Some(activation) = self.activation() else {
            return Ok(FingerprintVerdict::Clean);
        };
        match self.production_detail(|detail| activation.compare(detail)) {
            Ok(Some(verdict)) => verdict,
            // No scenarios at all: nothing to compare.
            Ok(None) => Ok(FingerprintVerdict::Clean),
            Err(e) => Err(e.into()),
        }
    }

    /// Generate a fingerprint of the current production scenario.
    pub fn generate_activation(&self) -> Result<Option<DataModelActivation>, StateError> {
        self.production_detail(DataModelActivation::generate)
    }

    /// Evaluate `key` and install it, dispatching the resulting state switch.
    ///
    /// A passing key that was loaded while the system was read-only switches
    /// it back to writable.
    pub fn install<D>(&self, key: LicenseKey, dispatcher: &D) -> LicenseStatus
    where
        D: Dispatcher,
        D::Error: Display,
    {
        let activation = match key.activation_token().map(DataModelActivation::from_key) {
            Some(Ok(a)) => Some(a),
            Some(Err(e)) => {
                log::error!(target: "license", "license {} has an unreadable activation key: {}", key.serial_code, e);
                self.switch(dispatcher, true, e.status(), e.to_string());
                return e.status();
            }
            None => None,
        };

        let verdict = self.evaluate(&key, Utc::now()).and_then(|()| match &activation {
            Some(a) => self
                .production_detail(|d| a.compare(d))?
                .unwrap_or(Ok(FingerprintVerdict::Clean)),
            None => Ok(FingerprintVerdict::Clean),
        });

        let serial = key.serial_code.clone();
        *self.key.write() = Some(key);
        *self.activation.write() = activation;

        match verdict {
            Ok(_) => {
                if self.ctx.is_read_only() || self.ctx.license_status() != LicenseStatus::Valid {
                    self.switch(dispatcher, false, LicenseStatus::Valid, format!("license {} reloaded", serial));
                }
                log::info!(target: "license", "license {} is valid", serial);
                LicenseStatus::Valid
            }
            Err(e) => {
                log::error!(target: "license", "license {} failed: {}", serial, e);
                self.switch(dispatcher, true, e.status(), e.to_string());
                e.status()
            }
        }
    }

    /// Load, verify and install the license at `paths`. A key that fails to
    /// load puts the system in read-only mode as `InvalidKey`.
    pub fn reload<D>(&self, paths: &LicensePaths, dispatcher: &D) -> LicenseStatus
    where
        D: Dispatcher,
        D::Error: Display,
    {
        match load_license(paths) {
            Ok(key) => self.install(key, dispatcher),
            Err(e) => {
                log::error!(target: "license", "could not load license from {}: {}", paths.key_path.display(), e);
                self.switch(dispatcher, true, e.status(), e.to_string());
                e.status()
            }
        }
    }

    pub(super) fn switch<D>(&self, dispatcher: &D, read_only: bool, status: LicenseStatus, reason: String)
    where
        D: Dispatcher,
        D::Error: Display,
    {
        let t = Transmission::new(TransmissionKind::SystemStateSwitch(SystemStateSwitch {
            read_only,
            status,
            reason,
        }));
        if let Err(e) = dispatcher.dispatch(t) {
            log::error!(target: "license", "could not dispatch system state switch: {}", e);
        }
    }

    fn production_detail<R>(&self, f: impl FnOnce(&ScenarioDetail) -> R) -> Result<Option<R>, StateError> {
        let production = self
            .state
            .read_scenarios(&self.ctx)?
            .production()
            .map(|s| s.id());
        match production {
            Some(id) => self.state.read_scenario_detail(&self.ctx, id, f).map(Some),
            None => Ok(None),
        }
    }
}

fn read_detail<R>(
    detail: &Guarded<ScenarioDetail>,
    ctx: &ProcessContext,
    f: impl FnOnce(&ScenarioDetail) -> R,
) -> Result<R, StateError> {
    let access = detail.enter_shared(ctx.retry_policy(), ctx.shutdown_token())?;
    Ok(f(&access))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{EventBus, TransmissionDispatcher};
    use chrono::Duration;
    use takt_types::{Plant, PlantId, ScenarioAction, ScenarioEdit, DetailEdit, ScenarioId, User, UserAction, UserId, UserPermission};

    fn setup() -> (Arc<LicenseManager>, TransmissionDispatcher) {
        let state = Arc::new(SystemState::blank(Utc::now()));
        let ctx = Arc::new(ProcessContext::server());
        let dispatcher = TransmissionDispatcher::new(Arc::clone(&state), Arc::clone(&ctx), Arc::new(EventBus::new()));
        (Arc::new(LicenseManager::new(state, ctx)), dispatcher)
    }

    fn key(max_plants: u32, max_users: u32) -> LicenseKey {
        LicenseKey {
            serial_code: "TK-1".into(),
            expiration: Utc::now() + Duration::days(30),
            maintenance_expiration: Utc::now() + Duration::days(30),
            packages: Vec::new(),
            max_plants,
            max_users,
            public_notes: String::new(),
        }
    }

    fn send(d: &TransmissionDispatcher, kind: TransmissionKind) {
        d.receive(Transmission::new(kind)).unwrap();
    }

    #[test]
    fn expiry_is_checked_before_limits() {
        let (manager, _) = setup();
        let mut k = key(10, 10);
        k.expiration = Utc::now() - Duration::days(1);
        assert_eq!(
            manager.evaluate(&k, Utc::now()).unwrap_err().status(),
            LicenseStatus::Expired
        );
        let mut k = key(10, 10);
        k.maintenance_expiration = Utc::now() - Duration::days(1);
        assert_eq!(
            manager.evaluate(&k, Utc::now()).unwrap_err().status(),
            LicenseStatus::MaintenanceExpired
        );
    }

    #[test]
    fn limits_count_the_largest_scenario_and_active_users() {
        let (manager, d) = setup();
        send(&d, TransmissionKind::Scenario(ScenarioAction::Create { name: "Live".into() }));
        send(&d, TransmissionKind::Scenario(ScenarioAction::Create { name: "Big".into() }));
        send(
            &d,
            TransmissionKind::ScenarioEdit(ScenarioEdit {
                scenario: ScenarioId::new(2),
                edits: (1..=3)
                    .map(|i| DetailEdit::AddPlant(Plant::new(PlantId::new(i), format!("P{}", i), "p")))
                    .collect(),
            }),
        );
        for i in 1..=3 {
            send(&d, TransmissionKind::User(UserAction::Add(User::new(UserId::new(i), format!("u{}", i), UserPermission::Planner))));
        }
        send(&d, TransmissionKind::User(UserAction::SetActive(UserId::new(3), false)));

        assert_eq!(
            manager.usage().unwrap(),
            LicenseUsage { max_scenario_plants: 3, active_users: 2 }
        );
        assert!(manager.evaluate(&key(3, 2), Utc::now()).is_ok());
        assert_eq!(
            manager.evaluate(&key(2, 2), Utc::now()).unwrap_err().status(),
            LicenseStatus::PlantsExceeded
        );
        assert_eq!(
            manager.evaluate(&key(3, 1), Utc::now()).unwrap_err().status(),
            LicenseStatus::UsersExceeded
        );
    }

    #[test]
    fn failing_install_goes_read_only_and_a_good_one_recovers() {
        let (manager, d) = setup();
        let mut expired = key(10, 10);
        expired.expiration = Utc::now() - Duration::days(1);
        assert_eq!(manager.install(expired, &d), LicenseStatus::Expired);
        assert!(d.context().is_read_only());
        assert_eq!(d.context().license_status(), LicenseStatus::Expired);

        assert_eq!(manager.install(key(10, 10), &d), LicenseStatus::Valid);
        assert!(!d.context().is_read_only());
    }

    #[test]
    fn activation_token_arms_the_fingerprint() {
        let (manager, d) = setup();
        send(&d, TransmissionKind::Scenario(ScenarioAction::Create { name: "Live".into() }));
        send(
            &d,
            TransmissionKind::ScenarioEdit(ScenarioEdit {
                scenario: ScenarioId::new(1),
                edits: vec![DetailEdit::AddPlant(Plant::new(PlantId::new(1), "P1", "One"))],
            }),
        );
        let activation = manager.generate_activation().unwrap().unwrap();
        let mut k = key(5, 5);
        k.public_notes = format!("dmakey|{}|", activation.to_key());
        assert_eq!(manager.install(k, &d), LicenseStatus::Valid);
        assert!(manager.is_offline_activated());
        assert!(manager.recheck_fingerprint().unwrap().is_clean());

        send(
            &d,
            TransmissionKind::ScenarioEdit(ScenarioEdit {
                scenario: ScenarioId::new(1),
                edits: vec![DetailEdit::AddPlant(Plant::new(PlantId::new(2), "P2", "Two"))],
            }),
        );
        assert!(matches!(
            manager.recheck_fingerprint(),
            Err(LicenseError::PlantCountChanged { expected: 1, found: 2 })
        ));
    }

    #[test]
    fn unreadable_activation_key_is_an_invalid_key() {
        let (manager, d) = setup();
        let mut k = key(5, 5);
        k.public_notes = "dmakey|%%%|".into();
        assert_eq!(manager.install(k, &d), LicenseStatus::InvalidKey);
        assert!(d.context().is_read_only());
    }
}
