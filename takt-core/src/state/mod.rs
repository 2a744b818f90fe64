//! Root aggregate: system state with guarded collections.
//!
//! Lock order is fixed: scenario collection, then scenario detail, then the
//! user collection. The helpers here are the only places that take more than
//! one guard, so every call site inherits that order.

mod scenarios;
mod users;

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use takt_types::{ScenarioDetail, ScenarioId, SystemSettings};

use crate::context::ProcessContext;
use crate::error::{AcquireError, StateError};
use crate::sync::{ExclusiveAccess, Guarded, SharedAccess};

pub use scenarios::{Scenario, ScenarioCollection, DETAIL_LABEL};
pub use users::UserCollection;

/// Mutating call sites start their backoff here; readers use the policy's
/// configured initial timeout.
pub const WRITER_INITIAL_TIMEOUT: Duration = Duration::from_millis(250);

pub struct SystemState {
    start_date: DateTime<Utc>,
    format_version: AtomicU32,
    last_transmission_number: AtomicU64,
    settings: Guarded<SystemSettings>,
    scenarios: Guarded<ScenarioCollection>,
    users: Guarded<UserCollection>,
}

impl SystemState {
    /// Fresh state with no scenarios and no users.
    pub fn blank(start_date: DateTime<Utc>) -> Self {
        Self::from_parts(
            start_date,
            crate::persistence::CURRENT_VERSION,
            0,
            SystemSettings::default(),
            ScenarioCollection::new(),
            UserCollection::new(),
        )
    }

    pub(crate) fn from_parts(
        start_date: DateTime<Utc>,
        format_version: u32,
        last_transmission_number: u64,
        settings: SystemSettings,
        scenarios: ScenarioCollection,
        users: UserCollection,
    ) -> Self {
        Self {
            start_date,
            format_version: AtomicU32::new(format_version),
            last_transmission_number: AtomicU64::new(last_transmission_number),
            settings: Guarded::new("settings", settings),
            scenarios: Guarded::new("scenarios", scenarios),
            users: Guarded::new("users", users),
        }
    }

    pub fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    /// Version the persisted data was last written with.
    pub fn format_version(&self) -> u32 {
        self.format_version.load(Ordering::SeqCst)
    }

    pub(crate) fn set_format_version(&self, version: u32) {
        self.format_version.store(version, Ordering::SeqCst);
    }

    pub fn last_transmission_number(&self) -> u64 {
        self.last_transmission_number.load(Ordering::SeqCst)
    }

    /// Moves the counter forward to `number`. Never moves it backwards.
    pub(crate) fn advance_transmission_number(&self, number: u64) {
        self.last_transmission_number.fetch_max(number, Ordering::SeqCst);
    }

    pub fn settings(&self) -> &Guarded<SystemSettings> {
        &self.settings
    }

    pub fn scenarios(&self) -> &Guarded<ScenarioCollection> {
        &self.scenarios
    }

    pub fn users(&self) -> &Guarded<UserCollection> {
        &self.users
    }

    pub fn read_settings(
        &self,
        ctx: &ProcessContext,
    ) -> Result<SharedAccess<'_, SystemSettings>, StateError> {
        Ok(self.settings.enter_shared(ctx.retry_policy(), ctx.shutdown_token())?)
    }

    pub fn write_settings(
        &self,
        ctx: &ProcessContext,
    ) -> Result<ExclusiveAccess<'_, SystemSettings>, StateError> {
        let policy = ctx.retry_policy().starting_at(WRITER_INITIAL_TIMEOUT);
        Ok(self.settings.enter_exclusive(&policy, ctx.shutdown_token())?)
    }

    pub fn read_scenarios(
        &self,
        ctx: &ProcessContext,
    ) -> Result<SharedAccess<'_, ScenarioCollection>, StateError> {
        Ok(self.scenarios.enter_shared(ctx.retry_policy(), ctx.shutdown_token())?)
    }

    pub fn write_scenarios(
        &self,
        ctx: &ProcessContext,
    ) -> Result<ExclusiveAccess<'_, ScenarioCollection>, StateError> {
        let policy = ctx.retry_policy().starting_at(WRITER_INITIAL_TIMEOUT);
        Ok(self.scenarios.enter_exclusive(&policy, ctx.shutdown_token())?)
    }

    pub fn read_users(
        &self,
        ctx: &ProcessContext,
    ) -> Result<SharedAccess<'_, UserCollection>, StateError> {
        Ok(self.users.enter_shared(ctx.retry_policy(), ctx.shutdown_token())?)
    }

    pub fn write_users(
        &self,
        ctx: &ProcessContext,
    ) -> Result<ExclusiveAccess<'_, UserCollection>, StateError> {
        let policy = ctx.retry_policy().starting_at(WRITER_INITIAL_TIMEOUT);
        Ok(self.users.enter_exclusive(&policy, ctx.shutdown_token())?)
    }

    /// Shared access to both collections, scenarios first.
    pub fn read_scenarios_and_users<R>(
        &self,
        ctx: &ProcessContext,
        f: impl FnOnce(&ScenarioCollection, &UserCollection) -> R,
    ) -> Result<R, StateError> {
        let scenarios = self.read_scenarios(ctx)?;
        let users = self.read_users(ctx)?;
        Ok(f(&scenarios, &users))
    }

    /// Exclusive access to both collections, scenarios first.
    pub fn write_scenarios_and_users<R>(
        &self,
        ctx: &ProcessContext,
        f: impl FnOnce(&mut ScenarioCollection, &mut UserCollection) -> R,
    ) -> Result<R, StateError> {
        let mut scenarios = self.write_scenarios(ctx)?;
        let mut users = self.write_users(ctx)?;
        Ok(f(&mut scenarios, &mut users))
    }

    /// Shared access to one scenario's detail.
    ///
    /// Takes the collection shared, locates the scenario, then makes one
    /// timed attempt on its detail. On timeout both are released and the
    /// whole sequence retries with a longer timeout. The collection guard is
    /// released before `f` runs.
    pub fn read_scenario_detail<R>(
        &self,
        ctx: &ProcessContext,
        id: ScenarioId,
        f: impl FnOnce(&ScenarioDetail) -> R,
    ) -> Result<R, StateError> {
        let cancel = ctx.shutdown_token();
        for timeout in ctx.retry_policy().backoff() {
            if cancel.is_cancelled() {
                break;
            }
            let collection = match self.scenarios.try_enter_shared(timeout) {
                Ok(c) => c,
                Err(AcquireError::Timeout { .. }) => continue,
                Err(e) => return Err(e.into()),
            };
            let detail = collection
                .get(id)
                .ok_or(StateError::ScenarioNotFound(id))?
                .detail()
                .clone();
            let attempt = detail.try_enter_shared(timeout);
            drop(collection);
            match attempt {
                Ok(access) => return Ok(f(&access)),
                Err(AcquireError::Timeout { .. }) => {
                    log::debug!(target: "lock", "scenario {} detail busy after {:?}, retrying", id, timeout);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StateError::Cancelled)
    }

    /// Exclusive access to a scenario's detail while the collection is held
    /// exclusively, which is how the dispatcher applies scenario edits.
    ///
    /// Same retry shape as `read_scenario_detail`, but both guards stay held
    /// for the duration of `f`.
    pub fn edit_scenario<R>(
        &self,
        ctx: &ProcessContext,
        id: ScenarioId,
        f: impl FnOnce(&mut ScenarioCollection, &mut ScenarioDetail) -> R,
    ) -> Result<R, StateError> {
        let cancel = ctx.shutdown_token();
        let policy = ctx.retry_policy().starting_at(WRITER_INITIAL_TIMEOUT);
        for timeout in policy.backoff() {
            if cancel.is_cancelled() {
                break;
            }
            let mut collection = match self.scenarios.try_enter_exclusive(timeout) {
                Ok(c) => c,
                Err(AcquireError::Timeout { .. }) => continue,
                Err(e) => return Err(e.into()),
            };
            let detail = collection
                .get(id)
                .ok_or(StateError::ScenarioNotFound(id))?
                .detail()
                .clone();
            match detail.try_enter_exclusive(timeout) {
                Ok(mut access) => return Ok(f(&mut collection, &mut access)),
                Err(AcquireError::Timeout { .. }) => {
                    drop(collection);
                    log::debug!(target: "lock", "scenario {} detail busy after {:?}, releasing collection", id, timeout);
                }
                Err(e) => return Err(e.into()),
            };
        }
        Err(StateError::Cancelled)
    }
}

impl std::fmt::Debug for SystemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemState")
            .field("start_date", &self.start_date)
            .field("format_version", &self.format_version())
            .field("last_transmission_number", &self.last_transmission_number())
            .finish_non_exhaustive()
    }
}
