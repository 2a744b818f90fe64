//! Scenario collection: ordered scenarios, each owning a guarded detail.

use std::sync::Arc;

use takt_types::{ScenarioDetail, ScenarioId};

use crate::error::StateError;
use crate::sync::Guarded;

pub const DETAIL_LABEL: &str = "scenario-detail";

/// One planning dataset. The detail has its own guard, which is only ever
/// acquired after the collection guard that located the scenario.
pub struct Scenario {
    id: ScenarioId,
    pub name: String,
    detail: Arc<Guarded<ScenarioDetail>>,
}

impl Scenario {
    pub fn new(id: ScenarioId, name: impl Into<String>, detail: ScenarioDetail) -> Self {
        Self {
            id,
            name: name.into(),
            detail: Arc::new(Guarded::new(DETAIL_LABEL, detail)),
        }
    }

    pub fn id(&self) -> ScenarioId {
        self.id
    }

    pub fn detail(&self) -> &Arc<Guarded<ScenarioDetail>> {
        &self.detail
    }
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct ScenarioCollection {
    scenarios: Vec<Scenario>,
    next_id: u64,
}

impl ScenarioCollection {
    pub fn new() -> Self {
        Self {
            scenarios: Vec::new(),
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter()
    }

    pub fn ids(&self) -> Vec<ScenarioId> {
        self.scenarios.iter().map(|s| s.id).collect()
    }

    pub fn get(&self, id: ScenarioId) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: ScenarioId) -> Option<&mut Scenario> {
        self.scenarios.iter_mut().find(|s| s.id == id)
    }

    /// The first scenario is the production (live) scenario.
    pub fn production(&self) -> Option<&Scenario> {
        self.scenarios.first()
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Restore the id allocator; never moves it below an existing id.
    pub(crate) fn set_next_id(&mut self, next_id: u64) {
        let floor = self.scenarios.iter().map(|s| s.id.get() + 1).max().unwrap_or(1);
        self.next_id = next_id.max(floor);
    }

    pub fn create(&mut self, name: impl Into<String>, detail: ScenarioDetail) -> ScenarioId {
        let id = ScenarioId::new(self.next_id);
        self.next_id += 1;
        self.scenarios.push(Scenario::new(id, name, detail));
        id
    }

    /// Insert a scenario with a preassigned id (used when restoring state).
    pub fn insert(&mut self, scenario: Scenario) -> Result<(), StateError> {
        if self.get(scenario.id).is_some() {
            return Err(StateError::DuplicateEntity {
                kind: "scenario",
                id: scenario.id.get(),
            });
        }
        self.next_id = self.next_id.max(scenario.id.get() + 1);
        self.scenarios.push(scenario);
        Ok(())
    }

    pub fn remove(&mut self, id: ScenarioId) -> Result<Scenario, StateError> {
        let pos = self
            .scenarios
            .iter()
            .position(|s| s.id == id)
            .ok_or(StateError::ScenarioNotFound(id))?;
        Ok(self.scenarios.remove(pos))
    }
}
