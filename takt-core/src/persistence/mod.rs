//! Versioned binary persistence of the system state.
//!
//! The stream starts with a magic and the format version it was written in.
//! Writers only produce [`CURRENT_VERSION`]; readers accept every version
//! from [`MIN_SUPPORTED_VERSION`] up, choosing per-entity decoders from
//! version tables (see `versions`).

pub mod codec;
pub mod load;
pub mod save;
pub mod versions;
#[cfg(test)]
mod tests;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use takt_types::{ScenarioDetail, ScenarioId, SystemSettings, User};

use crate::context::ProcessContext;
use crate::error::{CodecError, StateError};
use crate::state::{Scenario, ScenarioCollection, SystemState, UserCollection};

pub use codec::{Reader, WriteMode, Writer};
pub use versions::{CURRENT_VERSION, MIN_SUPPORTED_VERSION};

/// Plain copy of everything that is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub start_date: DateTime<Utc>,
    pub last_transmission_number: u64,
    pub settings: SystemSettings,
    pub next_scenario_id: u64,
    pub scenarios: Vec<ScenarioSnapshot>,
    pub users: Vec<User>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSnapshot {
    pub id: ScenarioId,
    pub name: String,
    pub detail: ScenarioDetail,
}

impl StateSnapshot {
    /// Copy the live state. Each guard is taken and released in turn;
    /// scenario details are read after the collection guard is released.
    pub fn capture(state: &SystemState, ctx: &ProcessContext) -> Result<Self, StateError> {
        let settings = state.read_settings(ctx)?.clone();

        let (next_scenario_id, entries) = {
            let collection = state.read_scenarios(ctx)?;
            let entries: Vec<_> = collection
                .iter()
                .map(|s| (s.id(), s.name.clone(), Arc::clone(s.detail())))
                .collect();
            (collection.next_id(), entries)
        };

        let mut scenarios = Vec::with_capacity(entries.len());
        for (id, name, detail) in entries {
            let detail = detail.enter_shared(ctx.retry_policy(), ctx.shutdown_token())?;
            scenarios.push(ScenarioSnapshot {
                id,
                name,
                detail: (*detail).clone(),
            });
        }

        let users = state.read_users(ctx)?.iter().cloned().collect();

        Ok(Self {
            start_date: state.start_date(),
            last_transmission_number: state.last_transmission_number(),
            settings,
            next_scenario_id,
            scenarios,
            users,
        })
    }

    /// Build a live state from a decoded snapshot.
    pub fn into_state(self, format_version: u32) -> Result<SystemState, StateError> {
        let mut scenarios = ScenarioCollection::new();
        for s in self.scenarios {
            scenarios.insert(Scenario::new(s.id, s.name, s.detail))?;
        }
        scenarios.set_next_id(self.next_scenario_id);

        let mut users = UserCollection::new();
        for user in self.users {
            users.add(user)?;
        }

        Ok(SystemState::from_parts(
            self.start_date,
            format_version,
            self.last_transmission_number,
            self.settings,
            scenarios,
            users,
        ))
    }
}

pub fn encode_snapshot(snapshot: &StateSnapshot, mode: WriteMode) -> Result<Vec<u8>, CodecError> {
    let mut w = Writer::new(Vec::new(), mode);
    save::write_state(&mut w, snapshot)?;
    Ok(w.into_inner())
}

/// Returns the snapshot and the format version the stream was written in.
pub fn decode_snapshot(bytes: &[u8]) -> Result<(StateSnapshot, u32), CodecError> {
    load::read_state(bytes)
}

pub fn encode_state(
    state: &SystemState,
    ctx: &ProcessContext,
    mode: WriteMode,
) -> Result<Vec<u8>, CodecError> {
    let snapshot = StateSnapshot::capture(state, ctx)?;
    encode_snapshot(&snapshot, mode)
}

pub fn decode_state(bytes: &[u8]) -> Result<SystemState, CodecError> {
    let (snapshot, version) = decode_snapshot(bytes)?;
    Ok(snapshot.into_state(version)?)
}

/// Write the full state to `path`, replacing any previous file atomically.
pub fn save_state(path: &Path, state: &SystemState, ctx: &ProcessContext) -> Result<(), CodecError> {
    let bytes = encode_state(state, ctx, WriteMode::Full)?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    state.set_format_version(CURRENT_VERSION);
    log::info!(
        target: "persistence",
        "saved state to {} ({} bytes, format {}, last transmission {})",
        path.display(),
        bytes.len(),
        CURRENT_VERSION,
        state.last_transmission_number()
    );
    Ok(())
}

/// Read a state file. Streams below the supported floor abort the load.
pub fn load_state(path: &Path) -> Result<SystemState, CodecError> {
    let bytes = std::fs::read(path)?;
    let state = decode_state(&bytes).map_err(|e| {
        log::error!(target: "persistence", "failed to load {}: {}", path.display(), e);
        e
    })?;
    if state.format_version() < CURRENT_VERSION {
        log::info!(
            target: "persistence",
            "loaded {} written in format {}; it will be upgraded to {} on next save",
            path.display(),
            state.format_version(),
            CURRENT_VERSION
        );
    }
    Ok(state)
}
