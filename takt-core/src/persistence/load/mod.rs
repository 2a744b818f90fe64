//! Readers. Each entity picks its decoder from a version table.

mod scenario;
mod users;

pub use scenario::read_detail;
pub use users::read_user;

#[cfg(test)]
pub(crate) use scenario::{DETAIL, JOB, OPERATION, PLANT};
#[cfg(test)]
pub(crate) use users::USER;

use takt_types::{ScenarioId, SystemSettings};

use super::codec::Reader;
use super::versions::check_supported;
use super::{ScenarioSnapshot, StateSnapshot};
use crate::error::CodecError;

/// Decode a full state stream. Returns the snapshot and the version it was
/// written with.
pub fn read_state(bytes: &[u8]) -> Result<(StateSnapshot, u32), CodecError> {
    let mut r = Reader::open(bytes)?;
    let version = r.version();
    check_supported(version)?;

    let start_date = r.datetime()?;
    let last_transmission_number = r.u64()?;
    let settings = read_settings(&mut r)?;
    let next_scenario_id = r.u64()?;
    let scenarios = r.list(read_scenario)?;
    let users = r.list(read_user)?;

    if r.remaining() != 0 {
        return Err(CodecError::Corrupt(format!(
            "{} trailing bytes after state",
            r.remaining()
        )));
    }

    Ok((
        StateSnapshot {
            start_date,
            last_transmission_number,
            settings,
            next_scenario_id,
            scenarios,
            users,
        },
        version,
    ))
}

fn read_settings(r: &mut Reader<'_>) -> Result<SystemSettings, CodecError> {
    Ok(SystemSettings {
        instance_name: r.string()?,
        session_timeout_minutes: r.u32()?,
        recording_enabled: r.bool()?,
    })
}

fn read_scenario(r: &mut Reader<'_>) -> Result<ScenarioSnapshot, CodecError> {
    Ok(ScenarioSnapshot {
        id: ScenarioId::new(r.u64()?),
        name: r.string()?,
        detail: read_detail(r)?,
    })
}
