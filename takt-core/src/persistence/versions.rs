//! Format version thresholds and the decode tables keyed on them.
//!
//! Thresholds only ever grow. A new field gets a new threshold above every
//! existing one; existing thresholds are never renumbered or reordered.

use super::codec::Reader;
use crate::error::CodecError;

/// Oldest layout this build can read.
pub const V_BASE: u32 = 100;
/// Scenario details carry customers; jobs reference a customer.
pub const V_CUSTOMERS: u32 = 200;
/// Users carry a permission level and last login instead of an admin flag.
/// Plants stop carrying a calendar id.
pub const V_USER_PERMISSIONS: u32 = 300;
/// Scenario details carry purchase orders.
pub const V_PURCHASE_ORDERS: u32 = 350;
/// Operations carry attributes; scenario details carry planner notes.
pub const V_OPERATION_ATTRIBUTES: u32 = 400;

pub const CURRENT_VERSION: u32 = V_OPERATION_ATTRIBUTES;
/// Streams below this must be upgraded by an intermediate release first.
pub const MIN_SUPPORTED_VERSION: u32 = V_BASE;

pub const ALL_THRESHOLDS: &[u32] = &[
    V_BASE,
    V_CUSTOMERS,
    V_USER_PERMISSIONS,
    V_PURCHASE_ORDERS,
    V_OPERATION_ATTRIBUTES,
];

pub type DecodeFn<T> = fn(&mut Reader<'_>) -> Result<T, CodecError>;

/// Decoders for one entity, highest threshold first. The first entry whose
/// threshold is at or below the stream version wins.
pub struct VersionTable<T: 'static> {
    entity: &'static str,
    entries: &'static [(u32, DecodeFn<T>)],
}

impl<T: 'static> VersionTable<T> {
    pub const fn new(entity: &'static str, entries: &'static [(u32, DecodeFn<T>)]) -> Self {
        Self { entity, entries }
    }

    pub fn select(&self, version: u32) -> Result<DecodeFn<T>, CodecError> {
        self.entries
            .iter()
            .find(|(threshold, _)| *threshold <= version)
            .map(|(_, decode)| *decode)
            .ok_or(CodecError::BelowFloor {
                found: version,
                floor: self.floor(),
            })
    }

    pub fn decode(&self, r: &mut Reader<'_>) -> Result<T, CodecError> {
        let decode = self.select(r.version())?;
        decode(r)
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn floor(&self) -> u32 {
        self.entries.last().map(|(t, _)| *t).unwrap_or(u32::MAX)
    }

    pub fn thresholds(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|(t, _)| *t)
    }

    /// Strictly descending and bottoming out at a known threshold.
    pub fn is_well_formed(&self) -> bool {
        let descending = self.entries.windows(2).all(|w| w[0].0 > w[1].0);
        let known = self.thresholds().all(|t| ALL_THRESHOLDS.contains(&t));
        descending && known && !self.entries.is_empty()
    }
}

/// Checks a stream version against the supported window.
pub fn check_supported(version: u32) -> Result<(), CodecError> {
    if version < MIN_SUPPORTED_VERSION {
        return Err(CodecError::BelowFloor {
            found: version,
            floor: MIN_SUPPORTED_VERSION,
        });
    }
    if version > CURRENT_VERSION {
        return Err(CodecError::NewerThanSupported {
            found: version,
            current: CURRENT_VERSION,
        });
    }
    Ok(())
}
