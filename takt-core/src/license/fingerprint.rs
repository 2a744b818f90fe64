//! Data-model fingerprint for offline activation.
//!
//! A fingerprint samples up to five identifiers from each category of a
//! scenario, hashes each to 16 bits, and serializes the per-module lists in a
//! fixed order:
//!
//! ```text
//! +---------+-----------------------------+-----+------------------------+
//! | ver u8  | module 0: count u16, u16... | ... | counts: n u16, u64...  |
//! +---------+-----------------------------+-----+------------------------+
//! ```
//!
//! The activation key is the base64 of that buffer. Comparison checks how
//! many stored hashes still appear anywhere in the live category; positions
//! do not matter.

use std::collections::HashSet;
use std::io::{Cursor, Read};

use base64::{engine::general_purpose, Engine as _};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use takt_types::ScenarioDetail;

use crate::error::LicenseError;

pub const FINGERPRINT_VERSION: u8 = 1;

/// Identifiers sampled per category.
pub const SAMPLE_COUNT: usize = 5;

/// Evenly strided sample positions for a category of `total` elements.
pub fn sample_indices(total: usize) -> Vec<usize> {
    let stride = (total / SAMPLE_COUNT).max(1);
    (0..total.min(SAMPLE_COUNT)).map(|i| i * stride).collect()
}

/// FNV-1a folded to 16 bits.
pub fn hash16(identifier: &str) -> u16 {
    let mut h: u32 = 0x811c_9dc5;
    for b in identifier.as_bytes() {
        h ^= u32::from(*b);
        h = h.wrapping_mul(0x0100_0193);
    }
    ((h >> 16) ^ (h & 0xffff)) as u16
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Ratios strictly below this fail the check.
    pub fail: f64,
    /// Ratios strictly below this (and not failing) raise a warning.
    pub danger: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Fail,
    Danger,
    Clean,
}

impl Thresholds {
    pub const fn new(fail: f64, danger: f64) -> Self {
        Self { fail, danger }
    }

    pub fn classify(&self, ratio: f64) -> Band {
        if ratio < self.fail {
            Band::Fail
        } else if ratio < self.danger {
            Band::Danger
        } else {
            Band::Clean
        }
    }
}

/// Sampled categories, in serialization order. `Counts` is always last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FingerprintModule {
    ResourceNames,
    ItemExternalIds,
    OperationAttributeNames,
    PurchaseOrders,
    Warehouses,
    Capabilities,
    Customers,
    Plants,
    Departments,
    Features,
    Counts,
}

impl FingerprintModule {
    pub const ALL: [FingerprintModule; 11] = [
        FingerprintModule::ResourceNames,
        FingerprintModule::ItemExternalIds,
        FingerprintModule::OperationAttributeNames,
        FingerprintModule::PurchaseOrders,
        FingerprintModule::Warehouses,
        FingerprintModule::Capabilities,
        FingerprintModule::Customers,
        FingerprintModule::Plants,
        FingerprintModule::Departments,
        FingerprintModule::Features,
        FingerprintModule::Counts,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FingerprintModule::ResourceNames => "resource-names",
            FingerprintModule::ItemExternalIds => "item-external-ids",
            FingerprintModule::OperationAttributeNames => "operation-attribute-names",
            FingerprintModule::PurchaseOrders => "purchase-orders",
            FingerprintModule::Warehouses => "warehouses",
            FingerprintModule::Capabilities => "capabilities",
            FingerprintModule::Customers => "customers",
            FingerprintModule::Plants => "plants",
            FingerprintModule::Departments => "departments",
            FingerprintModule::Features => "features",
            FingerprintModule::Counts => "counts",
        }
    }

    /// Plants and warehouses rarely change; a large swing there points at a
    /// different dataset rather than normal planning churn.
    pub fn thresholds(self) -> Thresholds {
        match self {
            FingerprintModule::Plants => Thresholds::new(0.8, 0.99),
            FingerprintModule::Warehouses => Thresholds::new(0.8, 0.9),
            FingerprintModule::Counts => Thresholds::new(0.2, 0.5),
            _ => Thresholds::new(0.5, 0.75),
        }
    }

    /// Identifiers in the category, in model order. Empty for `Counts`.
    fn identifiers(self, detail: &ScenarioDetail) -> Vec<String> {
        match self {
            FingerprintModule::ResourceNames => detail.resources().map(|r| r.name.clone()).collect(),
            FingerprintModule::ItemExternalIds => {
                detail.items.iter().map(|i| i.external_id.clone()).collect()
            }
            FingerprintModule::OperationAttributeNames => {
                let mut seen = HashSet::new();
                detail
                    .operations()
                    .flat_map(|o| o.attributes.iter())
                    .filter(|a| seen.insert(a.name.as_str()))
                    .map(|a| a.name.clone())
                    .collect()
            }
            FingerprintModule::PurchaseOrders => detail
                .purchase_orders
                .iter()
                .map(|po| po.external_id.clone())
                .collect(),
            FingerprintModule::Warehouses => {
                detail.warehouses.iter().map(|w| w.external_id.clone()).collect()
            }
            FingerprintModule::Capabilities => {
                detail.capabilities.iter().map(|c| c.external_id.clone()).collect()
            }
            FingerprintModule::Customers => {
                detail.customers.iter().map(|c| c.external_id.clone()).collect()
            }
            FingerprintModule::Plants => detail.plants.iter().map(|p| p.external_id.clone()).collect(),
            FingerprintModule::Departments => {
                detail.departments().map(|d| d.external_id.clone()).collect()
            }
            FingerprintModule::Features => enabled_features(detail)
                .into_iter()
                .map(str::to_string)
                .collect(),
            FingerprintModule::Counts => Vec::new(),
        }
    }

    /// Hashes of the strided sample of this module's identifiers.
    fn sample_hashes(self, detail: &ScenarioDetail) -> Vec<u16> {
        let ids = self.identifiers(detail);
        sample_indices(ids.len())
            .into_iter()
            .map(|i| hash16(&ids[i]))
            .collect()
    }
}

fn enabled_features(detail: &ScenarioDetail) -> Vec<&'static str> {
    let mut features = Vec::new();
    if !detail.customers.is_empty() {
        features.push("customers");
    }
    if !detail.purchase_orders.is_empty() {
        features.push("purchase-orders");
    }
    if detail.operations().any(|o| !o.attributes.is_empty()) {
        features.push("operation-attributes");
    }
    if detail.operations().any(|o| o.required_capability.is_some()) {
        features.push("capability-routing");
    }
    if detail.jobs.iter().any(|j| j.due.is_some()) {
        features.push("due-dates");
    }
    features
}

/// Raw entity counts. The plant count must match exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityCounts {
    pub plants: u64,
    pub departments: u64,
    pub resources: u64,
    pub jobs: u64,
    pub items: u64,
}

impl EntityCounts {
    pub fn of(detail: &ScenarioDetail) -> Self {
        Self {
            plants: detail.plants.len() as u64,
            departments: detail.departments().count() as u64,
            resources: detail.resource_count() as u64,
            jobs: detail.jobs.len() as u64,
            items: detail.items.len() as u64,
        }
    }

    fn as_array(&self) -> [u64; 5] {
        [self.plants, self.departments, self.resources, self.jobs, self.items]
    }

    /// Mean closeness of every count but plants; 1.0 when both sides are zero.
    fn similarity(&self, live: &EntityCounts) -> f64 {
        let stored = self.as_array();
        let live = live.as_array();
        let ratios: Vec<f64> = stored[1..]
            .iter()
            .zip(&live[1..])
            .map(|(&s, &l)| match s.max(l) {
                0 => 1.0,
                max => s.min(l) as f64 / max as f64,
            })
            .collect();
        ratios.iter().sum::<f64>() / ratios.len() as f64
    }
}

/// One module's comparison result.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleReport {
    pub module: FingerprintModule,
    pub ratio: f64,
    pub band: Band,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FingerprintVerdict {
    Clean,
    /// At least one module is in its danger band. The system stays writable.
    Danger(Vec<ModuleReport>),
}

impl FingerprintVerdict {
    pub fn is_clean(&self) -> bool {
        matches!(self, FingerprintVerdict::Clean)
    }
}

/// A stored fingerprint of one scenario's data model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataModelActivation {
    samples: Vec<(FingerprintModule, Vec<u16>)>,
    counts: EntityCounts,
}

impl DataModelActivation {
    pub fn generate(detail: &ScenarioDetail) -> Self {
        let samples = FingerprintModule::ALL
            .iter()
            .filter(|m| **m != FingerprintModule::Counts)
            .map(|&module| (module, module.sample_hashes(detail)))
            .collect();
        Self {
            samples,
            counts: EntityCounts::of(detail),
        }
    }

    pub fn samples(&self, module: FingerprintModule) -> &[u16] {
        self.samples
            .iter()
            .find(|(m, _)| *m == module)
            .map(|(_, h)| h.as_slice())
            .unwrap_or(&[])
    }

    pub fn counts(&self) -> EntityCounts {
        self.counts
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![FINGERPRINT_VERSION];
        for (_, hashes) in &self.samples {
            // Vec<u8> writes are infallible.
            let _ = buf.write_u16::<LittleEndian>(hashes.len() as u16);
            for h in hashes {
                let _ = buf.write_u16::<LittleEndian>(*h);
            }
        }
        let counts = self.counts.as_array();
        let _ = buf.write_u16::<LittleEndian>(counts.len() as u16);
        for c in counts {
            let _ = buf.write_u64::<LittleEndian>(c);
        }
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LicenseError> {
        let bad = |e: std::io::Error| LicenseError::BadActivationKey(e.to_string());
        let mut cur = Cursor::new(bytes);
        let version = cur.read_u8().map_err(bad)?;
        if version != FINGERPRINT_VERSION {
            return Err(LicenseError::BadActivationKey(format!(
                "unsupported fingerprint version {}",
                version
            )));
        }

        let mut samples = Vec::new();
        for module in FingerprintModule::ALL {
            if module == FingerprintModule::Counts {
                continue;
            }
            let n = cur.read_u16::<LittleEndian>().map_err(bad)? as usize;
            if n > SAMPLE_COUNT {
                return Err(LicenseError::BadActivationKey(format!(
                    "{} lists {} samples",
                    module.name(),
                    n
                )));
            }
            let mut hashes = Vec::with_capacity(n);
            for _ in 0..n {
                hashes.push(cur.read_u16::<LittleEndian>().map_err(bad)?);
            }
            samples.push((module, hashes));
        }

        let n = cur.read_u16::<LittleEndian>().map_err(bad)?;
        if n != 5 {
            return Err(LicenseError::BadActivationKey(format!("expected 5 counts, found {}", n)));
        }
        let mut counts = [0u64; 5];
        for c in counts.iter_mut() {
            *c = cur.read_u64::<LittleEndian>().map_err(bad)?;
        }
        let mut rest = Vec::new();
        cur.read_to_end(&mut rest).map_err(bad)?;
        if !rest.is_empty() {
            return Err(LicenseError::BadActivationKey(format!("{} trailing bytes", rest.len())));
        }

        Ok(Self {
            samples,
            counts: EntityCounts {
                plants: counts[0],
                departments: counts[1],
                resources: counts[2],
                jobs: counts[3],
                items: counts[4],
            },
        })
    }

    pub fn to_key(&self) -> String {
        general_purpose::STANDARD.encode(self.to_bytes())
    }

    pub fn from_key(key: &str) -> Result<Self, LicenseError> {
        let bytes = general_purpose::STANDARD
            .decode(key.trim())
            .map_err(|e| LicenseError::BadActivationKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Compare against the live model.
    ///
    /// Each category is re-sampled from the live model with the same stride
    /// rule, and the stored hashes are looked up in that sample; positions do
    /// not have to line up. Returns `Err` on the first module below its fail
    /// threshold, or when the plant count differs at all.
    pub fn compare(&self, live: &ScenarioDetail) -> Result<FingerprintVerdict, LicenseError> {
        let mut danger = Vec::new();
        for (module, stored) in &self.samples {
            let live_set: HashSet<u16> = module.sample_hashes(live).into_iter().collect();
            if live_set.is_empty() || stored.is_empty() {
                continue;
            }
            let found = stored.iter().filter(|h| live_set.contains(h)).count();
            let ratio = found as f64 / stored.len() as f64;
            self.judge(*module, ratio, &mut danger)?;
        }

        let live_counts = EntityCounts::of(live);
        if live_counts.plants != self.counts.plants {
            return Err(LicenseError::PlantCountChanged {
                expected: self.counts.plants,
                found: live_counts.plants,
            });
        }
        let ratio = self.counts.similarity(&live_counts);
        self.judge(FingerprintModule::Counts, ratio, &mut danger)?;

        if danger.is_empty() {
            Ok(FingerprintVerdict::Clean)
        } else {
            Ok(FingerprintVerdict::Danger(danger))
        }
    }

    fn judge(
        &self,
        module: FingerprintModule,
        ratio: f64,
        danger: &mut Vec<ModuleReport>,
    ) -> Result<(), LicenseError> {
        let thresholds = module.thresholds();
        match thresholds.classify(ratio) {
            Band::Fail => {
                log::warn!(target: "license", "{} fingerprint at {:.3}, below {:.3}", module.name(), ratio, thresholds.fail);
                Err(LicenseError::Divergence {
                    module: module.name(),
                    ratio,
                    threshold: thresholds.fail,
                })
            }
            Band::Danger => {
                log::debug!(target: "license", "{} fingerprint in danger band at {:.3}", module.name(), ratio);
                danger.push(ModuleReport {
                    module,
                    ratio,
                    band: Band::Danger,
                });
                Ok(())
            }
            Band::Clean => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use takt_types::{Department, DepartmentId, Plant, PlantId, Resource, ResourceId, Warehouse, WarehouseId};

    fn detail_with(plants: usize, resources_per_plant: usize) -> ScenarioDetail {
        let mut detail = ScenarioDetail::new(DateTime::<Utc>::UNIX_EPOCH);
        let mut rid = 0;
        for p in 0..plants {
            let mut plant = Plant::new(PlantId::new(p as u64 + 1), format!("P-{}", p), format!("Plant {}", p));
            let mut dept = Department::new(DepartmentId::new(p as u64 + 1), format!("D-{}", p), "Main");
            for _ in 0..resources_per_plant {
                rid += 1;
                dept.resources.push(Resource::new(ResourceId::new(rid), format!("R-{}", rid), format!("Res {}", rid)));
            }
            plant.departments.push(dept);
            detail.plants.push(plant);
        }
        detail
    }

    #[test]
    fn twelve_elements_sample_every_other_index() {
        assert_eq!(sample_indices(12), vec![0, 2, 4, 6, 8]);
        assert_eq!(sample_indices(3), vec![0, 1, 2]);
        assert_eq!(sample_indices(25), vec![0, 5, 10, 15, 20]);
        assert!(sample_indices(0).is_empty());
    }

    #[test]
    fn boundary_ratios_follow_strict_comparisons() {
        let t = Thresholds::new(0.5, 0.75);
        assert_eq!(t.classify(0.5), Band::Danger);
        assert_eq!(t.classify(0.49), Band::Fail);
        assert_eq!(t.classify(0.6), Band::Danger);
        assert_eq!(t.classify(0.75), Band::Clean);
        assert_eq!(Thresholds::new(0.8, 0.8).classify(0.8), Band::Clean);
    }

    #[test]
    fn unchanged_model_is_clean() {
        let detail = detail_with(3, 4);
        let activation = DataModelActivation::generate(&detail);
        assert_eq!(activation.samples(FingerprintModule::ResourceNames).len(), 5);
        assert_eq!(activation.samples(FingerprintModule::Plants).len(), 3);
        assert_eq!(activation.compare(&detail).unwrap(), FingerprintVerdict::Clean);
    }

    #[test]
    fn key_round_trips() {
        let activation = DataModelActivation::generate(&detail_with(2, 7));
        let key = activation.to_key();
        assert_eq!(DataModelActivation::from_key(&key).unwrap(), activation);
        assert!(DataModelActivation::from_key("not base64!").is_err());

        let mut bytes = activation.to_bytes();
        bytes.push(0);
        assert!(DataModelActivation::from_bytes(&bytes).is_err());
        bytes[0] = 9;
        assert!(DataModelActivation::from_bytes(&bytes).is_err());
    }

    #[test]
    fn plant_count_must_match_exactly() {
        let activation = DataModelActivation::generate(&detail_with(3, 1));
        let mut live = detail_with(3, 1);
        live.plants.push(Plant::new(PlantId::new(99), "P-99", "Extra"));
        assert!(matches!(
            activation.compare(&live),
            Err(LicenseError::PlantCountChanged { expected: 3, found: 4 })
        ));
    }

    #[test]
    fn replaced_resources_fail_the_check() {
        let activation = DataModelActivation::generate(&detail_with(1, 10));
        let mut live = detail_with(1, 10);
        for r in live.plants[0].departments[0].resources.iter_mut() {
            r.name = format!("Other {}", r.id);
        }
        match activation.compare(&live) {
            Err(LicenseError::Divergence { module, ratio, .. }) => {
                assert_eq!(module, "resource-names");
                assert_eq!(ratio, 0.0);
            }
            other => panic!("expected divergence, got {:?}", other),
        }
    }

    fn with_warehouses(count: u64) -> ScenarioDetail {
        let mut detail = detail_with(1, 0);
        for w in 0..count {
            detail.warehouses.push(Warehouse {
                id: WarehouseId::new(w),
                external_id: format!("W-{}", w),
                name: format!("Warehouse {}", w),
            });
        }
        detail
    }

    #[test]
    fn partial_drift_lands_in_the_danger_band() {
        let base = with_warehouses(10);
        let activation = DataModelActivation::generate(&base);
        // Sampled indices are 0,2,4,6,8; rename W-8 in place.
        let mut live = base.clone();
        live.warehouses[8].external_id = "W-8b".into();
        match activation.compare(&live).unwrap() {
            FingerprintVerdict::Danger(reports) => {
                assert_eq!(reports.len(), 1);
                assert_eq!(reports[0].module, FingerprintModule::Warehouses);
                assert_eq!(reports[0].ratio, 0.8);
            }
            FingerprintVerdict::Clean => panic!("expected danger"),
        }
    }

    #[test]
    fn growing_a_category_moves_the_live_sample() {
        let activation = DataModelActivation::generate(&with_warehouses(10));
        // 15 live warehouses sample indices 0,3,6,9,12: only W-0 and W-6 are
        // among the stored W-0,2,4,6,8.
        assert_eq!(sample_indices(15), vec![0, 3, 6, 9, 12]);
        match activation.compare(&with_warehouses(15)) {
            Err(LicenseError::Divergence { module, ratio, threshold }) => {
                assert_eq!(module, "warehouses");
                assert_eq!(ratio, 0.4);
                assert_eq!(threshold, 0.8);
            }
            other => panic!("expected divergence, got {:?}", other),
        }
    }

    #[test]
    fn shrinking_a_category_moves_the_live_sample() {
        let activation = DataModelActivation::generate(&with_warehouses(10));
        // 9 live warehouses sample indices 0..5: W-0, W-2 and W-4 match.
        let mut live = with_warehouses(10);
        live.warehouses.retain(|w| w.external_id != "W-8");
        match activation.compare(&live) {
            Err(LicenseError::Divergence { module, ratio, .. }) => {
                assert_eq!(module, "warehouses");
                assert_eq!(ratio, 0.6);
            }
            other => panic!("expected divergence, got {:?}", other),
        }
    }

    #[test]
    fn empty_live_category_passes() {
        let mut base = detail_with(2, 0);
        base.warehouses.push(Warehouse {
            id: WarehouseId::new(1),
            external_id: "W-1".into(),
            name: "Main".into(),
        });
        let activation = DataModelActivation::generate(&base);
        let mut live = base.clone();
        live.warehouses.clear();
        assert!(activation.compare(&live).unwrap().is_clean());
    }
}
