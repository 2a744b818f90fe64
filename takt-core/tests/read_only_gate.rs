mod common;

use std::fs;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};

use takt_core::config::LicensePaths;
use takt_core::dispatch::DispatchEvent;
use takt_core::license::{checksum, LicenseManager};
use takt_types::{DispatchOutcome, LicenseStatus, ScenarioId};

struct LicenseFiles {
    _dir: tempfile::TempDir,
    paths: LicensePaths,
    pair: Ed25519KeyPair,
}

impl LicenseFiles {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        let pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();
        let paths = LicensePaths {
            key_path: dir.path().join("license.json"),
            signature_path: dir.path().join("license.sig"),
            public_key: general_purpose::STANDARD.encode(pair.public_key().as_ref()),
        };
        Self { _dir: dir, paths, pair }
    }

    fn write(&self, expires_in_days: i64) {
        let descriptor = serde_json::to_vec(&serde_json::json!({
            "serial_code": "TK-100",
            "expiration": Utc::now() + Duration::days(expires_in_days),
            "maintenance_expiration": Utc::now() + Duration::days(365),
            "packages": [],
            "max_plants": 20,
            "max_users": 20,
        }))
        .unwrap();
        let signature = self.pair.sign(checksum(&descriptor).as_ref());
        fs::write(&self.paths.key_path, &descriptor).unwrap();
        fs::write(&self.paths.signature_path, general_purpose::STANDARD.encode(signature.as_ref())).unwrap();
    }
}

#[test]
fn licensing_failure_blocks_writes_until_a_corrective_reload() {
    let d = common::make_dispatcher();
    common::create_scenario(&d, "Live");
    common::add_plants(&d, ScenarioId::new(1), 1..3);
    let events = d.events().subscribe_channel();

    let manager = LicenseManager::new(Arc::clone(d.state()), Arc::clone(d.context()));
    let files = LicenseFiles::new();
    files.write(-1);
    assert_eq!(manager.reload(&files.paths, d.as_ref()), LicenseStatus::Expired);
    assert!(d.context().is_read_only());
    assert!(events.try_iter().any(|e| matches!(
        e,
        DispatchEvent::SystemStateSwitched { read_only: true, status: LicenseStatus::Expired, .. }
    )));

    // Writes are rejected, reads still work.
    match common::add_user(&d, 1, "ana") {
        DispatchOutcome::Rejected { reason, .. } => assert!(reason.contains("expired")),
        other => panic!("expected rejection, got {:?}", other),
    }
    match common::add_plants(&d, ScenarioId::new(1), 5..6) {
        DispatchOutcome::Rejected { .. } => {}
        other => panic!("expected rejection, got {:?}", other),
    }
    let plants = d
        .state()
        .read_scenario_detail(d.context(), ScenarioId::new(1), |detail| detail.plant_count())
        .unwrap();
    assert_eq!(plants, 2);
    assert!(d.state().read_users(d.context()).unwrap().is_empty());

    files.write(30);
    assert_eq!(manager.reload(&files.paths, d.as_ref()), LicenseStatus::Valid);
    assert!(!d.context().is_read_only());
    assert!(common::add_user(&d, 1, "ana").is_applied());
}

#[test]
fn bad_signature_is_an_invalid_key() {
    let d = common::make_dispatcher();
    let manager = LicenseManager::new(Arc::clone(d.state()), Arc::clone(d.context()));
    let files = LicenseFiles::new();
    files.write(30);
    fs::write(&files.paths.signature_path, general_purpose::STANDARD.encode([7u8; 64])).unwrap();

    assert_eq!(manager.reload(&files.paths, d.as_ref()), LicenseStatus::InvalidKey);
    assert!(d.context().is_read_only());
    assert_eq!(d.context().license_status(), LicenseStatus::InvalidKey);
}
