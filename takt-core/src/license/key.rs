//! Signed license key descriptor.
//!
//! The key is a JSON file; its signature file holds the base64 of an Ed25519
//! signature over the SHA-256 checksum of the key file's exact bytes.

use std::fs;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use ring::digest;
use ring::signature::{UnparsedPublicKey, ED25519};
use serde::{Deserialize, Serialize};

use crate::config::LicensePaths;
use crate::error::LicenseError;

const ACTIVATION_TOKEN: &str = "dmakey|";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseKey {
    pub serial_code: String,
    pub expiration: DateTime<Utc>,
    pub maintenance_expiration: DateTime<Utc>,
    #[serde(default)]
    pub packages: Vec<String>,
    pub max_plants: u32,
    pub max_users: u32,
    /// Free text shown to operators. May carry an offline activation token.
    #[serde(default)]
    pub public_notes: String,
}

impl LicenseKey {
    pub fn parse(descriptor: &[u8]) -> Result<Self, LicenseError> {
        serde_json::from_slice(descriptor).map_err(|e| LicenseError::Parse(e.to_string()))
    }

    pub fn has_package(&self, name: &str) -> bool {
        self.packages.iter().any(|p| p.eq_ignore_ascii_case(name))
    }

    /// The base64 fingerprint from a `dmakey|<base64>|` token in the notes.
    pub fn activation_token(&self) -> Option<&str> {
        let start = self.public_notes.find(ACTIVATION_TOKEN)? + ACTIVATION_TOKEN.len();
        let (token, _) = self.public_notes[start..].split_once('|')?;
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    }
}

pub fn checksum(descriptor: &[u8]) -> digest::Digest {
    digest::digest(&digest::SHA256, descriptor)
}

/// Verify `signature_b64` over the checksum of `descriptor`.
pub fn verify_signature(
    descriptor: &[u8],
    signature_b64: &str,
    public_key_b64: &str,
) -> Result<(), LicenseError> {
    let public_key = general_purpose::STANDARD
        .decode(public_key_b64.trim())
        .map_err(|e| LicenseError::Parse(format!("public key: {}", e)))?;
    let signature = general_purpose::STANDARD
        .decode(signature_b64.trim())
        .map_err(|e| LicenseError::Parse(format!("signature: {}", e)))?;

    UnparsedPublicKey::new(&ED25519, &public_key)
        .verify(checksum(descriptor).as_ref(), &signature)
        .map_err(|_| LicenseError::SignatureMismatch)
}

/// Read the key and signature files and verify them. Any failure is fatal
/// to the load.
pub fn load_license(paths: &LicensePaths) -> Result<LicenseKey, LicenseError> {
    let descriptor = fs::read(&paths.key_path)?;
    let signature = fs::read_to_string(&paths.signature_path)?;
    verify_signature(&descriptor, &signature, &paths.public_key)?;
    let key = LicenseKey::parse(&descriptor)?;
    log::info!(
        target: "license",
        "loaded license {} (expires {}, maintenance until {})",
        key.serial_code,
        key.expiration.format("%Y-%m-%d"),
        key.maintenance_expiration.format("%Y-%m-%d")
    );
    Ok(key)
}
