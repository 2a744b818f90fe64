use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::sync::RetryPolicy;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    locks: LockConfig,
    #[serde(default)]
    license: LicenseConfig,
    #[serde(default)]
    recording: RecordingConfig,
    #[serde(default)]
    persistence: PersistenceConfig,
}

#[derive(Deserialize, Default)]
struct ServerConfig {
    is_server: Option<bool>,
    state_path: Option<PathBuf>,
}

#[derive(Deserialize, Default)]
struct LockConfig {
    initial_timeout_ms: Option<u64>,
    growth: Option<f64>,
    ceiling_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
struct LicenseConfig {
    key_path: Option<PathBuf>,
    signature_path: Option<PathBuf>,
    public_key: Option<String>,
    recheck_interval_minutes: Option<u64>,
}

#[derive(Deserialize, Default)]
struct RecordingConfig {
    enabled: Option<bool>,
    path: Option<PathBuf>,
}

#[derive(Deserialize, Default)]
struct PersistenceConfig {
    autosave: Option<bool>,
    autosave_interval_minutes: Option<u64>,
}

pub struct Config {
    server: ServerConfig,
    locks: LockConfig,
    license: LicenseConfig,
    recording: RecordingConfig,
    persistence: PersistenceConfig,
}

/// Paths needed to load and verify a license key.
#[derive(Debug, Clone, PartialEq)]
pub struct LicensePaths {
    pub key_path: PathBuf,
    pub signature_path: PathBuf,
    pub public_key: String,
}

impl Config {
    /// Embedded defaults merged with the user's config file, if any.
    pub fn load() -> Self {
        let mut base = embedded();

        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => merge(&mut base, user),
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        Self::from_file(base)
    }

    /// Embedded defaults merged with `overrides`.
    pub fn from_toml_str(overrides: &str) -> Result<Self, toml::de::Error> {
        let mut base = embedded();
        merge(&mut base, toml::from_str(overrides)?);
        Ok(Self::from_file(base))
    }

    fn from_file(file: ConfigFile) -> Self {
        Config {
            server: file.server,
            locks: file.locks,
            license: file.license,
            recording: file.recording,
            persistence: file.persistence,
        }
    }

    pub fn is_server(&self) -> bool {
        self.server.is_server.unwrap_or(true)
    }

    pub fn state_path(&self) -> PathBuf {
        self.server
            .state_path
            .clone()
            .unwrap_or_else(default_state_path)
    }

    /// Lock retry timings. Growth is at least 1.0 and the ceiling is never
    /// below the initial timeout.
    pub fn retry_policy(&self) -> RetryPolicy {
        let initial = self.locks.initial_timeout_ms.unwrap_or(100).max(1);
        let ceiling = self.locks.ceiling_ms.unwrap_or(2250).max(initial);
        RetryPolicy::new(
            Duration::from_millis(initial),
            self.locks.growth.unwrap_or(1.06),
            Duration::from_millis(ceiling),
        )
    }

    /// `None` unless key, signature and public key are all configured.
    pub fn license_paths(&self) -> Option<LicensePaths> {
        Some(LicensePaths {
            key_path: self.license.key_path.clone()?,
            signature_path: self.license.signature_path.clone()?,
            public_key: self.license.public_key.clone()?,
        })
    }

    /// Data-model recheck interval (clamped to 1..=1440 minutes).
    pub fn license_recheck_interval(&self) -> Duration {
        let minutes = self
            .license
            .recheck_interval_minutes
            .unwrap_or(30)
            .clamp(1, 1440);
        Duration::from_secs(minutes * 60)
    }

    pub fn recording_enabled(&self) -> bool {
        self.recording.enabled.unwrap_or(true)
    }

    pub fn recording_path(&self) -> PathBuf {
        self.recording
            .path
            .clone()
            .unwrap_or_else(|| data_dir().join("transmissions.jsonl"))
    }

    pub fn autosave_enabled(&self) -> bool {
        self.persistence.autosave.unwrap_or(true)
    }

    /// Autosave interval (clamped to 1..10080 minutes).
    pub fn autosave_interval(&self) -> Duration {
        let minutes = self
            .persistence
            .autosave_interval_minutes
            .unwrap_or(5)
            .clamp(1, 10_080);
        Duration::from_secs(minutes * 60)
    }
}

fn embedded() -> ConfigFile {
    match toml::from_str(DEFAULT_CONFIG) {
        Ok(file) => file,
        Err(e) => {
            log::error!(target: "config", "embedded config.toml is malformed: {}", e);
            ConfigFile::default()
        }
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("takt").join("config.toml"))
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("takt"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Default location of the persisted state file.
pub fn default_state_path() -> PathBuf {
    data_dir().join("state.takt")
}

fn merge(base: &mut ConfigFile, user: ConfigFile) {
    if user.server.is_server.is_some() {
        base.server.is_server = user.server.is_server;
    }
    if user.server.state_path.is_some() {
        base.server.state_path = user.server.state_path;
    }
    if user.locks.initial_timeout_ms.is_some() {
        base.locks.initial_timeout_ms = user.locks.initial_timeout_ms;
    }
    if user.locks.growth.is_some() {
        base.locks.growth = user.locks.growth;
    }
    if user.locks.ceiling_ms.is_some() {
        base.locks.ceiling_ms = user.locks.ceiling_ms;
    }
    if user.license.key_path.is_some() {
        base.license.key_path = user.license.key_path;
    }
    if user.license.signature_path.is_some() {
        base.license.signature_path = user.license.signature_path;
    }
    if user.license.public_key.is_some() {
        base.license.public_key = user.license.public_key;
    }
    if user.license.recheck_interval_minutes.is_some() {
        base.license.recheck_interval_minutes = user.license.recheck_interval_minutes;
    }
    if user.recording.enabled.is_some() {
        base.recording.enabled = user.recording.enabled;
    }
    if user.recording.path.is_some() {
        base.recording.path = user.recording.path;
    }
    if user.persistence.autosave.is_some() {
        base.persistence.autosave = user.persistence.autosave;
    }
    if user.persistence.autosave_interval_minutes.is_some() {
        base.persistence.autosave_interval_minutes = user.persistence.autosave_interval_minutes;
    }
}
