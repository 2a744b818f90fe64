use serde::{Deserialize, Serialize};

/// Process-wide settings changed through system-setting transmissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSettings {
    pub instance_name: String,
    /// Idle client sessions are dropped after this many minutes
    pub session_timeout_minutes: u32,
    pub recording_enabled: bool,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            instance_name: "takt".to_string(),
            session_timeout_minutes: 60,
            recording_enabled: true,
        }
    }
}
