use serde::{Deserialize, Serialize};

/// Current licensing state of the process.
///
/// Every status other than `Valid` forces read-only mode. The numeric codes
/// are reported to operators and must stay distinct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LicenseStatus {
    #[default]
    Valid,
    Expired,
    MaintenanceExpired,
    PlantsExceeded,
    InvalidKey,
    DataModelDivergence,
    UsersExceeded,
}

impl LicenseStatus {
    pub fn code(self) -> u16 {
        match self {
            LicenseStatus::Valid => 0,
            LicenseStatus::Expired => 1,
            LicenseStatus::MaintenanceExpired => 2,
            LicenseStatus::PlantsExceeded => 3,
            LicenseStatus::InvalidKey => 4,
            LicenseStatus::DataModelDivergence => 5,
            LicenseStatus::UsersExceeded => 6,
        }
    }

    /// Whether this status allows writes.
    pub fn permits_writes(self) -> bool {
        matches!(self, LicenseStatus::Valid)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LicenseStatus::Valid => "valid",
            LicenseStatus::Expired => "expired",
            LicenseStatus::MaintenanceExpired => "maintenance-expired",
            LicenseStatus::PlantsExceeded => "plants-exceeded",
            LicenseStatus::InvalidKey => "invalid-key",
            LicenseStatus::DataModelDivergence => "data-model-divergence",
            LicenseStatus::UsersExceeded => "users-exceeded",
        }
    }
}

impl std::fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn status_codes_are_distinct() {
        let all = [
            LicenseStatus::Valid,
            LicenseStatus::Expired,
            LicenseStatus::MaintenanceExpired,
            LicenseStatus::PlantsExceeded,
            LicenseStatus::InvalidKey,
            LicenseStatus::DataModelDivergence,
            LicenseStatus::UsersExceeded,
        ];
        let codes: HashSet<u16> = all.iter().map(|s| s.code()).collect();
        assert_eq!(codes.len(), all.len());
        assert!(all.iter().filter(|s| s.permits_writes()).count() == 1);
    }
}
