use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UserPermission {
    #[default]
    Viewer,
    Planner,
    Administrator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub permission: UserPermission,
    pub active: bool,
    /// Server-only
    pub password_hash: String,
    /// Server-only
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(id: UserId, name: impl Into<String>, permission: UserPermission) -> Self {
        Self {
            id,
            name: name.into(),
            permission,
            active: true,
            password_hash: String::new(),
            last_login: None,
        }
    }
}
