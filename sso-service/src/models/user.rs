//! User model - tenant-scoped accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Suspended,
    Deactivated,
}

/// User entity (tenant-scoped). The password hash is argon2id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub status: UserStatus,
    pub last_login_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl User {
    pub fn new(tenant_id: Uuid, username: String, password_hash: String) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            tenant_id,
            username,
            password_hash,
            email: None,
            display_name: None,
            phone: None,
            status: UserStatus::Active,
            last_login_utc: None,
            created_utc: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    /// Display name falling back to the login name.
    pub fn preferred_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}
