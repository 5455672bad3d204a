//! Tenant model - the top-level isolation boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Disabled,
}

/// Tenant entity. Owns users, groups and registered clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub tenant_id: Uuid,
    pub name: String,
    pub domain: Option<String>,
    pub status: TenantStatus,
    /// Opaque per-tenant settings blob, owned by the admin application.
    pub settings: serde_json::Value,
    pub created_utc: DateTime<Utc>,
}

impl Tenant {
    pub fn new(name: String, domain: Option<String>) -> Self {
        Self {
            tenant_id: Uuid::new_v4(),
            name,
            domain,
            status: TenantStatus::Active,
            settings: serde_json::Value::Null,
            created_utc: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}
