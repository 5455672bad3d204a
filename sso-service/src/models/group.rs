//! Group model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Active,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub group_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub status: GroupStatus,
}

impl Group {
    pub fn new(tenant_id: Uuid, name: String) -> Self {
        Self {
            group_id: Uuid::new_v4(),
            tenant_id,
            name,
            status: GroupStatus::Active,
        }
    }
}
