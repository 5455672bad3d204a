//! Relying-party registration, shared by the OIDC and CAS protocol servers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Active,
    Disabled,
}

/// Registered client (relying party).
///
/// OIDC flows match `redirect_uris` exactly; CAS flows match `root_url` by
/// scheme+host only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    /// Argon2 hash of the client secret.
    pub client_secret_hash: String,
    pub tenant_id: Uuid,
    pub redirect_uris: Vec<String>,
    pub post_logout_redirect_uris: Vec<String>,
    /// CAS service base; only its scheme+host participate in matching.
    pub root_url: Option<String>,
    pub allowed_scopes: Vec<String>,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub status: ClientStatus,
    pub created_utc: DateTime<Utc>,
}

impl Client {
    pub fn new(client_id: String, client_secret_hash: String, tenant_id: Uuid) -> Self {
        Self {
            client_id,
            client_secret_hash,
            tenant_id,
            redirect_uris: Vec::new(),
            post_logout_redirect_uris: Vec::new(),
            root_url: None,
            allowed_scopes: Vec::new(),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 86400 * 7,
            status: ClientStatus::Active,
            created_utc: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ClientStatus::Active
    }

    pub fn allows_redirect(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == redirect_uri)
    }

    pub fn allows_post_logout_redirect(&self, uri: &str) -> bool {
        self.post_logout_redirect_uris.iter().any(|u| u == uri)
    }

    /// Requested scopes narrowed to what the registration allows.
    pub fn grantable_scopes(&self, requested: &[String]) -> Vec<String> {
        requested
            .iter()
            .filter(|s| self.allowed_scopes.iter().any(|a| a == *s))
            .cloned()
            .collect()
    }
}
