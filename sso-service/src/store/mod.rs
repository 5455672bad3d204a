//! Credential-store contracts.
//!
//! The backing store is an external collaborator; the identity provider
//! consumes these two contracts only. [`memory::MemoryStore`] is the
//! in-process reference implementation used by default wiring and tests.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Artifact, Client, Credential, Group, Session, Tenant, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a conditional artifact claim.
#[derive(Debug)]
pub enum ClaimOutcome {
    /// This caller flipped `used` false -> true.
    Claimed(Artifact),
    /// The artifact exists but was already consumed.
    AlreadyUsed(Artifact),
    NotFound,
}

/// Identity facts: tenants, users, groups and client registrations.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Tenant lookup by name is case-insensitive.
    async fn find_tenant_by_name(&self, name: &str) -> Result<Option<Tenant>, StoreError>;
    async fn find_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, StoreError>;

    async fn find_user(&self, tenant_id: Uuid, username: &str)
        -> Result<Option<User>, StoreError>;
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<User>, StoreError>;
    async fn list_users(&self, tenant_id: Uuid) -> Result<Vec<User>, StoreError>;
    async fn groups_for_user(&self, user_id: Uuid) -> Result<Vec<Group>, StoreError>;
    async fn touch_last_login(&self, user_id: Uuid) -> Result<(), StoreError>;

    async fn find_client(&self, client_id: &str) -> Result<Option<Client>, StoreError>;
    /// Client whose root_url matches the given scheme+host origin.
    async fn find_client_by_origin(&self, origin: &str) -> Result<Option<Client>, StoreError>;
}

/// Issuance-engine persistence: artifacts, credentials and sessions.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn insert_artifact(&self, artifact: Artifact) -> Result<(), StoreError>;
    /// Conditionally flip `used` false -> true. Under concurrent claims of
    /// one token exactly one caller observes `Claimed`.
    async fn claim_artifact(&self, token: &str) -> Result<ClaimOutcome, StoreError>;
    async fn get_artifact(&self, token: &str) -> Result<Option<Artifact>, StoreError>;
    /// Artifacts minted under a session, for single-logout notification.
    async fn artifacts_for_session(&self, session_token: &str)
        -> Result<Vec<Artifact>, StoreError>;

    async fn insert_credential(&self, credential: Credential) -> Result<(), StoreError>;
    async fn get_credential(&self, token: &str) -> Result<Option<Credential>, StoreError>;
    /// Returns the credential as it was before revocation, if present.
    async fn revoke_credential(&self, token: &str) -> Result<Option<Credential>, StoreError>;
    async fn delete_credential(&self, token: &str) -> Result<(), StoreError>;
    async fn find_refresh_by_access(
        &self,
        access_token: &str,
    ) -> Result<Option<Credential>, StoreError>;
    /// Revoke every credential bound to (user, client). Returns the count.
    async fn revoke_user_client_credentials(
        &self,
        user_id: Uuid,
        client_id: &str,
    ) -> Result<u64, StoreError>;

    async fn insert_session(&self, session: Session) -> Result<(), StoreError>;
    async fn get_session(&self, token: &str) -> Result<Option<Session>, StoreError>;
    async fn revoke_session(&self, token: &str) -> Result<Option<Session>, StoreError>;

    async fn purge_expired_artifacts(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
    async fn purge_expired_credentials(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
