//! In-memory store backed by DashMap.
//!
//! Serves as the reference implementation of the store contracts. The
//! embedding admin application provisions directory rows through the seed
//! methods; protocol code only ever sees the traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::{Artifact, Client, Credential, CredentialKind, Group, Session, Tenant, User};
use crate::store::{ClaimOutcome, DirectoryStore, StoreError, TicketStore};

#[derive(Default)]
pub struct MemoryStore {
    tenants: DashMap<Uuid, Tenant>,
    users: DashMap<Uuid, User>,
    groups: DashMap<Uuid, Group>,
    /// user_id -> group ids
    memberships: DashMap<Uuid, Vec<Uuid>>,
    clients: DashMap<String, Client>,
    artifacts: DashMap<String, Artifact>,
    credentials: DashMap<String, Credential>,
    sessions: DashMap<String, Session>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Seed methods used by the embedding application and tests.

    pub fn add_tenant(&self, tenant: Tenant) {
        self.tenants.insert(tenant.tenant_id, tenant);
    }

    pub fn add_user(&self, user: User) {
        self.users.insert(user.user_id, user);
    }

    pub fn add_group(&self, group: Group) {
        self.groups.insert(group.group_id, group);
    }

    pub fn add_membership(&self, user_id: Uuid, group_id: Uuid) {
        self.memberships.entry(user_id).or_default().push(group_id);
    }

    pub fn add_client(&self, client: Client) {
        self.clients.insert(client.client_id.clone(), client);
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn find_tenant_by_name(&self, name: &str) -> Result<Option<Tenant>, StoreError> {
        Ok(self
            .tenants
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .map(|t| t.clone()))
    }

    async fn find_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, StoreError> {
        Ok(self.tenants.get(&tenant_id).map(|t| t.clone()))
    }

    async fn find_user(
        &self,
        tenant_id: Uuid,
        username: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.tenant_id == tenant_id && u.username == username)
            .map(|u| u.clone()))
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn find_user_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .iter()
            .find(|u| {
                u.tenant_id == tenant_id
                    && u.email
                        .as_deref()
                        .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .map(|u| u.clone()))
    }

    async fn list_users(&self, tenant_id: Uuid) -> Result<Vec<User>, StoreError> {
        Ok(self
            .users
            .iter()
            .filter(|u| u.tenant_id == tenant_id)
            .map(|u| u.clone())
            .collect())
    }

    async fn groups_for_user(&self, user_id: Uuid) -> Result<Vec<Group>, StoreError> {
        let ids = self
            .memberships
            .get(&user_id)
            .map(|m| m.clone())
            .unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| self.groups.get(id).map(|g| g.clone()))
            .collect())
    }

    async fn touch_last_login(&self, user_id: Uuid) -> Result<(), StoreError> {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.last_login_utc = Some(Utc::now());
        }
        Ok(())
    }

    async fn find_client(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        Ok(self.clients.get(client_id).map(|c| c.clone()))
    }

    async fn find_client_by_origin(&self, origin: &str) -> Result<Option<Client>, StoreError> {
        Ok(self
            .clients
            .iter()
            .find(|c| {
                c.root_url
                    .as_deref()
                    .and_then(crate::services::tickets::url_origin)
                    .is_some_and(|o| o == origin)
            })
            .map(|c| c.clone()))
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn insert_artifact(&self, artifact: Artifact) -> Result<(), StoreError> {
        self.artifacts.insert(artifact.token.clone(), artifact);
        Ok(())
    }

    async fn claim_artifact(&self, token: &str) -> Result<ClaimOutcome, StoreError> {
        // get_mut holds the shard entry lock, so the flip is atomic: one
        // claimer sees used == false, everyone else sees AlreadyUsed.
        match self.artifacts.get_mut(token) {
            Some(mut artifact) if !artifact.used => {
                artifact.used = true;
                Ok(ClaimOutcome::Claimed(artifact.clone()))
            }
            Some(artifact) => Ok(ClaimOutcome::AlreadyUsed(artifact.clone())),
            None => Ok(ClaimOutcome::NotFound),
        }
    }

    async fn get_artifact(&self, token: &str) -> Result<Option<Artifact>, StoreError> {
        Ok(self.artifacts.get(token).map(|a| a.clone()))
    }

    async fn artifacts_for_session(
        &self,
        session_token: &str,
    ) -> Result<Vec<Artifact>, StoreError> {
        Ok(self
            .artifacts
            .iter()
            .filter(|a| a.session_token.as_deref() == Some(session_token))
            .map(|a| a.clone())
            .collect())
    }

    async fn insert_credential(&self, credential: Credential) -> Result<(), StoreError> {
        self.credentials.insert(credential.token.clone(), credential);
        Ok(())
    }

    async fn get_credential(&self, token: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.credentials.get(token).map(|c| c.clone()))
    }

    async fn revoke_credential(&self, token: &str) -> Result<Option<Credential>, StoreError> {
        match self.credentials.get_mut(token) {
            Some(mut credential) => {
                let before = credential.clone();
                credential.revoked = true;
                Ok(Some(before))
            }
            None => Ok(None),
        }
    }

    async fn delete_credential(&self, token: &str) -> Result<(), StoreError> {
        self.credentials.remove(token);
        Ok(())
    }

    async fn find_refresh_by_access(
        &self,
        access_token: &str,
    ) -> Result<Option<Credential>, StoreError> {
        Ok(self
            .credentials
            .iter()
            .find(|c| {
                c.kind == CredentialKind::Refresh
                    && c.access_token.as_deref() == Some(access_token)
            })
            .map(|c| c.clone()))
    }

    async fn revoke_user_client_credentials(
        &self,
        user_id: Uuid,
        client_id: &str,
    ) -> Result<u64, StoreError> {
        let mut revoked = 0u64;
        for mut entry in self.credentials.iter_mut() {
            if entry.user_id == Some(user_id) && entry.client_id == client_id && !entry.revoked {
                entry.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn insert_session(&self, session: Session) -> Result<(), StoreError> {
        self.sessions.insert(session.token.clone(), session);
        Ok(())
    }

    async fn get_session(&self, token: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.get(token).map(|s| s.clone()))
    }

    async fn revoke_session(&self, token: &str) -> Result<Option<Session>, StoreError> {
        match self.sessions.get_mut(token) {
            Some(mut session) => {
                let before = session.clone();
                session.revoked = true;
                Ok(Some(before))
            }
            None => Ok(None),
        }
    }

    async fn purge_expired_artifacts(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.artifacts.len();
        self.artifacts.retain(|_, a| a.expires_utc >= now);
        Ok((before - self.artifacts.len()) as u64)
    }

    async fn purge_expired_credentials(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.credentials.len();
        self.credentials.retain(|_, c| c.expires_utc >= now);
        Ok((before - self.credentials.len()) as u64)
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.expires_utc >= now);
        Ok((before - self.sessions.len()) as u64)
    }
}
