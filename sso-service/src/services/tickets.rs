//! Ticket/token issuance engine.
//!
//! Uniform lifecycle for the single-use and long-lived artifacts both SSO
//! protocols are built on: kind-prefixed random tokens, atomic single-use
//! consumption, non-consuming credential validation and the revocation
//! cascade across refresh/access pairs.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use rand::RngCore;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

use crate::models::{Artifact, ArtifactKind, Credential, CredentialKind, Session};
use crate::services::ServiceError;
use crate::store::{ClaimOutcome, TicketStore};

/// Entropy per token, before encoding.
const TOKEN_BYTES: usize = 32;

/// How the presented audience is compared with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudienceMatch {
    /// Exact string equality (OIDC redirect_uri).
    Exact,
    /// Scheme+host equality only (CAS service URLs).
    Origin,
}

/// Options carried by an artifact beyond the identity binding.
#[derive(Debug, Default, Clone)]
pub struct ArtifactExtras {
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub session_token: Option<String>,
    pub proxies: Vec<String>,
}

#[derive(Clone)]
pub struct TicketService {
    store: Arc<dyn TicketStore>,
}

impl TicketService {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TicketStore> {
        &self.store
    }

    /// Mint a single-use artifact with the kind's wire prefix.
    pub async fn issue_artifact(
        &self,
        kind: ArtifactKind,
        client_id: &str,
        user_id: Uuid,
        audience: &str,
        scopes: Vec<String>,
        ttl_secs: i64,
        extras: ArtifactExtras,
    ) -> Result<Artifact, ServiceError> {
        let now = Utc::now();
        let artifact = Artifact {
            token: random_token(kind.prefix()),
            kind,
            client_id: client_id.to_string(),
            user_id,
            audience: audience.to_string(),
            scopes,
            state: extras.state,
            nonce: extras.nonce,
            code_challenge: extras.code_challenge,
            code_challenge_method: extras.code_challenge_method,
            session_token: extras.session_token,
            proxies: extras.proxies,
            expires_utc: now + Duration::seconds(ttl_secs),
            used: false,
            created_utc: now,
        };
        self.store.insert_artifact(artifact.clone()).await?;
        Ok(artifact)
    }

    /// Consume an artifact exactly once.
    ///
    /// The store performs the conditional used flip; expiry is checked
    /// before replay so an expired ticket always reports as expired, and a
    /// mismatched audience still burns the ticket.
    pub async fn consume_artifact(
        &self,
        token: &str,
        expected_audience: &str,
        matching: AudienceMatch,
    ) -> Result<Artifact, ServiceError> {
        let (artifact, already_used) = match self.store.claim_artifact(token).await? {
            ClaimOutcome::Claimed(a) => (a, false),
            ClaimOutcome::AlreadyUsed(a) => (a, true),
            ClaimOutcome::NotFound => return Err(ServiceError::ArtifactReplayed),
        };

        if artifact.expires_utc < Utc::now() {
            return Err(ServiceError::ArtifactExpired);
        }
        if already_used {
            return Err(ServiceError::ArtifactReplayed);
        }
        if !audience_matches(&artifact.audience, expected_audience, matching) {
            return Err(ServiceError::AudienceMismatch);
        }
        Ok(artifact)
    }

    /// Mint a long-lived credential.
    #[allow(clippy::too_many_arguments)]
    pub async fn issue_credential(
        &self,
        kind: CredentialKind,
        client_id: &str,
        user_id: Option<Uuid>,
        scopes: Vec<String>,
        ttl_secs: i64,
        access_token: Option<String>,
        callback_url: Option<String>,
        proxies: Vec<String>,
        session_token: Option<String>,
    ) -> Result<Credential, ServiceError> {
        let now = Utc::now();
        let credential = Credential {
            token: random_token(kind.prefix()),
            kind,
            client_id: client_id.to_string(),
            user_id,
            scopes,
            access_token,
            callback_url,
            proxies,
            session_token,
            expires_utc: now + Duration::seconds(ttl_secs),
            revoked: false,
            created_utc: now,
        };
        self.store.insert_credential(credential.clone()).await?;
        Ok(credential)
    }

    /// Non-consuming liveness check: revocation and expiry only.
    pub async fn validate_credential(&self, token: &str) -> Result<Credential, ServiceError> {
        let credential = self
            .store
            .get_credential(token)
            .await?
            .ok_or(ServiceError::CredentialInvalid)?;
        if credential.revoked || credential.expires_utc < Utc::now() {
            return Err(ServiceError::CredentialInvalid);
        }
        Ok(credential)
    }

    /// Revoke a credential and cascade to its refresh/access pair.
    ///
    /// Unknown tokens are a no-op; revocation endpoints never confirm
    /// existence.
    pub async fn revoke_chain(&self, token: &str) -> Result<(), ServiceError> {
        let Some(credential) = self.store.revoke_credential(token).await? else {
            return Ok(());
        };
        match credential.kind {
            CredentialKind::Refresh => {
                if let Some(access) = credential.access_token.as_deref() {
                    self.store.revoke_credential(access).await?;
                }
            }
            CredentialKind::Access => {
                if let Some(refresh) = self.store.find_refresh_by_access(token).await? {
                    self.store.revoke_credential(&refresh.token).await?;
                }
            }
            CredentialKind::ProxyGranting => {}
        }
        Ok(())
    }

    /// Mint a server-side session (CAS TGT).
    pub async fn issue_session(
        &self,
        user_id: Uuid,
        client_id: Option<String>,
        ttl_secs: i64,
    ) -> Result<Session, ServiceError> {
        let now = Utc::now();
        let session = Session {
            token: random_token("TGT-"),
            user_id,
            client_id,
            expires_utc: now + Duration::seconds(ttl_secs),
            revoked: false,
            created_utc: now,
        };
        self.store.insert_session(session.clone()).await?;
        Ok(session)
    }

    pub async fn validate_session(&self, token: &str) -> Result<Session, ServiceError> {
        let session = self
            .store
            .get_session(token)
            .await?
            .ok_or(ServiceError::CredentialInvalid)?;
        if session.revoked || session.expires_utc < Utc::now() {
            return Err(ServiceError::CredentialInvalid);
        }
        Ok(session)
    }

    pub async fn revoke_session(&self, token: &str) -> Result<Option<Session>, ServiceError> {
        Ok(self.store.revoke_session(token).await?)
    }
}

/// Kind-prefixed opaque token: 32 random bytes, base64url.
pub fn random_token(prefix: &str) -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("{}{}", prefix, URL_SAFE_NO_PAD.encode(bytes))
}

/// scheme://host[:port] of a URL, lowercased. None for unparseable input.
pub fn url_origin(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let origin = match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    };
    Some(origin)
}

fn audience_matches(stored: &str, presented: &str, matching: AudienceMatch) -> bool {
    match matching {
        AudienceMatch::Exact => stored == presented,
        AudienceMatch::Origin => match (url_origin(stored), url_origin(presented)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}
