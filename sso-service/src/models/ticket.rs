//! Issuance-engine entities: single-use artifacts, long-lived credentials
//! and server-side sessions.
//!
//! Ticket kinds are explicit enums; the wire prefix (`ST-`, `PT-`, `PGT-`,
//! `TGT-`) is derived from the kind rather than overloaded onto scopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Single-use artifact kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// OAuth2/OIDC authorization code (unprefixed token).
    OidcCode,
    /// CAS service ticket.
    ServiceTicket,
    /// CAS proxy ticket.
    ProxyTicket,
}

impl ArtifactKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ArtifactKind::OidcCode => "",
            ArtifactKind::ServiceTicket => "ST-",
            ArtifactKind::ProxyTicket => "PT-",
        }
    }
}

/// Single-use ticket: consumed exactly once, then dead.
///
/// Backs OIDC authorization codes and CAS ST/PT tickets. `used` transitions
/// false to true exactly once; the store enforces this with a conditional
/// write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub token: String,
    pub kind: ArtifactKind,
    pub client_id: String,
    pub user_id: Uuid,
    /// Exact redirect_uri for OIDC codes; full service URL for CAS tickets
    /// (matched by scheme+host).
    pub audience: String,
    pub scopes: Vec<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    /// TGT this ticket was minted under (CAS; used for single logout).
    pub session_token: Option<String>,
    /// Proxy callback chain, outermost first (CAS PT only).
    pub proxies: Vec<String>,
    pub expires_utc: DateTime<Utc>,
    pub used: bool,
    pub created_utc: DateTime<Utc>,
}

/// Long-lived credential kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// OAuth2 access token (opaque).
    Access,
    /// OAuth2 refresh token, paired with an access token.
    Refresh,
    /// CAS proxy-granting ticket.
    ProxyGranting,
}

impl CredentialKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            CredentialKind::Access => "",
            CredentialKind::Refresh => "",
            CredentialKind::ProxyGranting => "PGT-",
        }
    }
}

/// Long-lived token: valid until expiry or revocation.
///
/// Backs OIDC access/refresh tokens and CAS PGTs. Revoking a refresh token
/// cascades to its paired access token and vice versa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub kind: CredentialKind,
    pub client_id: String,
    /// None for client_credentials grants.
    pub user_id: Option<Uuid>,
    pub scopes: Vec<String>,
    /// Paired access token (refresh tokens only).
    pub access_token: Option<String>,
    /// Proxy callback URL this PGT was disclosed to (PGT only).
    pub callback_url: Option<String>,
    /// Callback chain accumulated across proxy hops (PGT only).
    pub proxies: Vec<String>,
    /// TGT the credential descends from (CAS; revoked with the session).
    pub session_token: Option<String>,
    pub expires_utc: DateTime<Utc>,
    pub revoked: bool,
    pub created_utc: DateTime<Utc>,
}

/// Server-side session row. Backs CAS ticket-granting tickets; the web
/// login cookie is stateless and has no row here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub client_id: Option<String>,
    pub expires_utc: DateTime<Utc>,
    pub revoked: bool,
    pub created_utc: DateTime<Utc>,
}
