use service_core::error::AppError;
use thiserror::Error;

use crate::store::StoreError;

/// Service-level error taxonomy.
///
/// Handlers translate these into protocol-specific shapes (RFC6749 JSON for
/// OIDC, XML/plain-text codes for CAS, result codes for LDAP); internal
/// detail is logged, never surfaced.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown or disabled client")]
    UnknownClient,

    #[error("redirect_uri not registered for client")]
    RedirectMismatch,

    #[error("service not registered")]
    ServiceMismatch,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account disabled")]
    AccountDisabled,

    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("artifact expired")]
    ArtifactExpired,

    #[error("artifact replayed")]
    ArtifactReplayed,

    #[error("audience mismatch")]
    AudienceMismatch,

    #[error("token revoked or expired")]
    CredentialInvalid,

    #[error("crypto failure: {0}")]
    Crypto(String),

    #[error("callback failed: {0}")]
    Callback(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// True for the artifact lifecycle failures (expired / replayed /
    /// audience mismatch) that CAS maps onto ticket-validation codes.
    pub fn is_artifact_error(&self) -> bool {
        matches!(
            self,
            ServiceError::ArtifactExpired
                | ServiceError::ArtifactReplayed
                | ServiceError::AudienceMismatch
        )
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidRequest(m) => AppError::BadRequest(anyhow::anyhow!(m)),
            ServiceError::UnknownClient => {
                AppError::BadRequest(anyhow::anyhow!("Unknown client"))
            }
            ServiceError::RedirectMismatch => {
                AppError::BadRequest(anyhow::anyhow!("redirect_uri not registered"))
            }
            ServiceError::ServiceMismatch => {
                AppError::BadRequest(anyhow::anyhow!("Service not registered"))
            }
            ServiceError::InvalidCredentials
            | ServiceError::AccountDisabled
            | ServiceError::TenantMismatch => {
                AppError::AuthError(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::ArtifactExpired
            | ServiceError::ArtifactReplayed
            | ServiceError::AudienceMismatch
            | ServiceError::CredentialInvalid => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid token"))
            }
            ServiceError::Crypto(m) => {
                tracing::error!(error = %m, "Crypto failure");
                AppError::InternalError(anyhow::anyhow!("Internal server error"))
            }
            ServiceError::Callback(m) => {
                tracing::warn!(error = %m, "Outbound callback failed");
                AppError::InternalError(anyhow::anyhow!("Upstream callback failed"))
            }
            ServiceError::Store(e) => {
                tracing::error!(error = %e, "Store failure");
                AppError::ServiceUnavailable
            }
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
