//! Token endpoint: authorization_code, client_credentials and
//! refresh_token grants.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use service_core::axum::{
    extract::{Form, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::handlers::oidc::{
    authenticate_client, invalid_client, oauth_error, server_error, IdTokenClaims,
};
use crate::models::{Artifact, Client, Credential, CredentialKind, User};
use crate::services::{AudienceMatch, ServiceError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub scope: String,
}

pub async fn token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(req): Form<TokenRequest>,
) -> Response {
    let client = match authenticate_client(
        &state,
        &headers,
        req.client_id.as_deref(),
        req.client_secret.as_deref(),
    )
    .await
    {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(error = %e, "Client authentication failed at token endpoint");
            return invalid_client();
        }
    };

    match req.grant_type.as_str() {
        "authorization_code" => authorization_code_grant(&state, &client, &req).await,
        "client_credentials" => client_credentials_grant(&state, &client, &req).await,
        "refresh_token" => refresh_token_grant(&state, &client, &req).await,
        other => {
            tracing::debug!(grant_type = %other, "Unsupported grant type");
            oauth_error(
                StatusCode::BAD_REQUEST,
                "unsupported_grant_type",
                "grant_type must be authorization_code, client_credentials or refresh_token",
            )
        }
    }
}

async fn authorization_code_grant(
    state: &AppState,
    client: &Client,
    req: &TokenRequest,
) -> Response {
    let (Some(code), Some(redirect_uri)) = (req.code.as_deref(), req.redirect_uri.as_deref())
    else {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "code and redirect_uri are required",
        );
    };

    // Single consumption: replay, expiry and redirect_uri mismatch all
    // surface as invalid_grant.
    let artifact = match state
        .tickets
        .consume_artifact(code, redirect_uri, AudienceMatch::Exact)
        .await
    {
        Ok(a) => a,
        Err(e) if e.is_artifact_error() => {
            return oauth_error(
                StatusCode::BAD_REQUEST,
                "invalid_grant",
                "Authorization code is invalid, expired or already used",
            )
        }
        Err(e) => return server_error(e),
    };

    if artifact.client_id != client.client_id {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_grant",
            "Authorization code was issued to another client",
        );
    }

    if let Err(resp) = verify_pkce(&artifact, req.code_verifier.as_deref()) {
        return resp;
    }

    let user = match state.directory.find_user_by_id(artifact.user_id).await {
        Ok(Some(u)) if u.is_active() => u,
        Ok(_) => {
            return oauth_error(
                StatusCode::BAD_REQUEST,
                "invalid_grant",
                "User is no longer available",
            )
        }
        Err(e) => return server_error(e.into()),
    };

    issue_token_pair(state, client, Some(&user), artifact.scopes, artifact.nonce).await
}

async fn client_credentials_grant(
    state: &AppState,
    client: &Client,
    req: &TokenRequest,
) -> Response {
    let requested: Vec<String> = req
        .scope
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();

    // Requested scopes must be a subset of the registration.
    if requested
        .iter()
        .any(|s| !client.allowed_scopes.iter().any(|a| a == s))
    {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_scope",
            "Requested scope exceeds the client registration",
        );
    }

    let access = match state
        .tickets
        .issue_credential(
            CredentialKind::Access,
            &client.client_id,
            None,
            requested.clone(),
            client.access_token_ttl_secs,
            None,
            None,
            vec![],
            None,
        )
        .await
    {
        Ok(c) => c,
        Err(e) => return server_error(e),
    };

    Json(TokenResponse {
        access_token: access.token,
        token_type: "Bearer".to_string(),
        expires_in: client.access_token_ttl_secs,
        refresh_token: None,
        id_token: None,
        scope: requested.join(" "),
    })
    .into_response()
}

async fn refresh_token_grant(state: &AppState, client: &Client, req: &TokenRequest) -> Response {
    let Some(refresh_token) = req.refresh_token.as_deref() else {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "refresh_token is required",
        );
    };

    let credential = match state.tickets.validate_credential(refresh_token).await {
        Ok(c) if c.kind == CredentialKind::Refresh && c.client_id == client.client_id => c,
        Ok(_) | Err(ServiceError::CredentialInvalid) => {
            return oauth_error(
                StatusCode::BAD_REQUEST,
                "invalid_grant",
                "Refresh token is invalid, revoked or expired",
            )
        }
        Err(e) => return server_error(e),
    };

    let user = match credential.user_id {
        Some(user_id) => match state.directory.find_user_by_id(user_id).await {
            Ok(Some(u)) if u.is_active() => Some(u),
            Ok(_) => {
                return oauth_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_grant",
                    "User is no longer available",
                )
            }
            Err(e) => return server_error(e.into()),
        },
        None => None,
    };

    // Rotation: the old pair dies before the new one is minted.
    if let Err(e) = state.tickets.revoke_chain(refresh_token).await {
        return server_error(e);
    }

    issue_token_pair(state, client, user.as_ref(), credential.scopes, None).await
}

/// Mint an access/refresh pair (plus an ID token when `openid` was
/// granted) and shape the RFC 6749 response.
async fn issue_token_pair(
    state: &AppState,
    client: &Client,
    user: Option<&User>,
    scopes: Vec<String>,
    nonce: Option<String>,
) -> Response {
    let user_id = user.map(|u| u.user_id);

    let access = match state
        .tickets
        .issue_credential(
            CredentialKind::Access,
            &client.client_id,
            user_id,
            scopes.clone(),
            client.access_token_ttl_secs,
            None,
            None,
            vec![],
            None,
        )
        .await
    {
        Ok(c) => c,
        Err(e) => return server_error(e),
    };

    let refresh = match state
        .tickets
        .issue_credential(
            CredentialKind::Refresh,
            &client.client_id,
            user_id,
            scopes.clone(),
            client.refresh_token_ttl_secs,
            Some(access.token.clone()),
            None,
            vec![],
            None,
        )
        .await
    {
        Ok(c) => c,
        Err(e) => return server_error(e),
    };

    let id_token = match user {
        Some(user) if scopes.iter().any(|s| s == "openid") => {
            match build_id_token(state, client, user, &scopes, nonce, &access).await {
                Ok(t) => Some(t),
                Err(e) => return server_error(e),
            }
        }
        _ => None,
    };

    Json(TokenResponse {
        access_token: access.token,
        token_type: "Bearer".to_string(),
        expires_in: client.access_token_ttl_secs,
        refresh_token: Some(refresh.token),
        id_token,
        scope: scopes.join(" "),
    })
    .into_response()
}

async fn build_id_token(
    state: &AppState,
    client: &Client,
    user: &User,
    scopes: &[String],
    nonce: Option<String>,
    access: &Credential,
) -> Result<String, ServiceError> {
    let has = |s: &str| scopes.iter().any(|x| x == s);

    let groups = if has("groups") {
        let groups = state.directory.groups_for_user(user.user_id).await?;
        Some(groups.into_iter().map(|g| g.name).collect())
    } else {
        None
    };

    let now = Utc::now().timestamp();
    let claims = IdTokenClaims {
        iss: state.config.issuer.trim_end_matches('/').to_string(),
        sub: user.user_id.to_string(),
        aud: client.client_id.clone(),
        exp: access.expires_utc.timestamp(),
        iat: now,
        nonce,
        preferred_username: has("profile").then(|| user.username.clone()),
        name: has("profile").then(|| user.preferred_name().to_string()),
        email: if has("email") { user.email.clone() } else { None },
        groups,
    };
    state.keys.sign(&claims)
}

fn verify_pkce(artifact: &Artifact, verifier: Option<&str>) -> Result<(), Response> {
    let Some(challenge) = artifact.code_challenge.as_deref() else {
        return Ok(());
    };
    let Some(verifier) = verifier else {
        return Err(oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_grant",
            "code_verifier is required",
        ));
    };

    let matches = match artifact.code_challenge_method.as_deref() {
        Some("S256") => {
            let digest = Sha256::digest(verifier.as_bytes());
            let computed = URL_SAFE_NO_PAD.encode(digest);
            computed.as_bytes().ct_eq(challenge.as_bytes()).into()
        }
        // "plain" (also the default when no method was sent)
        _ => verifier.as_bytes().ct_eq(challenge.as_bytes()).into(),
    };

    if matches {
        Ok(())
    } else {
        Err(oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_grant",
            "code_verifier does not match the challenge",
        ))
    }
}
