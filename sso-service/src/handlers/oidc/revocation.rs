//! Revocation (RFC 7009) and introspection (RFC 7662).
//!
//! Neither endpoint ever confirms whether a token exists to a caller that
//! is not its owner: revocation always answers 200, introspection answers
//! `active: false` for anything it will not vouch for.

use serde::Deserialize;
use service_core::axum::{
    extract::{Form, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::handlers::oidc::{authenticate_client, invalid_client, server_error};
use crate::models::CredentialKind;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TokenIntrospectionRequest {
    pub token: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

pub async fn revoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(req): Form<TokenIntrospectionRequest>,
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
        Err(_) => return invalid_client(),
    };

    // Only the owning client may revoke; a foreign token is silently left
    // alone so the response never reveals its existence.
    match state.tickets.store().get_credential(&req.token).await {
        Ok(Some(c)) if c.client_id == client.client_id => {
            if let Err(e) = state.tickets.revoke_chain(&req.token).await {
                return server_error(e);
            }
            tracing::info!(client = %client.client_id, "Token revoked");
        }
        Ok(_) => {}
        Err(e) => return server_error(e.into()),
    }

    StatusCode::OK.into_response()
}

pub async fn introspect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(req): Form<TokenIntrospectionRequest>,
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
        Err(_) => return invalid_client(),
    };

    let credential = match state.tickets.validate_credential(&req.token).await {
        Ok(c) if c.client_id == client.client_id => c,
        _ => return Json(serde_json::json!({ "active": false })).into_response(),
    };

    let token_type = match credential.kind {
        CredentialKind::Access => "access_token",
        CredentialKind::Refresh => "refresh_token",
        CredentialKind::ProxyGranting => {
            return Json(serde_json::json!({ "active": false })).into_response()
        }
    };

    let mut body = serde_json::json!({
        "active": true,
        "client_id": credential.client_id,
        "token_type": token_type,
        "scope": credential.scopes.join(" "),
        "exp": credential.expires_utc.timestamp(),
        "iat": credential.created_utc.timestamp(),
    });
    if let Some(user_id) = credential.user_id {
        if let Ok(Some(user)) = state.directory.find_user_by_id(user_id).await {
            body["sub"] = serde_json::json!(user.user_id.to_string());
            body["username"] = serde_json::json!(user.username);
        } else {
            body["sub"] = serde_json::json!(user_id.to_string());
        }
    }

    Json(body).into_response()
}
