//! Userinfo endpoint. Claims released here follow the scopes granted to
//! the presented access token.

use serde::Serialize;
use service_core::axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::handlers::oidc::{bearer_token, oauth_error};
use crate::models::CredentialKind;
use crate::services::ServiceError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct UserinfoResponse {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
}

pub async fn userinfo(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return invalid_token();
    };

    let credential = match state.tickets.validate_credential(&token).await {
        Ok(c) if c.kind == CredentialKind::Access => c,
        Ok(_) | Err(ServiceError::CredentialInvalid) => return invalid_token(),
        Err(e) => {
            tracing::error!(error = %e, "Userinfo lookup failed");
            return oauth_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "Temporary failure",
            );
        }
    };

    // client_credentials tokens have no subject to describe.
    let Some(user_id) = credential.user_id else {
        return invalid_token();
    };
    if !credential.scopes.iter().any(|s| s == "openid") {
        return oauth_error(
            StatusCode::FORBIDDEN,
            "insufficient_scope",
            "The openid scope is required",
        );
    }

    let user = match state.directory.find_user_by_id(user_id).await {
        Ok(Some(u)) if u.is_active() => u,
        Ok(_) => return invalid_token(),
        Err(e) => {
            tracing::error!(error = %e, "Userinfo lookup failed");
            return oauth_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "Temporary failure",
            );
        }
    };

    let has = |s: &str| credential.scopes.iter().any(|x| x == s);

    let groups = if has("groups") {
        match state.directory.groups_for_user(user.user_id).await {
            Ok(groups) => Some(groups.into_iter().map(|g| g.name).collect()),
            Err(e) => {
                tracing::error!(error = %e, "Group lookup failed");
                return oauth_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "Temporary failure",
                );
            }
        }
    } else {
        None
    };

    Json(UserinfoResponse {
        sub: user.user_id.to_string(),
        preferred_username: has("profile").then(|| user.username.clone()),
        name: has("profile").then(|| user.preferred_name().to_string()),
        email: if has("email") { user.email.clone() } else { None },
        phone_number: if has("profile") { user.phone.clone() } else { None },
        groups,
    })
    .into_response()
}

fn invalid_token() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(
            service_core::axum::http::header::WWW_AUTHENTICATE,
            "Bearer error=\"invalid_token\"",
        )],
        Json(serde_json::json!({ "error": "invalid_token" })),
    )
        .into_response()
}
