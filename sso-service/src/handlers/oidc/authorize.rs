//! Authorization endpoint: the front door of the code flow.

use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use service_core::axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};

use crate::handlers::oidc::{append_params, oauth_error};
use crate::models::ArtifactKind;
use crate::services::ArtifactExtras;
use crate::{AppState, SSO_SESSION_COOKIE};

#[derive(Debug, Deserialize, Serialize)]
pub struct AuthorizeQuery {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,
}

pub async fn authorize(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    // client_id and redirect_uri are validated before anything is sent to
    // the redirect target; failures here never redirect.
    let client = match state.directory.find_client(&query.client_id).await {
        Ok(Some(c)) if c.is_active() => c,
        Ok(_) => {
            return oauth_error(StatusCode::BAD_REQUEST, "invalid_client", "Unknown client")
        }
        Err(e) => {
            tracing::error!(error = %e, "Client lookup failed");
            return oauth_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "Temporary failure",
            );
        }
    };
    if !client.allows_redirect(&query.redirect_uri) {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "redirect_uri is not registered for this client",
        );
    }

    // From here on the redirect target is trusted; protocol errors go back
    // to it with the state echoed.
    if query.response_type != "code" {
        return redirect_error(&query, "unsupported_response_type");
    }

    if let Some(method) = query.code_challenge_method.as_deref() {
        if method != "plain" && method != "S256" {
            return redirect_error(&query, "invalid_request");
        }
    }

    // An authenticated session is required; otherwise bounce to the shared
    // login page carrying the full authorize URL.
    let user_id = jar
        .get(SSO_SESSION_COOKIE)
        .and_then(|c| state.session_codec.parse(c.value()).ok());
    let Some(user_id) = user_id else {
        return redirect_to_login(&state, &query);
    };

    let user = match state.directory.find_user_by_id(user_id).await {
        Ok(Some(u)) if u.is_active() => u,
        Ok(_) => return redirect_to_login(&state, &query),
        Err(e) => {
            tracing::error!(error = %e, "User lookup failed");
            return redirect_error(&query, "server_error");
        }
    };

    // Hard tenant-isolation check: a user may only authorize clients of
    // their own tenant.
    if user.tenant_id != client.tenant_id {
        tracing::warn!(
            user = %user.username,
            client = %client.client_id,
            "Tenant mismatch at authorization"
        );
        return redirect_error(&query, "access_denied");
    }

    let requested: Vec<String> = query
        .scope
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();
    let scopes = client.grantable_scopes(&requested);

    let code_challenge_method = query
        .code_challenge
        .as_ref()
        .map(|_| {
            query
                .code_challenge_method
                .clone()
                .unwrap_or_else(|| "plain".to_string())
        });

    let artifact = match state
        .tickets
        .issue_artifact(
            ArtifactKind::OidcCode,
            &client.client_id,
            user.user_id,
            &query.redirect_uri,
            scopes,
            state.config.oidc.code_ttl_secs,
            ArtifactExtras {
                state: query.state.clone(),
                nonce: query.nonce.clone(),
                code_challenge: query.code_challenge.clone(),
                code_challenge_method,
                ..Default::default()
            },
        )
        .await
    {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(error = %e, "Failed to issue authorization code");
            return redirect_error(&query, "server_error");
        }
    };

    let mut params = vec![("code", artifact.token.as_str())];
    if let Some(s) = query.state.as_deref() {
        params.push(("state", s));
    }
    Redirect::to(&append_params(&query.redirect_uri, &params)).into_response()
}

fn redirect_error(query: &AuthorizeQuery, error: &str) -> Response {
    let mut params = vec![("error", error)];
    if let Some(s) = query.state.as_deref() {
        params.push(("state", s));
    }
    Redirect::to(&append_params(&query.redirect_uri, &params)).into_response()
}

fn redirect_to_login(state: &AppState, query: &AuthorizeQuery) -> Response {
    let issuer = state.config.issuer.trim_end_matches('/');
    let original = format!(
        "{issuer}/oauth/authorize?{}",
        serde_urlencoded::to_string(query).unwrap_or_default()
    );
    Redirect::to(&append_params(
        &state.config.login_url,
        &[("redirect", original.as_str())],
    ))
    .into_response()
}
