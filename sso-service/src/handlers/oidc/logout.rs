//! RP-initiated logout (end_session_endpoint).

use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use service_core::axum::{
    extract::{Form, Query, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use uuid::Uuid;

use crate::handlers::oidc::{append_params, IdTokenClaims};
use crate::{AppState, SSO_SESSION_COOKIE};

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub id_token_hint: Option<String>,
    pub client_id: Option<String>,
    pub post_logout_redirect_uri: Option<String>,
    pub state: Option<String>,
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(req): Query<LogoutRequest>,
) -> Response {
    end_session(state, jar, req).await
}

pub async fn logout_form(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(req): Form<LogoutRequest>,
) -> Response {
    end_session(state, jar, req).await
}

/// Revoke the user's tokens for the named client and drop the web session
/// cookie.
///
/// The redirect target is trusted as-is when a verified `id_token_hint`
/// vouches for the request; with only a `client_id` it must match a
/// registered post-logout URI.
async fn end_session(state: AppState, jar: CookieJar, req: LogoutRequest) -> Response {
    let hint = req
        .id_token_hint
        .as_deref()
        .and_then(|h| verified_hint(&state, h));

    // Which client the logout is scoped to, and on whose say-so.
    let (client_id, hint_vouches) = match (&hint, &req.client_id) {
        (Some(claims), _) => (Some(claims.aud.clone()), true),
        (None, Some(client_id)) => (Some(client_id.clone()), false),
        (None, None) => (None, false),
    };

    // The subject comes from the hint, or failing that the session cookie.
    let user_id = match &hint {
        Some(claims) => claims.sub.parse::<Uuid>().ok(),
        None => jar
            .get(SSO_SESSION_COOKIE)
            .and_then(|c| state.session_codec.parse(c.value()).ok()),
    };

    if let (Some(client_id), Some(user_id)) = (&client_id, user_id) {
        match state
            .tickets
            .store()
            .revoke_user_client_credentials(user_id, client_id)
            .await
        {
            Ok(count) if count > 0 => {
                tracing::info!(client = %client_id, count, "Revoked tokens at logout");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Token revocation at logout failed"),
        }
    }

    let jar = jar.remove(Cookie::build((SSO_SESSION_COOKIE, "")).path("/").build());

    let redirect = match req.post_logout_redirect_uri.as_deref() {
        Some(uri) if hint_vouches => Some(uri.to_string()),
        Some(uri) => match &client_id {
            Some(client_id) => registered_redirect(&state, client_id, uri).await,
            None => None,
        },
        None => None,
    };

    match redirect {
        Some(uri) => {
            let target = match req.state.as_deref() {
                Some(s) => append_params(&uri, &[("state", s)]),
                None => uri,
            };
            (jar, Redirect::to(&target)).into_response()
        }
        None => (
            jar,
            Json(serde_json::json!({ "message": "Logged out" })),
        )
            .into_response(),
    }
}

fn verified_hint(state: &AppState, hint: &str) -> Option<IdTokenClaims> {
    let claims: IdTokenClaims = match state.keys.verify(hint) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected id_token_hint at logout");
            return None;
        }
    };
    (claims.iss == state.config.issuer.trim_end_matches('/')).then_some(claims)
}

async fn registered_redirect(state: &AppState, client_id: &str, uri: &str) -> Option<String> {
    let client = state.directory.find_client(client_id).await.ok().flatten()?;
    client
        .allows_post_logout_redirect(uri)
        .then(|| uri.to_string())
}
