//! CAS login endpoint.
//!
//! Establishes the ticket-granting session (TGC cookie, scoped to /cas)
//! from either an existing TGC or the shared web login cookie, then mints
//! a service ticket for the requesting service.

use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use service_core::axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use uuid::Uuid;

use crate::handlers::oidc::append_params;
use crate::models::{ArtifactKind, Client, User};
use crate::services::tickets::url_origin;
use crate::services::ArtifactExtras;
use crate::{AppState, SSO_SESSION_COOKIE, TGC_COOKIE};

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub service: Option<String>,
    /// "true" forces fresh authentication, ignoring both cookies.
    pub renew: Option<String>,
    /// "true" means never prompt: bounce back without a ticket when no
    /// session exists.
    pub gateway: Option<String>,
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<LoginQuery>,
) -> Response {
    let renew = query.renew.as_deref() == Some("true");
    let gateway = query.gateway.as_deref() == Some("true");

    // The service must be registered before any ticket or redirect
    // involves it.
    let client = match query.service.as_deref() {
        Some(service) => match resolve_service(&state, service).await {
            Ok(c) => Some(c),
            Err(resp) => return resp,
        },
        None => None,
    };

    let session = if renew { None } else { existing_session(&state, &jar).await };

    let (jar, tgt_token, user) = match session {
        Some((tgt_token, user)) => (jar, tgt_token, user),
        None => {
            // Fall back to the shared web login cookie, unless renew.
            let web_user = if renew { None } else { web_session_user(&state, &jar).await };
            match web_user {
                Some(user) => {
                    let session = match state
                        .tickets
                        .issue_session(user.user_id, None, state.config.cas.tgt_ttl_secs)
                        .await
                    {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to establish CAS session");
                            return internal_error();
                        }
                    };
                    let cookie = Cookie::build((TGC_COOKIE, session.token.clone()))
                        .path("/cas")
                        .http_only(true)
                        .build();
                    (jar.add(cookie), session.token, user)
                }
                None => {
                    if gateway {
                        if let Some(service) = query.service.as_deref() {
                            return Redirect::to(service).into_response();
                        }
                    }
                    return redirect_to_login(&state, &query);
                }
            }
        }
    };

    let Some(client) = client else {
        return (
            jar,
            Json(serde_json::json!({
                "message": format!("Logged in as {}", user.username),
            })),
        )
            .into_response();
    };

    // A session from another tenant is useless for this service; drop it
    // and start over.
    if user.tenant_id != client.tenant_id {
        tracing::warn!(user = %user.username, client = %client.client_id,
            "Tenant mismatch at CAS login");
        let _ = state.tickets.revoke_session(&tgt_token).await;
        let jar = jar
            .remove(Cookie::build((TGC_COOKIE, "")).path("/cas").build())
            .remove(Cookie::build((SSO_SESSION_COOKIE, "")).path("/").build());
        return (jar, redirect_to_login(&state, &query)).into_response();
    }

    let service = query.service.as_deref().unwrap_or_default();
    let ticket = match state
        .tickets
        .issue_artifact(
            ArtifactKind::ServiceTicket,
            &client.client_id,
            user.user_id,
            service,
            vec![],
            state.config.cas.ticket_ttl_secs,
            ArtifactExtras {
                session_token: Some(tgt_token),
                ..Default::default()
            },
        )
        .await
    {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(error = %e, "Failed to issue service ticket");
            return internal_error();
        }
    };

    (
        jar,
        Redirect::to(&append_params(service, &[("ticket", &ticket.token)])),
    )
        .into_response()
}

async fn resolve_service(state: &AppState, service: &str) -> Result<Client, Response> {
    let Some(origin) = url_origin(service) else {
        return Err((StatusCode::BAD_REQUEST, "service is not a valid URL").into_response());
    };
    match state.directory.find_client_by_origin(&origin).await {
        Ok(Some(c)) if c.is_active() => Ok(c),
        Ok(_) => Err((StatusCode::BAD_REQUEST, "service not recognized").into_response()),
        Err(e) => {
            tracing::error!(error = %e, "Service lookup failed");
            Err(internal_error())
        }
    }
}

/// A live TGT from the TGC cookie, with its user.
async fn existing_session(state: &AppState, jar: &CookieJar) -> Option<(String, User)> {
    let token = jar.get(TGC_COOKIE)?.value().to_string();
    let session = state.tickets.validate_session(&token).await.ok()?;
    let user = state
        .directory
        .find_user_by_id(session.user_id)
        .await
        .ok()
        .flatten()
        .filter(|u| u.is_active())?;
    Some((token, user))
}

async fn web_session_user(state: &AppState, jar: &CookieJar) -> Option<User> {
    let cookie = jar.get(SSO_SESSION_COOKIE)?;
    let user_id: Uuid = state.session_codec.parse(cookie.value()).ok()?;
    state
        .directory
        .find_user_by_id(user_id)
        .await
        .ok()
        .flatten()
        .filter(|u| u.is_active())
}

/// Bounce to the shared login page, returning to /cas/login afterwards.
/// `renew` is dropped from the return URL so the forced re-login is not
/// demanded again on the way back.
fn redirect_to_login(state: &AppState, query: &LoginQuery) -> Response {
    let issuer = state.config.issuer.trim_end_matches('/');
    let mut original = format!("{issuer}/cas/login");
    if let Some(service) = query.service.as_deref() {
        original = append_params(&original, &[("service", service)]);
    }
    Redirect::to(&append_params(
        &state.config.login_url,
        &[("redirect", original.as_str())],
    ))
    .into_response()
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
}
