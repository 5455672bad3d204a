//! CAS logout: kill the ticket-granting session and fan out single-logout
//! notices to every service that consumed a ticket under it.

use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use service_core::axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};

use crate::services::tickets::url_origin;
use crate::services::SloNotice;
use crate::{AppState, TGC_COOKIE};

#[derive(Debug, Deserialize)]
pub struct LogoutQuery {
    pub service: Option<String>,
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<LogoutQuery>,
) -> Response {
    if let Some(tgc) = jar.get(TGC_COOKIE).map(|c| c.value().to_string()) {
        match state.tickets.revoke_session(&tgc).await {
            Ok(Some(session)) => {
                tracing::info!(user_id = %session.user_id, "CAS session ended");
                enqueue_slo_notices(&state, &tgc).await;
            }
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "Failed to revoke CAS session"),
        }
    }

    let jar = jar.remove(Cookie::build((TGC_COOKIE, "")).path("/cas").build());

    // Follow-up redirect only to a registered service.
    if let Some(service) = query.service.as_deref() {
        let known = match url_origin(service) {
            Some(origin) => matches!(
                state.directory.find_client_by_origin(&origin).await,
                Ok(Some(c)) if c.is_active()
            ),
            None => false,
        };
        if known {
            return (jar, Redirect::to(service)).into_response();
        }
        tracing::debug!(service = %service, "Ignoring unregistered logout redirect");
    }

    (jar, Json(serde_json::json!({ "message": "Logged out" }))).into_response()
}

/// One notice per ticket issued under the session, addressed to the
/// ticket's own service URL.
async fn enqueue_slo_notices(state: &AppState, session_token: &str) {
    let artifacts = match state
        .tickets
        .store()
        .artifacts_for_session(session_token)
        .await
    {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(error = %e, "Failed to collect tickets for single logout");
            return;
        }
    };
    for artifact in artifacts {
        state.slo.notify(SloNotice {
            service_url: artifact.audience.clone(),
            ticket: artifact.token.clone(),
        });
    }
}
