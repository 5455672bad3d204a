//! Shared login endpoint.
//!
//! Both protocol fronts funnel unauthenticated browsers here; a successful
//! login sets the stateless `sso_session` cookie and sends the browser
//! back where it came from.

use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use service_core::{
    axum::{
        extract::{Form, State},
        response::{IntoResponse, Redirect},
        Json,
    },
    error::AppError,
};

use crate::services::ServiceError;
use crate::{AppState, SSO_SESSION_COOKIE};

#[derive(Debug, Deserialize)]
pub struct SsoLoginRequest {
    pub tenant: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub redirect: Option<String>,
}

/// Login with tenant, username and password.
///
/// Every failure mode reports the same invalid-credentials error; nothing
/// about which stage failed leaks to the caller.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(req): Form<SsoLoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = authenticate(&state, &req.tenant, &req.username, &req.password).await?;

    state
        .directory
        .touch_last_login(user.user_id)
        .await
        .map_err(ServiceError::from)?;

    tracing::info!(user = %user.username, tenant = %req.tenant, "User logged in");

    let token = state.session_codec.generate(user.user_id);
    let cookie = Cookie::build((SSO_SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .build();
    let jar = jar.add(cookie);

    match req.redirect.as_deref().filter(|r| !r.is_empty()) {
        Some(redirect) => Ok((jar, Redirect::to(redirect)).into_response()),
        None => Ok((
            jar,
            Json(serde_json::json!({ "message": "Login successful" })),
        )
            .into_response()),
    }
}

async fn authenticate(
    state: &AppState,
    tenant_name: &str,
    username: &str,
    password: &str,
) -> Result<crate::models::User, ServiceError> {
    let tenant = state
        .directory
        .find_tenant_by_name(tenant_name)
        .await?
        .filter(|t| t.is_active())
        .ok_or(ServiceError::InvalidCredentials)?;

    let user = state
        .directory
        .find_user(tenant.tenant_id, username)
        .await?
        .filter(|u| u.is_active())
        .ok_or(ServiceError::InvalidCredentials)?;

    crate::utils::verify_password(password, &user.password_hash)
        .map_err(|_| ServiceError::InvalidCredentials)?;

    Ok(user)
}
