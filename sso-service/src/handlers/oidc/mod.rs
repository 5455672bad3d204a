//! OIDC authorization-server endpoints.

pub mod authorize;
pub mod discovery;
pub mod logout;
pub mod revocation;
pub mod token;
pub mod userinfo;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use service_core::axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::models::Client;
use crate::services::ServiceError;
use crate::AppState;

/// ID token claims. Identity claims beyond the registered set are gated by
/// the granted scopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
}

/// RFC 6749 error body.
pub(crate) fn oauth_error(status: StatusCode, error: &str, description: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": error,
            "error_description": description,
        })),
    )
        .into_response()
}

/// 401 for a caller that failed client authentication.
pub(crate) fn invalid_client() -> Response {
    oauth_error(
        StatusCode::UNAUTHORIZED,
        "invalid_client",
        "Client authentication failed",
    )
}

/// Opaque 500 for store or signing failures; the detail stays in the log.
pub(crate) fn server_error(err: ServiceError) -> Response {
    tracing::error!(error = %err, "OAuth endpoint failure");
    oauth_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "server_error",
        "Temporary failure",
    )
}

/// Authenticate a client from the Basic Authorization header or, failing
/// that, body parameters.
pub(crate) async fn authenticate_client(
    state: &AppState,
    headers: &HeaderMap,
    body_client_id: Option<&str>,
    body_client_secret: Option<&str>,
) -> Result<Client, ServiceError> {
    let (client_id, client_secret) = match basic_credentials(headers) {
        Some((id, secret)) => (id, secret),
        None => match (body_client_id, body_client_secret) {
            (Some(id), Some(secret)) => (id.to_string(), secret.to_string()),
            _ => {
                return Err(ServiceError::InvalidRequest(
                    "missing client credentials".into(),
                ))
            }
        },
    };

    let client = state
        .directory
        .find_client(&client_id)
        .await?
        .filter(|c| c.is_active())
        .ok_or(ServiceError::UnknownClient)?;

    crate::utils::verify_password(&client_secret, &client.client_secret_hash)
        .map_err(|_| ServiceError::InvalidCredentials)?;

    Ok(client)
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some((id.to_string(), secret.to_string()))
}

/// Bearer token from the Authorization header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.to_string())
}

/// Append query parameters to a URL that may already carry some.
pub(crate) fn append_params(url: &str, params: &[(&str, &str)]) -> String {
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    if url.contains('?') {
        format!("{url}&{query}")
    } else {
        format!("{url}?{query}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_header_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Basic {}", STANDARD.encode("app:s3cret"))
                .parse()
                .unwrap(),
        );
        assert_eq!(
            basic_credentials(&headers),
            Some(("app".to_string(), "s3cret".to_string()))
        );
    }

    #[test]
    fn append_params_handles_existing_query() {
        assert_eq!(
            append_params("https://a/cb", &[("code", "x y")]),
            "https://a/cb?code=x%20y"
        );
        assert_eq!(
            append_params("https://a/cb?k=1", &[("state", "s")]),
            "https://a/cb?k=1&state=s"
        );
    }
}
