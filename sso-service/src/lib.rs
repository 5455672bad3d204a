pub mod config;
pub mod handlers;
pub mod ldap;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

use service_core::axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::SsoConfig;
use crate::services::{KeyManager, SessionTokenCodec, SingleLogoutQueue, TicketService};
use crate::store::DirectoryStore;
use service_core::error::AppError;

/// Name of the stateless shared-login cookie.
pub const SSO_SESSION_COOKIE: &str = "sso_session";
/// Name of the CAS ticket-granting cookie, scoped to /cas.
pub const TGC_COOKIE: &str = "TGC";

#[derive(Clone)]
pub struct AppState {
    pub config: SsoConfig,
    pub directory: Arc<dyn DirectoryStore>,
    pub tickets: TicketService,
    pub keys: Arc<KeyManager>,
    pub session_codec: SessionTokenCodec,
    pub slo: SingleLogoutQueue,
    pub http: reqwest::Client,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let oidc_routes = Router::new()
        .route(
            "/.well-known/openid-configuration",
            get(handlers::oidc::discovery::openid_configuration),
        )
        .route("/.well-known/jwks.json", get(handlers::oidc::discovery::jwks))
        .route("/oauth/authorize", get(handlers::oidc::authorize::authorize))
        .route("/oauth/token", post(handlers::oidc::token::token))
        .route(
            "/oauth/userinfo",
            get(handlers::oidc::userinfo::userinfo).post(handlers::oidc::userinfo::userinfo),
        )
        .route("/oauth/revoke", post(handlers::oidc::revocation::revoke))
        .route(
            "/oauth/introspect",
            post(handlers::oidc::revocation::introspect),
        )
        .route(
            "/oauth/logout",
            get(handlers::oidc::logout::logout).post(handlers::oidc::logout::logout_form),
        );

    let cas_routes = Router::new()
        .route("/cas/login", get(handlers::cas::login::login))
        .route(
            "/cas/logout",
            get(handlers::cas::logout::logout),
        )
        .route("/cas/validate", get(handlers::cas::validate::validate_v1))
        .route(
            "/cas/serviceValidate",
            get(handlers::cas::validate::service_validate),
        )
        .route(
            "/cas/p3/serviceValidate",
            get(handlers::cas::validate::p3_service_validate),
        )
        .route(
            "/cas/proxyValidate",
            get(handlers::cas::validate::proxy_validate),
        )
        .route("/cas/proxy", get(handlers::cas::proxy::proxy))
        .route("/cas/samlValidate", post(handlers::cas::saml::saml_validate));

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/sso/login", post(handlers::sso::login))
        .merge(oidc_routes)
        .merge(cas_routes)
        .with_state(state.clone())
        .layer(
            TraceLayer::new_for_http().make_span_with(
                |request: &service_core::axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                },
            ),
        )
        .layer(cors_layer(&state));

    Ok(app)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    use service_core::axum::http::{HeaderValue, Method};

    CorsLayer::new()
        .allow_origin(
            state
                .config
                .security
                .allowed_origins
                .iter()
                .map(|o| {
                    o.parse::<HeaderValue>().unwrap_or_else(|e| {
                        tracing::error!("Invalid CORS origin '{}': {}. Using fallback.", o, e);
                        HeaderValue::from_static("*")
                    })
                })
                .collect::<Vec<HeaderValue>>(),
        )
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            service_core::axum::http::header::AUTHORIZATION,
            service_core::axum::http::header::CONTENT_TYPE,
        ])
}

/// Service health check
pub async fn health_check(
    service_core::axum::extract::State(state): service_core::axum::extract::State<AppState>,
) -> service_core::axum::Json<serde_json::Value> {
    service_core::axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
    }))
}
