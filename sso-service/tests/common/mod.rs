//! Shared fixture: a fully wired router over a seeded in-memory store.

// Not every test binary exercises every helper.
#![allow(dead_code)]

use std::sync::Arc;

use service_core::axum::body::Body;
use service_core::axum::http::{header, Request, Response, StatusCode};
use service_core::axum::Router;
use tower::ServiceExt;

use sso_service::config::{
    CasConfig, CleanupConfig, Environment, LdapConfig, OidcConfig, SecurityConfig, SessionConfig,
    SsoConfig,
};
use sso_service::models::{Client, Group, Tenant, User};
use sso_service::services::{KeyManager, SessionTokenCodec, SingleLogoutQueue, TicketService};
use sso_service::store::MemoryStore;
use sso_service::{build_router, AppState};

pub const ISSUER: &str = "http://localhost:8080";
pub const CLIENT_ID: &str = "web-app";
pub const CLIENT_SECRET: &str = "s3cret";
pub const REDIRECT_URI: &str = "https://app.example/cb";
pub const SERVICE_URL: &str = "https://app.example/cb";
pub const OTHER_TENANT_CLIENT: &str = "beta-app";
pub const SESSION_SECRET: &str = "an-integration-test-session-secret";

pub struct TestEnv {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub alice: User,
}

pub fn test_config() -> SsoConfig {
    SsoConfig {
        common: service_core::config::Config { port: 0 },
        environment: Environment::Dev,
        service_name: "sso-service".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        issuer: ISSUER.to_string(),
        login_url: "/sso/login".to_string(),
        session: SessionConfig {
            secret: SESSION_SECRET.to_string(),
        },
        oidc: OidcConfig { code_ttl_secs: 600 },
        cas: CasConfig {
            ticket_ttl_secs: 300,
            tgt_ttl_secs: 28800,
            pgt_ttl_secs: 7200,
            slo_enabled: false,
        },
        ldap: LdapConfig {
            enabled: false,
            port: 0,
            base_dn: "dc=sso,dc=local".to_string(),
            admin_dn: "cn=admin,dc=sso,dc=local".to_string(),
            admin_password: "admin-secret".to_string(),
        },
        cleanup: CleanupConfig {
            interval_secs: 3600,
        },
        security: SecurityConfig {
            allowed_origins: vec!["*".to_string()],
        },
    }
}

pub fn seeded_store() -> (Arc<MemoryStore>, User) {
    let store = Arc::new(MemoryStore::new());

    let acme = Tenant::new("acme".to_string(), Some("acme.example".to_string()));
    let beta = Tenant::new("beta".to_string(), None);

    let mut alice = User::new(
        acme.tenant_id,
        "alice".to_string(),
        sso_service::utils::hash_password("password123").unwrap(),
    );
    alice.email = Some("alice@acme.example".to_string());
    alice.display_name = Some("Alice Anderson".to_string());

    let bob = User::new(
        beta.tenant_id,
        "bob".to_string(),
        sso_service::utils::hash_password("hunter2").unwrap(),
    );

    let staff = Group::new(acme.tenant_id, "staff".to_string());

    let mut web_app = Client::new(
        CLIENT_ID.to_string(),
        sso_service::utils::hash_password(CLIENT_SECRET).unwrap(),
        acme.tenant_id,
    );
    web_app.redirect_uris = vec![REDIRECT_URI.to_string()];
    web_app.post_logout_redirect_uris = vec!["https://app.example/goodbye".to_string()];
    web_app.root_url = Some("https://app.example".to_string());
    web_app.allowed_scopes = vec![
        "openid".to_string(),
        "profile".to_string(),
        "email".to_string(),
        "groups".to_string(),
        "api".to_string(),
    ];

    let mut beta_app = Client::new(
        OTHER_TENANT_CLIENT.to_string(),
        sso_service::utils::hash_password("beta-secret").unwrap(),
        beta.tenant_id,
    );
    beta_app.redirect_uris = vec!["https://beta.example/cb".to_string()];
    beta_app.root_url = Some("https://beta.example".to_string());
    beta_app.allowed_scopes = vec!["openid".to_string()];

    store.add_membership(alice.user_id, staff.group_id);
    let alice_clone = alice.clone();
    store.add_tenant(acme);
    store.add_tenant(beta);
    store.add_user(alice);
    store.add_user(bob);
    store.add_group(staff);
    store.add_client(web_app);
    store.add_client(beta_app);

    (store, alice_clone)
}

pub async fn spawn_env() -> TestEnv {
    let config = test_config();
    let (store, alice) = seeded_store();

    let keys = Arc::new(KeyManager::new().unwrap());
    let (slo, _slo_handle) = SingleLogoutQueue::start(false, reqwest::Client::new());

    let state = AppState {
        config: config.clone(),
        directory: store.clone(),
        tickets: TicketService::new(store.clone()),
        keys,
        session_codec: SessionTokenCodec::new(config.session.secret.as_bytes()),
        slo,
        http: reqwest::Client::new(),
    };

    let app = build_router(state.clone()).await.unwrap();
    TestEnv {
        app,
        state,
        store,
        alice,
    }
}

/// POST /sso/login for alice and return her session cookie pair.
pub async fn login_alice(env: &TestEnv) -> String {
    let response = env
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sso/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(
                    "tenant=acme&username=alice&password=password123",
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    cookie_pair(&response).expect("login should set the session cookie")
}

/// First Set-Cookie value, trimmed to `name=value`.
pub fn cookie_pair<B>(response: &Response<B>) -> Option<String> {
    let raw = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    Some(raw.split(';').next().unwrap_or(raw).to_string())
}

pub fn location<B>(response: &Response<B>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = service_core::axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

/// Query-parameter value out of a URL, percent-decoded.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let query = url.split_once('?')?.1;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == name).then(|| urlencoding::decode(v).ok())?.map(|s| s.into_owned())
    })
}
