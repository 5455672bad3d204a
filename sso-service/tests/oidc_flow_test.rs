//! End-to-end tests for the OIDC authorization server.

mod common;

use base64::{engine::general_purpose::STANDARD, engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use common::*;
use service_core::axum::body::Body;
use service_core::axum::http::{header, Request, StatusCode};
use sha2::{Digest, Sha256};
use tower::ServiceExt;

fn authorize_uri(client_id: &str, redirect_uri: &str, extra: &str) -> String {
    format!(
        "/oauth/authorize?client_id={client_id}&redirect_uri={}&response_type=code&scope=openid%20profile%20email%20groups&state=xyz{extra}",
        urlencoding::encode(redirect_uri)
    )
}

fn basic_auth(id: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{id}:{secret}")))
}

async fn get_code(env: &TestEnv, cookie: &str, extra: &str) -> String {
    let response = env
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(authorize_uri(CLIENT_ID, REDIRECT_URI, extra))
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = location(&response);
    assert!(location.starts_with(REDIRECT_URI), "unexpected redirect: {location}");
    assert_eq!(query_param(&location, "state").as_deref(), Some("xyz"));
    query_param(&location, "code").expect("redirect should carry a code")
}

async fn exchange(env: &TestEnv, body: String) -> (StatusCode, serde_json::Value) {
    let response = env
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth/token")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(header::AUTHORIZATION, basic_auth(CLIENT_ID, CLIENT_SECRET))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

#[tokio::test]
async fn discovery_document_advertises_the_endpoints() {
    let env = spawn_env().await;
    let response = env
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/.well-known/openid-configuration")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let doc = body_json(response).await;
    assert_eq!(doc["issuer"], ISSUER);
    assert_eq!(doc["token_endpoint"], format!("{ISSUER}/oauth/token"));
    assert_eq!(doc["response_types_supported"][0], "code");
}

#[tokio::test]
async fn jwks_lists_the_active_key() {
    let env = spawn_env().await;
    let response = env
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/.well-known/jwks.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let doc = body_json(response).await;
    assert_eq!(doc["keys"][0]["kty"], "RSA");
    assert_eq!(doc["keys"][0]["kid"], env.state.keys.active_kid());
}

#[tokio::test]
async fn authorize_without_a_session_bounces_to_login() {
    let env = spawn_env().await;
    let response = env
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(authorize_uri(CLIENT_ID, REDIRECT_URI, ""))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/sso/login?redirect="));
}

#[tokio::test]
async fn authorize_rejects_unknown_clients_without_redirecting() {
    let env = spawn_env().await;
    let response = env
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(authorize_uri("ghost", REDIRECT_URI, ""))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_client");
}

#[tokio::test]
async fn full_code_flow_and_replay_rejection() {
    let env = spawn_env().await;
    let cookie = login_alice(&env).await;
    let code = get_code(&env, &cookie, "&nonce=n-123").await;

    let body = format!(
        "grant_type=authorization_code&code={code}&redirect_uri={}",
        urlencoding::encode(REDIRECT_URI)
    );
    let (status, tokens) = exchange(&env, body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tokens["token_type"], "Bearer");
    assert!(tokens["access_token"].as_str().is_some());
    assert!(tokens["refresh_token"].as_str().is_some());

    // ID token: RS256, kid header, nonce echoed, sub is the user id.
    let id_token = tokens["id_token"].as_str().expect("openid grants an ID token");
    let header = jsonwebtoken::decode_header(id_token).unwrap();
    assert_eq!(header.alg, jsonwebtoken::Algorithm::RS256);
    assert_eq!(header.kid.as_deref(), Some(env.state.keys.active_kid().as_str()));
    let claims: serde_json::Value = env.state.keys.verify(id_token).unwrap();
    assert_eq!(claims["iss"], ISSUER);
    assert_eq!(claims["aud"], CLIENT_ID);
    assert_eq!(claims["nonce"], "n-123");
    assert_eq!(claims["sub"], env.alice.user_id.to_string());

    // Replaying the code fails.
    let (status, error) = exchange(&env, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "invalid_grant");
}

#[tokio::test]
async fn pkce_s256_round_trip() {
    let env = spawn_env().await;
    let cookie = login_alice(&env).await;

    let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
    let code = get_code(
        &env,
        &cookie,
        &format!("&code_challenge={challenge}&code_challenge_method=S256"),
    )
    .await;

    let (status, _) = exchange(
        &env,
        format!(
            "grant_type=authorization_code&code={code}&redirect_uri={}&code_verifier=wrong",
            urlencoding::encode(REDIRECT_URI)
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The failed exchange consumed the code; a fresh one with the right
    // verifier succeeds.
    let code = get_code(
        &env,
        &cookie,
        &format!("&code_challenge={challenge}&code_challenge_method=S256"),
    )
    .await;
    let (status, tokens) = exchange(
        &env,
        format!(
            "grant_type=authorization_code&code={code}&redirect_uri={}&code_verifier={verifier}",
            urlencoding::encode(REDIRECT_URI)
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(tokens["access_token"].as_str().is_some());
}

#[tokio::test]
async fn cross_tenant_authorization_is_denied() {
    let env = spawn_env().await;
    let cookie = login_alice(&env).await;

    let response = env
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(authorize_uri(OTHER_TENANT_CLIENT, "https://beta.example/cb", ""))
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = location(&response);
    assert!(location.starts_with("https://beta.example/cb"));
    assert_eq!(query_param(&location, "error").as_deref(), Some("access_denied"));
}

#[tokio::test]
async fn userinfo_releases_scope_gated_claims() {
    let env = spawn_env().await;
    let cookie = login_alice(&env).await;
    let code = get_code(&env, &cookie, "").await;
    let (_, tokens) = exchange(
        &env,
        format!(
            "grant_type=authorization_code&code={code}&redirect_uri={}",
            urlencoding::encode(REDIRECT_URI)
        ),
    )
    .await;
    let access = tokens["access_token"].as_str().unwrap();

    let response = env
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/oauth/userinfo")
                .header(header::AUTHORIZATION, format!("Bearer {access}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let claims = body_json(response).await;
    assert_eq!(claims["sub"], env.alice.user_id.to_string());
    assert_eq!(claims["preferred_username"], "alice");
    assert_eq!(claims["email"], "alice@acme.example");
    assert_eq!(claims["groups"][0], "staff");

    // Garbage bearer token.
    let response = env
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/oauth/userinfo")
                .header(header::AUTHORIZATION, "Bearer nonsense")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_rotation_revokes_the_old_pair() {
    let env = spawn_env().await;
    let cookie = login_alice(&env).await;
    let code = get_code(&env, &cookie, "").await;
    let (_, tokens) = exchange(
        &env,
        format!(
            "grant_type=authorization_code&code={code}&redirect_uri={}",
            urlencoding::encode(REDIRECT_URI)
        ),
    )
    .await;
    let old_access = tokens["access_token"].as_str().unwrap().to_string();
    let old_refresh = tokens["refresh_token"].as_str().unwrap().to_string();

    let (status, rotated) =
        exchange(&env, format!("grant_type=refresh_token&refresh_token={old_refresh}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(rotated["access_token"], old_access.as_str());
    assert_eq!(rotated["scope"], tokens["scope"]);

    // The old refresh token is dead, and its access token with it.
    let (status, error) =
        exchange(&env, format!("grant_type=refresh_token&refresh_token={old_refresh}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "invalid_grant");
    assert!(env.state.tickets.validate_credential(&old_access).await.is_err());
}

#[tokio::test]
async fn client_credentials_grant_enforces_scope_subset() {
    let env = spawn_env().await;

    let (status, tokens) =
        exchange(&env, "grant_type=client_credentials&scope=api".to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(tokens["access_token"].as_str().is_some());
    assert!(tokens.get("refresh_token").is_none());
    assert_eq!(tokens["scope"], "api");

    let (status, error) =
        exchange(&env, "grant_type=client_credentials&scope=admin".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "invalid_scope");
}

#[tokio::test]
async fn token_endpoint_rejects_bad_client_credentials() {
    let env = spawn_env().await;
    let response = env
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth/token")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(header::AUTHORIZATION, basic_auth(CLIENT_ID, "wrong"))
                .body(Body::from("grant_type=client_credentials"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_client");
}

#[tokio::test]
async fn introspection_never_confirms_foreign_or_unknown_tokens() {
    let env = spawn_env().await;
    let cookie = login_alice(&env).await;
    let code = get_code(&env, &cookie, "").await;
    let (_, tokens) = exchange(
        &env,
        format!(
            "grant_type=authorization_code&code={code}&redirect_uri={}",
            urlencoding::encode(REDIRECT_URI)
        ),
    )
    .await;
    let access = tokens["access_token"].as_str().unwrap().to_string();

    let introspect = |token: String, id: &'static str, secret: &'static str| {
        let app = env.app.clone();
        async move {
            let response = app
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/oauth/introspect")
                        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                        .header(header::AUTHORIZATION, basic_auth(id, secret))
                        .body(Body::from(format!("token={token}")))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            body_json(response).await
        }
    };

    let own = introspect(access.clone(), CLIENT_ID, CLIENT_SECRET).await;
    assert_eq!(own["active"], true);
    assert_eq!(own["token_type"], "access_token");

    // Another client asking about the same token learns nothing.
    let foreign = introspect(access.clone(), OTHER_TENANT_CLIENT, "beta-secret").await;
    assert_eq!(foreign["active"], false);
    assert!(foreign.get("client_id").is_none());

    let unknown = introspect("no-such-token".to_string(), CLIENT_ID, CLIENT_SECRET).await;
    assert_eq!(unknown["active"], false);
}

#[tokio::test]
async fn revocation_cascades_and_stays_silent() {
    let env = spawn_env().await;
    let cookie = login_alice(&env).await;
    let code = get_code(&env, &cookie, "").await;
    let (_, tokens) = exchange(
        &env,
        format!(
            "grant_type=authorization_code&code={code}&redirect_uri={}",
            urlencoding::encode(REDIRECT_URI)
        ),
    )
    .await;
    let access = tokens["access_token"].as_str().unwrap().to_string();
    let refresh = tokens["refresh_token"].as_str().unwrap().to_string();

    let revoke = |token: String| {
        let app = env.app.clone();
        async move {
            app.oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/oauth/revoke")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .header(header::AUTHORIZATION, basic_auth(CLIENT_ID, CLIENT_SECRET))
                    .body(Body::from(format!("token={token}")))
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
        }
    };

    assert_eq!(revoke(refresh.clone()).await, StatusCode::OK);
    assert!(env.state.tickets.validate_credential(&refresh).await.is_err());
    assert!(env.state.tickets.validate_credential(&access).await.is_err());

    // Unknown token: still 200, nothing leaked.
    assert_eq!(revoke("no-such-token".to_string()).await, StatusCode::OK);
}

#[tokio::test]
async fn unsupported_grant_type_is_reported_as_such() {
    let env = spawn_env().await;
    let (status, error) = exchange(&env, "grant_type=password".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "unsupported_grant_type");
}
