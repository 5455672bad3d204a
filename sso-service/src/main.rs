use sso_service::{
    build_router,
    config::{Environment, SsoConfig},
    ldap::LdapServer,
    models::{Client, Group, Tenant, User},
    services::{CleanupJob, KeyManager, SessionTokenCodec, SingleLogoutQueue, TicketService},
    store::MemoryStore,
    AppState,
};

use service_core::observability::logging::init_tracing;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = SsoConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity provider"
    );

    let store = Arc::new(MemoryStore::new());
    if config.environment == Environment::Dev {
        seed_demo_data(&store)?;
    }

    let keys = Arc::new(KeyManager::new()?);
    tracing::info!(kid = %keys.active_kid(), "Signing key ready");

    let tickets = TicketService::new(store.clone());
    let session_codec = SessionTokenCodec::new(config.session.secret.as_bytes());

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| service_core::error::AppError::InternalError(anyhow::anyhow!(e)))?;

    let shutdown = CancellationToken::new();

    let (slo, slo_handle) = SingleLogoutQueue::start(config.cas.slo_enabled, http.clone());

    let cleanup_handle = CleanupJob::new(
        store.clone(),
        Duration::from_secs(config.cleanup.interval_secs),
        shutdown.clone(),
    )
    .spawn();

    let ldap_handle = if config.ldap.enabled {
        let server = LdapServer::new(config.ldap.clone(), store.clone());
        let (addr, handle) = server.listen(shutdown.clone()).await?;
        tracing::info!(%addr, "LDAP bridge started");
        Some(handle)
    } else {
        None
    };

    let state = AppState {
        config: config.clone(),
        directory: store.clone(),
        tickets,
        keys,
        session_codec,
        slo,
        http,
    };

    let app = build_router(state).await?;

    let addr = config.common.bind_addr();
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    service_core::axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // HTTP is down; stop the background workers and wait for them.
    shutdown.cancel();
    let _ = cleanup_handle.await;
    if let Some(handle) = ldap_handle {
        let _ = handle.await;
    }
    if let Some(handle) = slo_handle {
        handle.abort();
    }

    tracing::info!("Service shutdown complete");
    Ok(())
}

/// A small fixed directory so a dev instance is usable out of the box.
fn seed_demo_data(store: &MemoryStore) -> Result<(), service_core::error::AppError> {
    let hash = |pw: &str| {
        sso_service::utils::hash_password(pw).map_err(service_core::error::AppError::InternalError)
    };

    let tenant = Tenant::new("acme".to_string(), Some("acme.example".to_string()));

    let mut alice = User::new(tenant.tenant_id, "alice".to_string(), hash("password")?);
    alice.email = Some("alice@acme.example".to_string());
    alice.display_name = Some("Alice Anderson".to_string());

    let staff = Group::new(tenant.tenant_id, "staff".to_string());

    let mut client = Client::new(
        "demo-app".to_string(),
        hash("demo-secret")?,
        tenant.tenant_id,
    );
    client.redirect_uris = vec!["http://localhost:3000/callback".to_string()];
    client.root_url = Some("http://localhost:3000".to_string());
    client.allowed_scopes = vec![
        "openid".to_string(),
        "profile".to_string(),
        "email".to_string(),
        "groups".to_string(),
    ];

    store.add_membership(alice.user_id, staff.group_id);
    store.add_tenant(tenant);
    store.add_user(alice);
    store.add_group(staff);
    store.add_client(client);

    tracing::info!("Seeded demo tenant 'acme' with user 'alice'");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
