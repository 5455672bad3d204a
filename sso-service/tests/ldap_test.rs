//! LDAP bridge tests: a real ldap3 client against the server on an
//! ephemeral port.

mod common;

use ldap3::{LdapConnAsync, Scope, SearchEntry};
use sso_service::config::LdapConfig;
use sso_service::ldap::LdapServer;
use tokio_util::sync::CancellationToken;

const BASE_DN: &str = "dc=sso,dc=local";
const ADMIN_DN: &str = "cn=admin,dc=sso,dc=local";
const ADMIN_PW: &str = "admin-secret";

async fn spawn_bridge() -> (std::net::SocketAddr, CancellationToken) {
    let (store, _alice) = common::seeded_store();
    let config = LdapConfig {
        enabled: true,
        port: 0,
        base_dn: BASE_DN.to_string(),
        admin_dn: ADMIN_DN.to_string(),
        admin_password: ADMIN_PW.to_string(),
    };
    let shutdown = CancellationToken::new();
    let (addr, _handle) = LdapServer::new(config, store)
        .listen(shutdown.clone())
        .await
        .unwrap();
    (addr, shutdown)
}

async fn connect(addr: std::net::SocketAddr) -> ldap3::Ldap {
    let (conn, ldap) = LdapConnAsync::new(&format!("ldap://127.0.0.1:{}", addr.port()))
        .await
        .unwrap();
    ldap3::drive!(conn);
    ldap
}

#[tokio::test]
async fn user_bind_succeeds_with_correct_credentials() {
    let (addr, _shutdown) = spawn_bridge().await;
    let mut ldap = connect(addr).await;

    let result = ldap
        .simple_bind("uid=alice,ou=users,o=acme,dc=sso,dc=local", "password123")
        .await
        .unwrap();
    assert_eq!(result.rc, 0, "bind should succeed: {result:?}");
    let _ = ldap.unbind().await;
}

#[tokio::test]
async fn bad_credentials_and_bad_dns_fail_uniformly() {
    let (addr, _shutdown) = spawn_bridge().await;

    // invalidCredentials is 49.
    for (dn, pw) in [
        ("uid=alice,ou=users,o=acme,dc=sso,dc=local", "wrong"),
        ("uid=ghost,ou=users,o=acme,dc=sso,dc=local", "password123"),
        ("uid=alice,ou=users,o=nowhere,dc=sso,dc=local", "password123"),
        ("cn=alice,dc=sso,dc=local", "password123"),
    ] {
        let mut ldap = connect(addr).await;
        let result = ldap.simple_bind(dn, pw).await.unwrap();
        assert_eq!(result.rc, 49, "dn {dn} should be rejected: {result:?}");
        let _ = ldap.unbind().await;
    }
}

#[tokio::test]
async fn admin_search_returns_inet_org_person_entries() {
    let (addr, _shutdown) = spawn_bridge().await;
    let mut ldap = connect(addr).await;

    ldap.simple_bind(ADMIN_DN, ADMIN_PW).await.unwrap().success().unwrap();

    let (entries, _res) = ldap
        .search(
            "ou=users,o=acme,dc=sso,dc=local",
            Scope::Subtree,
            "(uid=alice)",
            vec!["*"],
        )
        .await
        .unwrap()
        .success()
        .unwrap();
    assert_eq!(entries.len(), 1);

    let entry = SearchEntry::construct(entries.into_iter().next().unwrap());
    assert_eq!(entry.dn, "uid=alice,ou=users,o=acme,dc=sso,dc=local");
    assert_eq!(entry.attrs["uid"], vec!["alice".to_string()]);
    assert_eq!(entry.attrs["mail"], vec!["alice@acme.example".to_string()]);
    assert!(entry.attrs["objectClass"].contains(&"inetOrgPerson".to_string()));
    assert_eq!(
        entry.attrs["memberOf"],
        vec!["cn=staff,ou=groups,o=acme,dc=sso,dc=local".to_string()]
    );

    let _ = ldap.unbind().await;
}

#[tokio::test]
async fn objectclass_present_filter_lists_the_tenant() {
    let (addr, _shutdown) = spawn_bridge().await;
    let mut ldap = connect(addr).await;

    ldap.simple_bind(ADMIN_DN, ADMIN_PW).await.unwrap().success().unwrap();

    let (entries, _res) = ldap
        .search(
            "o=acme,dc=sso,dc=local",
            Scope::Subtree,
            "(objectClass=*)",
            vec!["uid"],
        )
        .await
        .unwrap()
        .success()
        .unwrap();
    // Only acme's user; bob belongs to tenant beta.
    assert_eq!(entries.len(), 1);

    let _ = ldap.unbind().await;
}

#[tokio::test]
async fn unrecognized_filters_fail_open_as_empty_success() {
    let (addr, _shutdown) = spawn_bridge().await;
    let mut ldap = connect(addr).await;

    ldap.simple_bind(ADMIN_DN, ADMIN_PW).await.unwrap().success().unwrap();

    let (entries, _res) = ldap
        .search(
            "o=acme,dc=sso,dc=local",
            Scope::Subtree,
            "(telephoneNumber=555)",
            vec!["uid"],
        )
        .await
        .unwrap()
        .success()
        .unwrap();
    assert!(entries.is_empty());

    let _ = ldap.unbind().await;
}

#[tokio::test]
async fn anonymous_search_is_refused() {
    let (addr, _shutdown) = spawn_bridge().await;
    let mut ldap = connect(addr).await;

    // Anonymous bind itself is accepted.
    ldap.simple_bind("", "").await.unwrap().success().unwrap();

    let outcome = ldap
        .search(
            "o=acme,dc=sso,dc=local",
            Scope::Subtree,
            "(uid=alice)",
            vec!["*"],
        )
        .await
        .unwrap()
        .success();
    assert!(outcome.is_err(), "anonymous search must not succeed");

    let _ = ldap.unbind().await;
}

#[tokio::test]
async fn user_bind_can_search_their_own_tenant() {
    let (addr, _shutdown) = spawn_bridge().await;
    let mut ldap = connect(addr).await;

    ldap.simple_bind("uid=alice,ou=users,o=acme,dc=sso,dc=local", "password123")
        .await
        .unwrap()
        .success()
        .unwrap();

    let (entries, _res) = ldap
        .search(
            "o=acme,dc=sso,dc=local",
            Scope::Subtree,
            "(cn=Alice Anderson)",
            vec!["uid"],
        )
        .await
        .unwrap()
        .success()
        .unwrap();
    assert_eq!(entries.len(), 1);

    let _ = ldap.unbind().await;
}
