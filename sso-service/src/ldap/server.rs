//! LDAP directory bridge: bind and search over TCP, mapped straight onto
//! the credential store. Read/auth only, no directory writes.

use futures::{SinkExt, StreamExt};
use ldap3_proto::simple::*;
use ldap3_proto::LdapCodec;
use std::net::SocketAddr;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::config::LdapConfig;
use crate::ldap::dn;
use crate::models::User;
use crate::store::DirectoryStore;
use service_core::error::AppError;

pub struct LdapServer {
    bridge: Arc<Bridge>,
}

struct Bridge {
    config: LdapConfig,
    directory: Arc<dyn DirectoryStore>,
}

/// What a connection has proven about itself.
enum BoundAs {
    Anonymous,
    Admin,
    User(User),
}

impl LdapServer {
    pub fn new(config: LdapConfig, directory: Arc<dyn DirectoryStore>) -> Self {
        Self {
            bridge: Arc::new(Bridge { config, directory }),
        }
    }

    /// Bind the listener and run the accept loop until cancelled. Returns
    /// the bound address so callers (and tests) can use an ephemeral port.
    pub async fn listen(
        self,
        shutdown: CancellationToken,
    ) -> Result<(SocketAddr, JoinHandle<()>), AppError> {
        let listener = TcpListener::bind(("0.0.0.0", self.bridge.config.port))
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("LDAP bind failed: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;
        tracing::info!(%addr, "LDAP bridge listening");

        let bridge = self.bridge;
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("LDAP bridge shutting down");
                        break;
                    }
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((socket, peer)) => {
                                tracing::debug!(%peer, "LDAP connection accepted");
                                let bridge = bridge.clone();
                                tokio::spawn(handle_connection(socket, bridge));
                            }
                            Err(e) => tracing::warn!(error = %e, "LDAP accept failed"),
                        }
                    }
                }
            }
        });

        Ok((addr, handle))
    }
}

async fn handle_connection(socket: TcpStream, bridge: Arc<Bridge>) {
    let (read, write) = tokio::io::split(socket);
    let mut requests = FramedRead::new(read, LdapCodec::default());
    let mut responses = FramedWrite::new(write, LdapCodec::default());

    let mut bound = BoundAs::Anonymous;

    while let Some(msg) = requests.next().await {
        let op = match msg.map_err(|_| ()).and_then(ServerOps::try_from) {
            Ok(op) => op,
            Err(_) => {
                let _ = responses
                    .send(DisconnectionNotice::gen(
                        LdapResultCode::ProtocolError,
                        "Malformed request",
                    ))
                    .await;
                let _ = responses.flush().await;
                return;
            }
        };

        let replies = match op {
            ServerOps::SimpleBind(req) => vec![do_bind(&bridge, &mut bound, &req).await],
            ServerOps::Search(req) => do_search(&bridge, &bound, &req).await,
            ServerOps::Whoami(req) => vec![do_whoami(&bound, &req)],
            ServerOps::Compare(req) => vec![req.gen_error(
                LdapResultCode::UnwillingToPerform,
                "Compare is not supported".to_string(),
            )],
            ServerOps::Unbind(_) => return,
        };

        for reply in replies {
            if responses.send(reply).await.is_err() {
                return;
            }
        }
        if responses.flush().await.is_err() {
            return;
        }
    }
}

/// Simple bind: the configured admin DN, a user DN, or anonymous.
///
/// Every parse, lookup or credential failure collapses into the same
/// invalidCredentials result.
async fn do_bind(bridge: &Bridge, bound: &mut BoundAs, req: &SimpleBindRequest) -> LdapMsg {
    if req.dn.is_empty() && req.pw.is_empty() {
        *bound = BoundAs::Anonymous;
        return req.gen_success();
    }

    if req.dn.eq_ignore_ascii_case(&bridge.config.admin_dn) {
        let ok: bool = req
            .pw
            .as_bytes()
            .ct_eq(bridge.config.admin_password.as_bytes())
            .into();
        if ok {
            *bound = BoundAs::Admin;
            return req.gen_success();
        }
        tracing::warn!("LDAP admin bind rejected");
        return req.gen_invalid_cred();
    }

    match authenticate_user(bridge, &req.dn, &req.pw).await {
        Some(user) => {
            tracing::info!(user = %user.username, "LDAP user bind");
            *bound = BoundAs::User(user);
            req.gen_success()
        }
        None => req.gen_invalid_cred(),
    }
}

async fn authenticate_user(bridge: &Bridge, bind_dn: &str, password: &str) -> Option<User> {
    let (tenant_name, username) = dn::parse_user_dn(bind_dn, &bridge.config.base_dn)?;
    let tenant = bridge
        .directory
        .find_tenant_by_name(&tenant_name)
        .await
        .ok()
        .flatten()
        .filter(|t| t.is_active())?;
    let user = bridge
        .directory
        .find_user(tenant.tenant_id, &username)
        .await
        .ok()
        .flatten()
        .filter(|u| u.is_active())?;
    crate::utils::verify_password(password, &user.password_hash).ok()?;
    Some(user)
}

/// Which user entries a filter selects.
enum FilterTarget {
    All,
    Uid(String),
    Cn(String),
    Mail(String),
}

async fn do_search(bridge: &Bridge, bound: &BoundAs, req: &SearchRequest) -> Vec<LdapMsg> {
    if matches!(bound, BoundAs::Anonymous) {
        return vec![req.gen_error(
            LdapResultCode::UnwillingToPerform,
            "Anonymous search is not permitted".to_string(),
        )];
    }

    // Unknown tenants and unrecognized filters both yield an empty
    // success; legacy directory clients treat errors here as outages.
    let Some(tenant_name) = dn::tenant_from_base(&req.base) else {
        return vec![req.gen_success()];
    };
    let tenant = match bridge.directory.find_tenant_by_name(&tenant_name).await {
        Ok(Some(t)) if t.is_active() => t,
        Ok(_) => return vec![req.gen_success()],
        Err(e) => {
            tracing::error!(error = %e, "LDAP tenant lookup failed");
            return vec![req.gen_error(
                LdapResultCode::OperationsError,
                "Temporary failure".to_string(),
            )];
        }
    };

    let Some(target) = recognize_filter(&req.filter) else {
        tracing::debug!(filter = ?req.filter, "Unrecognized LDAP filter");
        return vec![req.gen_success()];
    };

    let users = match bridge.directory.list_users(tenant.tenant_id).await {
        Ok(users) => users,
        Err(e) => {
            tracing::error!(error = %e, "LDAP user listing failed");
            return vec![req.gen_error(
                LdapResultCode::OperationsError,
                "Temporary failure".to_string(),
            )];
        }
    };

    let mut replies = Vec::new();
    for user in users.into_iter().filter(|u| u.is_active()) {
        if !matches_target(&user, &target) {
            continue;
        }
        let groups = match bridge.directory.groups_for_user(user.user_id).await {
            Ok(groups) => groups.into_iter().map(|g| g.name).collect::<Vec<_>>(),
            Err(e) => {
                tracing::error!(error = %e, "LDAP group lookup failed");
                Vec::new()
            }
        };
        replies.push(req.gen_result_entry(user_entry(bridge, &user, &tenant.name, &groups)));
    }
    replies.push(req.gen_success());
    replies
}

/// Map a filter to the user set it selects. `(objectClass=*)`, equality on
/// uid/cn/mail, and a single-level And unwrap taking its first recognized
/// member are supported; anything else is None.
fn recognize_filter(filter: &LdapFilter) -> Option<FilterTarget> {
    match filter {
        LdapFilter::Present(attr) if attr.eq_ignore_ascii_case("objectClass") => {
            Some(FilterTarget::All)
        }
        LdapFilter::Equality(attr, value) => {
            let value = value.clone();
            if attr.eq_ignore_ascii_case("objectClass") {
                Some(FilterTarget::All)
            } else if attr.eq_ignore_ascii_case("uid") {
                Some(FilterTarget::Uid(value))
            } else if attr.eq_ignore_ascii_case("cn") {
                Some(FilterTarget::Cn(value))
            } else if attr.eq_ignore_ascii_case("mail") {
                Some(FilterTarget::Mail(value))
            } else {
                None
            }
        }
        LdapFilter::And(members) => members.iter().find_map(|m| match m {
            LdapFilter::And(_) => None,
            other => recognize_filter(other),
        }),
        _ => None,
    }
}

fn matches_target(user: &User, target: &FilterTarget) -> bool {
    match target {
        FilterTarget::All => true,
        FilterTarget::Uid(uid) => user.username.eq_ignore_ascii_case(uid),
        FilterTarget::Cn(cn) => {
            user.preferred_name().eq_ignore_ascii_case(cn)
                || user.username.eq_ignore_ascii_case(cn)
        }
        FilterTarget::Mail(mail) => user
            .email
            .as_deref()
            .is_some_and(|e| e.eq_ignore_ascii_case(mail)),
    }
}

/// inetOrgPerson-shaped entry with a memberOf back-reference.
fn user_entry(
    bridge: &Bridge,
    user: &User,
    tenant: &str,
    groups: &[String],
) -> LdapSearchResultEntry {
    let text =
        |s: &str| -> Vec<u8> { s.as_bytes().to_vec() };

    let mut attributes = vec![
        LdapPartialAttribute {
            atype: "objectClass".to_string(),
            vals: vec![
                text("top"),
                text("person"),
                text("organizationalPerson"),
                text("inetOrgPerson"),
            ],
        },
        LdapPartialAttribute {
            atype: "uid".to_string(),
            vals: vec![text(&user.username)],
        },
        LdapPartialAttribute {
            atype: "cn".to_string(),
            vals: vec![text(user.preferred_name())],
        },
        LdapPartialAttribute {
            atype: "sn".to_string(),
            vals: vec![text(user.preferred_name())],
        },
    ];
    if let Some(email) = &user.email {
        attributes.push(LdapPartialAttribute {
            atype: "mail".to_string(),
            vals: vec![text(email)],
        });
    }
    if let Some(phone) = &user.phone {
        attributes.push(LdapPartialAttribute {
            atype: "telephoneNumber".to_string(),
            vals: vec![text(phone)],
        });
    }
    if !groups.is_empty() {
        attributes.push(LdapPartialAttribute {
            atype: "memberOf".to_string(),
            vals: groups
                .iter()
                .map(|g| text(&dn::group_dn(g, tenant, &bridge.config.base_dn)))
                .collect(),
        });
    }

    LdapSearchResultEntry {
        dn: dn::user_dn(&user.username, tenant, &bridge.config.base_dn),
        attributes,
    }
}

fn do_whoami(bound: &BoundAs, req: &WhoamiRequest) -> LdapMsg {
    let identity = match bound {
        BoundAs::Anonymous => String::new(),
        BoundAs::Admin => "dn: admin".to_string(),
        BoundAs::User(user) => format!("dn: uid={}", user.username),
    };
    req.gen_success(&identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_the_supported_filters() {
        assert!(matches!(
            recognize_filter(&LdapFilter::Present("objectClass".into())),
            Some(FilterTarget::All)
        ));
        assert!(matches!(
            recognize_filter(&LdapFilter::Equality("uid".into(), "alice".into())),
            Some(FilterTarget::Uid(_))
        ));
        assert!(matches!(
            recognize_filter(&LdapFilter::Equality("MAIL".into(), "a@b".into())),
            Some(FilterTarget::Mail(_))
        ));
        assert!(recognize_filter(&LdapFilter::Present("uid".into())).is_none());
    }

    #[test]
    fn and_wrapper_takes_the_first_recognized_member() {
        let filter = LdapFilter::And(vec![
            LdapFilter::Equality("objectClass".into(), "inetOrgPerson".into()),
            LdapFilter::Equality("uid".into(), "alice".into()),
        ]);
        assert!(matches!(recognize_filter(&filter), Some(FilterTarget::All)));

        let filter = LdapFilter::And(vec![
            LdapFilter::Present("telephoneNumber".into()),
            LdapFilter::Equality("cn".into(), "Alice".into()),
        ]);
        assert!(matches!(recognize_filter(&filter), Some(FilterTarget::Cn(_))));
    }

    #[test]
    fn nested_and_is_not_unwrapped() {
        let filter = LdapFilter::And(vec![LdapFilter::And(vec![LdapFilter::Equality(
            "uid".into(),
            "alice".into(),
        )])]);
        assert!(recognize_filter(&filter).is_none());
    }
}
