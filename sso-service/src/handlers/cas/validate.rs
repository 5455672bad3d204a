//! CAS ticket validation endpoints (v1 plain text, v2/v3 XML).

use serde::Deserialize;
use service_core::axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};

use crate::handlers::cas::xml;
use crate::models::{Artifact, ArtifactKind, CredentialKind, User};
use crate::services::tickets::random_token;
use crate::services::{AudienceMatch, ServiceError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    pub service: Option<String>,
    pub ticket: Option<String>,
    #[serde(rename = "pgtUrl")]
    pub pgt_url: Option<String>,
}

/// CAS 1.0: plain text, always 200. `yes\n<user>\n` or `no\n`.
pub async fn validate_v1(
    State(state): State<AppState>,
    Query(query): Query<ValidateQuery>,
) -> Response {
    let body = match checked_validation(&state, &query, false).await {
        Ok((_, user, _)) => format!("yes\n{}\n", user.username),
        Err(_) => "no\n".to_string(),
    };
    ([(header::CONTENT_TYPE, "text/plain")], body).into_response()
}

/// CAS 2.0 serviceValidate: service tickets only, no attribute block.
pub async fn service_validate(
    State(state): State<AppState>,
    Query(query): Query<ValidateQuery>,
) -> Response {
    validate_ticket(&state, &query, false, false).await
}

/// CAS 3.0 serviceValidate: adds the `<cas:attributes>` block.
pub async fn p3_service_validate(
    State(state): State<AppState>,
    Query(query): Query<ValidateQuery>,
) -> Response {
    validate_ticket(&state, &query, false, true).await
}

/// proxyValidate: like serviceValidate but also accepts proxy tickets and
/// reports their callback chain.
pub async fn proxy_validate(
    State(state): State<AppState>,
    Query(query): Query<ValidateQuery>,
) -> Response {
    validate_ticket(&state, &query, true, true).await
}

struct ValidationFailure {
    code: &'static str,
    message: String,
}

impl ValidationFailure {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

async fn validate_ticket(
    state: &AppState,
    query: &ValidateQuery,
    accept_proxy: bool,
    include_attributes: bool,
) -> Response {
    let (artifact, user, groups) = match checked_validation(state, query, accept_proxy).await {
        Ok(ok) => ok,
        Err(failure) => return xml::xml_response(xml::validation_failure(failure.code, &failure.message)),
    };

    let pgt_iou = match query.pgt_url.as_deref() {
        Some(pgt_url) => issue_proxy_granting_ticket(state, &artifact, &user, pgt_url).await,
        None => None,
    };

    let attributes = if include_attributes {
        user_attributes(&user, &groups)
    } else {
        Vec::new()
    };

    let proxies = if artifact.kind == ArtifactKind::ProxyTicket {
        artifact.proxies.clone()
    } else {
        Vec::new()
    };

    xml::xml_response(xml::validation_success(
        &user.username,
        &attributes,
        pgt_iou.as_deref(),
        &proxies,
    ))
}

/// Consume and check a ticket: parameter presence, single use, audience,
/// kind and a live user. Shared by the v1 and XML endpoints.
async fn checked_validation(
    state: &AppState,
    query: &ValidateQuery,
    accept_proxy: bool,
) -> Result<(Artifact, User, Vec<String>), ValidationFailure> {
    let (Some(service), Some(ticket)) = (query.service.as_deref(), query.ticket.as_deref())
    else {
        return Err(ValidationFailure::new(
            "INVALID_REQUEST",
            "service and ticket are required",
        ));
    };

    let artifact = state
        .tickets
        .consume_artifact(ticket, service, AudienceMatch::Origin)
        .await
        .map_err(|e| match e {
            ServiceError::ArtifactExpired => {
                ValidationFailure::new("INVALID_TICKET", format!("Ticket {ticket} has expired"))
            }
            ServiceError::ArtifactReplayed => ValidationFailure::new(
                "INVALID_TICKET",
                format!("Ticket {ticket} not recognized"),
            ),
            ServiceError::AudienceMismatch => ValidationFailure::new(
                "INVALID_SERVICE",
                format!("Ticket {ticket} was not issued to {service}"),
            ),
            other => {
                tracing::error!(error = %other, "Ticket validation failed");
                ValidationFailure::new("INTERNAL_ERROR", "Temporary failure")
            }
        })?;

    let kind_ok = match artifact.kind {
        ArtifactKind::ServiceTicket => true,
        ArtifactKind::ProxyTicket => accept_proxy,
        ArtifactKind::OidcCode => false,
    };
    if !kind_ok {
        return Err(ValidationFailure::new(
            "INVALID_TICKET",
            format!("Ticket {ticket} is not valid here"),
        ));
    }

    let user = match state.directory.find_user_by_id(artifact.user_id).await {
        Ok(Some(u)) if u.is_active() => u,
        Ok(_) => {
            return Err(ValidationFailure::new(
                "INVALID_TICKET",
                "User is no longer available",
            ))
        }
        Err(e) => {
            tracing::error!(error = %e, "User lookup failed during validation");
            return Err(ValidationFailure::new("INTERNAL_ERROR", "Temporary failure"));
        }
    };

    let groups = match state.directory.groups_for_user(user.user_id).await {
        Ok(groups) => groups.into_iter().map(|g| g.name).collect(),
        Err(e) => {
            tracing::error!(error = %e, "Group lookup failed during validation");
            return Err(ValidationFailure::new("INTERNAL_ERROR", "Temporary failure"));
        }
    };

    Ok((artifact, user, groups))
}

/// Mint a PGT for the validating service's callback. The pgtIou is only
/// disclosed after the callback acknowledged receipt of the pgtId; a
/// failed callback voids the PGT and validation proceeds without one.
async fn issue_proxy_granting_ticket(
    state: &AppState,
    artifact: &Artifact,
    user: &User,
    pgt_url: &str,
) -> Option<String> {
    if crate::services::tickets::url_origin(pgt_url).is_none() {
        tracing::warn!(pgt_url = %pgt_url, "Rejecting unparseable proxy callback URL");
        return None;
    }

    let mut proxies = vec![pgt_url.to_string()];
    proxies.extend(artifact.proxies.iter().cloned());

    let pgt = match state
        .tickets
        .issue_credential(
            CredentialKind::ProxyGranting,
            &artifact.client_id,
            Some(user.user_id),
            vec![],
            state.config.cas.pgt_ttl_secs,
            None,
            Some(pgt_url.to_string()),
            proxies,
            artifact.session_token.clone(),
        )
        .await
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to mint proxy-granting ticket");
            return None;
        }
    };

    let iou = random_token("PGTIOU-");
    let callback = crate::handlers::oidc::append_params(
        pgt_url,
        &[("pgtId", pgt.token.as_str()), ("pgtIou", iou.as_str())],
    );

    let delivered = match state.http.get(&callback).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(e) => {
            tracing::warn!(pgt_url = %pgt_url, error = %e, "Proxy callback failed");
            false
        }
    };

    if delivered {
        Some(iou)
    } else {
        if let Err(e) = state.tickets.store().delete_credential(&pgt.token).await {
            tracing::error!(error = %e, "Failed to discard undelivered PGT");
        }
        None
    }
}

fn user_attributes(user: &User, groups: &[String]) -> Vec<(String, String)> {
    let mut attributes = vec![("username".to_string(), user.username.clone())];
    if let Some(email) = &user.email {
        attributes.push(("email".to_string(), email.clone()));
    }
    if let Some(name) = &user.display_name {
        attributes.push(("displayName".to_string(), name.clone()));
    }
    for group in groups {
        attributes.push(("memberOf".to_string(), group.clone()));
    }
    attributes
}
