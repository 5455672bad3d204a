//! CAS proxy endpoint: exchange a proxy-granting ticket for a proxy
//! ticket targeting another registered service.

use serde::Deserialize;
use service_core::axum::{
    extract::{Query, State},
    response::Response,
};

use crate::handlers::cas::xml;
use crate::models::{ArtifactKind, CredentialKind};
use crate::services::tickets::url_origin;
use crate::services::ArtifactExtras;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub pgt: Option<String>,
    #[serde(rename = "targetService")]
    pub target_service: Option<String>,
}

pub async fn proxy(State(state): State<AppState>, Query(query): Query<ProxyQuery>) -> Response {
    let (Some(pgt), Some(target_service)) =
        (query.pgt.as_deref(), query.target_service.as_deref())
    else {
        return xml::xml_response(xml::proxy_failure(
            "INVALID_REQUEST",
            "pgt and targetService are required",
        ));
    };

    let credential = match state.tickets.validate_credential(pgt).await {
        Ok(c) if c.kind == CredentialKind::ProxyGranting => c,
        _ => {
            return xml::xml_response(xml::proxy_failure(
                "BAD_PGT",
                format!("Ticket {pgt} not recognized").as_str(),
            ))
        }
    };

    // The target must be a registered service of the same tenant as the
    // client the PGT descends from.
    let target_client = match url_origin(target_service) {
        Some(origin) => match state.directory.find_client_by_origin(&origin).await {
            Ok(Some(c)) if c.is_active() => c,
            Ok(_) => {
                return xml::xml_response(xml::proxy_failure(
                    "INVALID_REQUEST",
                    "targetService is not registered",
                ))
            }
            Err(e) => {
                tracing::error!(error = %e, "Target service lookup failed");
                return xml::xml_response(xml::proxy_failure(
                    "INTERNAL_ERROR",
                    "Temporary failure",
                ));
            }
        },
        None => {
            return xml::xml_response(xml::proxy_failure(
                "INVALID_REQUEST",
                "targetService is not a valid URL",
            ))
        }
    };

    let source_client = match state.directory.find_client(&credential.client_id).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            return xml::xml_response(xml::proxy_failure(
                "BAD_PGT",
                "Ticket is no longer usable",
            ))
        }
        Err(e) => {
            tracing::error!(error = %e, "Client lookup failed");
            return xml::xml_response(xml::proxy_failure("INTERNAL_ERROR", "Temporary failure"));
        }
    };
    if source_client.tenant_id != target_client.tenant_id {
        tracing::warn!(pgt_client = %source_client.client_id,
            target = %target_client.client_id, "Tenant mismatch at proxy");
        return xml::xml_response(xml::proxy_failure(
            "INVALID_REQUEST",
            "targetService is not reachable from this ticket",
        ));
    }

    let Some(user_id) = credential.user_id else {
        return xml::xml_response(xml::proxy_failure("BAD_PGT", "Ticket is no longer usable"));
    };

    let ticket = match state
        .tickets
        .issue_artifact(
            ArtifactKind::ProxyTicket,
            &target_client.client_id,
            user_id,
            target_service,
            vec![],
            state.config.cas.ticket_ttl_secs,
            ArtifactExtras {
                session_token: credential.session_token.clone(),
                proxies: credential.proxies.clone(),
                ..Default::default()
            },
        )
        .await
    {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(error = %e, "Failed to issue proxy ticket");
            return xml::xml_response(xml::proxy_failure("INTERNAL_ERROR", "Temporary failure"));
        }
    };

    xml::xml_response(xml::proxy_success(&ticket.token))
}
