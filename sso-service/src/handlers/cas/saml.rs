//! SAML 1.1 validation endpoint (/cas/samlValidate).
//!
//! Accepts a SOAP-wrapped samlp:Request carrying an AssertionArtifact
//! (a service ticket) and answers with a SOAP-wrapped SAML 1.1 Response.
//! The artifact is pulled out of the body by element scan rather than a
//! full XML parse; clients place it in exactly one well-known element.

use chrono::{Duration, Utc};
use serde::Deserialize;
use service_core::axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::handlers::cas::xml::escape;
use crate::models::{ArtifactKind, User};
use crate::services::AudienceMatch;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SamlValidateQuery {
    #[serde(rename = "TARGET")]
    pub target: Option<String>,
}

pub async fn saml_validate(
    State(state): State<AppState>,
    Query(query): Query<SamlValidateQuery>,
    body: String,
) -> Response {
    let Some(target) = query.target.as_deref() else {
        return soap_response(denied_response("TARGET parameter is required"));
    };
    let Some(ticket) = extract_assertion_artifact(&body) else {
        return soap_response(denied_response("No AssertionArtifact in request"));
    };

    let artifact = match state
        .tickets
        .consume_artifact(&ticket, target, AudienceMatch::Origin)
        .await
    {
        Ok(a) if a.kind == ArtifactKind::ServiceTicket => a,
        Ok(_) => return soap_response(denied_response("Artifact is not a service ticket")),
        Err(e) if e.is_artifact_error() => {
            return soap_response(denied_response("Artifact is invalid or expired"))
        }
        Err(e) => {
            tracing::error!(error = %e, "SAML validation failed");
            return soap_response(denied_response("Temporary failure"));
        }
    };

    let user = match state.directory.find_user_by_id(artifact.user_id).await {
        Ok(Some(u)) if u.is_active() => u,
        Ok(_) => return soap_response(denied_response("User is no longer available")),
        Err(e) => {
            tracing::error!(error = %e, "User lookup failed during SAML validation");
            return soap_response(denied_response("Temporary failure"));
        }
    };

    let groups = match state.directory.groups_for_user(user.user_id).await {
        Ok(groups) => groups.into_iter().map(|g| g.name).collect::<Vec<_>>(),
        Err(e) => {
            tracing::error!(error = %e, "Group lookup failed during SAML validation");
            return soap_response(denied_response("Temporary failure"));
        }
    };

    let issuer = state.config.issuer.trim_end_matches('/');
    soap_response(success_response(issuer, target, &user, &groups))
}

/// Text content of the first AssertionArtifact element, any namespace
/// prefix.
fn extract_assertion_artifact(body: &str) -> Option<String> {
    let start_tag = body.find("AssertionArtifact")?;
    let content_start = body[start_tag..].find('>')? + start_tag + 1;
    let content_end = body[content_start..].find("</")? + content_start;
    let artifact = body[content_start..content_end].trim();
    if artifact.is_empty() {
        None
    } else {
        Some(artifact.to_string())
    }
}

fn soap_response(body: String) -> Response {
    (
        [(header::CONTENT_TYPE, "text/xml")],
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <SOAP-ENV:Envelope xmlns:SOAP-ENV=\"http://schemas.xmlsoap.org/soap/envelope/\">\
             <SOAP-ENV:Header/><SOAP-ENV:Body>{body}</SOAP-ENV:Body></SOAP-ENV:Envelope>"
        ),
    )
        .into_response()
}

fn denied_response(message: &str) -> String {
    format!(
        "<Response xmlns=\"urn:oasis:names:tc:SAML:1.0:protocol\" \
         xmlns:samlp=\"urn:oasis:names:tc:SAML:1.0:protocol\" \
         IssueInstant=\"{instant}\" MajorVersion=\"1\" MinorVersion=\"1\" \
         ResponseID=\"_{id}\">\
         <Status><StatusCode Value=\"samlp:RequestDenied\"/>\
         <StatusMessage>{message}</StatusMessage></Status></Response>",
        instant = Utc::now().to_rfc3339(),
        id = Uuid::new_v4().simple(),
        message = escape(message)
    )
}

fn success_response(issuer: &str, target: &str, user: &User, groups: &[String]) -> String {
    let now = Utc::now();
    let not_on_or_after = now + Duration::seconds(60);
    let subject = format!(
        "<Subject><NameIdentifier>{username}</NameIdentifier>\
         <SubjectConfirmation><ConfirmationMethod>\
         urn:oasis:names:tc:SAML:1.0:cm:artifact\
         </ConfirmationMethod></SubjectConfirmation></Subject>",
        username = escape(&user.username)
    );

    let mut attributes = String::new();
    if let Some(email) = &user.email {
        attributes.push_str(&attribute("email", &[email.clone()]));
    }
    if let Some(name) = &user.display_name {
        attributes.push_str(&attribute("displayName", &[name.clone()]));
    }
    if !groups.is_empty() {
        attributes.push_str(&attribute("memberOf", groups));
    }

    format!(
        "<Response xmlns=\"urn:oasis:names:tc:SAML:1.0:protocol\" \
         xmlns:samlp=\"urn:oasis:names:tc:SAML:1.0:protocol\" \
         IssueInstant=\"{instant}\" MajorVersion=\"1\" MinorVersion=\"1\" \
         ResponseID=\"_{response_id}\">\
         <Status><StatusCode Value=\"samlp:Success\"/></Status>\
         <Assertion xmlns=\"urn:oasis:names:tc:SAML:1.0:assertion\" \
         AssertionID=\"_{assertion_id}\" IssueInstant=\"{instant}\" \
         Issuer=\"{issuer}\" MajorVersion=\"1\" MinorVersion=\"1\">\
         <Conditions NotBefore=\"{instant}\" NotOnOrAfter=\"{not_after}\">\
         <AudienceRestrictionCondition><Audience>{target}</Audience>\
         </AudienceRestrictionCondition></Conditions>\
         <AuthenticationStatement AuthenticationInstant=\"{instant}\" \
         AuthenticationMethod=\"urn:oasis:names:tc:SAML:1.0:am:password\">\
         {subject}</AuthenticationStatement>\
         <AttributeStatement>{subject}{attributes}</AttributeStatement>\
         </Assertion></Response>",
        instant = now.to_rfc3339(),
        not_after = not_on_or_after.to_rfc3339(),
        response_id = Uuid::new_v4().simple(),
        assertion_id = Uuid::new_v4().simple(),
        issuer = escape(issuer),
        target = escape(target),
        subject = subject,
        attributes = attributes,
    )
}

fn attribute(name: &str, values: &[String]) -> String {
    let values = values
        .iter()
        .map(|v| format!("<AttributeValue>{}</AttributeValue>", escape(v)))
        .collect::<String>();
    format!(
        "<Attribute AttributeName=\"{name}\" \
         AttributeNamespace=\"http://www.ja-sig.org/products/cas/\">{values}</Attribute>"
    )
}
