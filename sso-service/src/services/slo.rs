//! Single-logout notification queue.
//!
//! Best-effort, fire-and-forget: logout responses never wait on it, and
//! delivery failures are observability-only. Bounded so a slow relying
//! party cannot pile up memory.

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

const QUEUE_DEPTH: usize = 64;

/// One notification: tell `service_url` that `ticket` is dead.
#[derive(Debug, Clone)]
pub struct SloNotice {
    pub service_url: String,
    pub ticket: String,
}

#[derive(Clone)]
pub struct SingleLogoutQueue {
    tx: Option<mpsc::Sender<SloNotice>>,
}

impl SingleLogoutQueue {
    /// Start the delivery worker. When disabled, notices are dropped at the
    /// enqueue site and no worker runs.
    pub fn start(enabled: bool, http: reqwest::Client) -> (Self, Option<JoinHandle<()>>) {
        if !enabled {
            return (Self { tx: None }, None);
        }
        let (tx, mut rx) = mpsc::channel::<SloNotice>(QUEUE_DEPTH);
        let handle = tokio::spawn(async move {
            while let Some(notice) = rx.recv().await {
                deliver(&http, &notice).await;
            }
            tracing::info!("Single-logout worker shutting down");
        });
        (Self { tx: Some(tx) }, Some(handle))
    }

    /// Enqueue without blocking. A full queue drops the notice with a
    /// warning; single logout is best-effort by contract.
    pub fn notify(&self, notice: SloNotice) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(notice) {
            tracing::warn!(error = %e, "Dropping single-logout notice");
        }
    }
}

async fn deliver(http: &reqwest::Client, notice: &SloNotice) {
    let body = logout_request_xml(&notice.ticket);
    let result = http
        .post(&notice.service_url)
        .form(&[("logoutRequest", body.as_str())])
        .send()
        .await;
    match result {
        Ok(resp) if resp.status().is_success() => {
            tracing::debug!(service = %notice.service_url, "Delivered single-logout notice");
        }
        Ok(resp) => {
            tracing::warn!(service = %notice.service_url, status = %resp.status(),
                "Single-logout notice rejected");
        }
        Err(e) => {
            tracing::warn!(service = %notice.service_url, error = %e,
                "Single-logout notice failed");
        }
    }
}

/// SAML LogoutRequest body carried in the `logoutRequest` form field, as
/// CAS clients expect.
fn logout_request_xml(ticket: &str) -> String {
    format!(
        concat!(
            "<samlp:LogoutRequest xmlns:samlp=\"urn:oasis:names:tc:SAML:2.0:protocol\" ",
            "ID=\"{id}\" Version=\"2.0\" IssueInstant=\"{instant}\">",
            "<saml:NameID xmlns:saml=\"urn:oasis:names:tc:SAML:2.0:assertion\">@NOT_USED@</saml:NameID>",
            "<samlp:SessionIndex>{ticket}</samlp:SessionIndex>",
            "</samlp:LogoutRequest>"
        ),
        id = Uuid::new_v4(),
        instant = Utc::now().to_rfc3339(),
        ticket = crate::handlers::cas::xml::escape(ticket),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logout_request_carries_the_ticket() {
        let xml = logout_request_xml("ST-abc123");
        assert!(xml.contains("<samlp:SessionIndex>ST-abc123</samlp:SessionIndex>"));
        assert!(xml.contains("LogoutRequest"));
    }

    #[tokio::test]
    async fn disabled_queue_drops_silently() {
        let (queue, handle) = SingleLogoutQueue::start(false, reqwest::Client::new());
        assert!(handle.is_none());
        queue.notify(SloNotice {
            service_url: "https://app.example/cb".into(),
            ticket: "ST-x".into(),
        });
    }
}
