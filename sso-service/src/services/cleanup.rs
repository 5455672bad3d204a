//! Periodic sweep of expired artifacts, credentials and sessions.
//!
//! Storage hygiene only: authorization decisions re-validate expiry on
//! every use and never depend on this job having run.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::store::TicketStore;

pub struct CleanupJob {
    store: Arc<dyn TicketStore>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl CleanupJob {
    pub fn new(store: Arc<dyn TicketStore>, interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            store,
            interval,
            shutdown,
        }
    }

    /// Run the sweep loop until cancelled. An in-flight sweep finishes
    /// before the task exits.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // The first tick fires immediately; skip it so startup does not
            // race seeding.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        tracing::info!("Cleanup job shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        sweep(self.store.as_ref()).await;
                    }
                }
            }
        })
    }
}

/// One pass over all three tables. A failure on one table is logged and
/// must not abort the others.
pub async fn sweep(store: &dyn TicketStore) {
    let now = Utc::now();

    match store.purge_expired_artifacts(now).await {
        Ok(n) if n > 0 => tracing::info!(purged = n, "Purged expired artifacts"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to purge expired artifacts"),
    }
    match store.purge_expired_credentials(now).await {
        Ok(n) if n > 0 => tracing::info!(purged = n, "Purged expired credentials"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to purge expired credentials"),
    }
    match store.purge_expired_sessions(now).await {
        Ok(n) if n > 0 => tracing::info!(purged = n, "Purged expired sessions"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to purge expired sessions"),
    }
}
