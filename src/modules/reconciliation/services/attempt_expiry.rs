use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info};

use crate::core::Result;
use crate::modules::reconciliation::repositories::AttemptRepository;

/// Background job that expires payment attempts nobody came back for
///
/// An expired attempt is no longer reused for new checkouts; a late callback
/// for it is still reconciled against the gateway.
pub struct AttemptExpirySweeper {
    attempts: Arc<dyn AttemptRepository>,
    period: Duration,
}

impl AttemptExpirySweeper {
    pub fn new(attempts: Arc<dyn AttemptRepository>, period: Duration) -> Self {
        Self { attempts, period }
    }

    /// Run forever; spawn this as a tokio task from main
    pub async fn start(self: Arc<Self>) {
        info!(period_secs = self.period.as_secs(), "Starting payment attempt expiry sweep");

        let mut ticker = interval(self.period);

        loop {
            ticker.tick().await;

            match self.sweep_once().await {
                Ok(expired) if expired > 0 => {
                    info!(expired = expired, "Expired stale payment attempts");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Error expiring payment attempts");
                }
            }
        }
    }

    pub async fn sweep_once(&self) -> Result<u64> {
        self.attempts.expire_stale(Utc::now()).await
    }
}
