use std::time::Duration;

use tokio::sync::Mutex;

use crate::{
    domain::{ChatId, UserId},
    messaging::port::MessagingPort,
    store::Store,
    Result,
};

/// One fan-out run over a recipient snapshot.
#[derive(Clone, Debug)]
pub struct BroadcastJob {
    pub recipients: Vec<UserId>,
    pub html: String,
}

impl BroadcastJob {
    /// Snapshot every non-banned profile, in store order.
    pub async fn for_all_users(store: &dyn Store, html: String) -> Result<Self> {
        let recipients = store
            .scan_profiles()
            .await?
            .into_iter()
            .filter(|p| !p.banned)
            .map(|p| p.id)
            .collect();
        Ok(Self { recipients, html })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
}

/// Sequential, paced fan-out.
///
/// Jobs are serialized: a second job waits for the running one to finish, so
/// the inter-send delay actually paces the platform calls.
pub struct BroadcastEngine {
    throttle: Duration,
    job_lock: Mutex<()>,
}

impl BroadcastEngine {
    pub fn new(throttle: Duration) -> Self {
        Self {
            throttle,
            job_lock: Mutex::new(()),
        }
    }

    /// Deliver `job.html` to every recipient. Per-recipient failures are
    /// counted, never abort the job.
    pub async fn run(&self, messenger: &dyn MessagingPort, job: BroadcastJob) -> BroadcastReport {
        let _guard = self.job_lock.lock().await;
        let mut report = BroadcastReport::default();
        let total = job.recipients.len();

        tracing::info!(recipients = total, "broadcast started");
        for (idx, user) in job.recipients.iter().enumerate() {
            match messenger.send_html(ChatId::from(*user), &job.html).await {
                Ok(_) => report.sent += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::debug!(user_id = user.0, "broadcast delivery failed: {e}");
                }
            }
            if idx + 1 < total && !self.throttle.is_zero() {
                tokio::time::sleep(self.throttle).await;
            }
        }
        tracing::info!(sent = report.sent, failed = report.failed, "broadcast finished");

        report
    }

    /// Snapshot all users from `store` and broadcast to them.
    pub async fn run_for_all(
        &self,
        store: &dyn Store,
        messenger: &dyn MessagingPort,
        html: String,
    ) -> Result<BroadcastReport> {
        let job = BroadcastJob::for_all_users(store, html).await?;
        Ok(self.run(messenger, job).await)
    }
}
