//! Time-triggered broadcast.
//!
//! A single cancellable task sleeps until the next cron instant, then
//! broadcasts the operator-set daily text, or the day's quote, to every
//! non-banned user through the primary session.

use std::{path::Path, str::FromStr, sync::Arc, time::Duration};

use chrono::{DateTime, Datelike, Utc};
use cron::Schedule;
use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::{
    broadcast::{BroadcastEngine, BroadcastReport},
    errors::Error,
    formatting::escape_html,
    registry::SessionRegistry,
    store::{Store, DAILY_MESSAGE_KEY},
    Result,
};

pub const BUILTIN_QUOTES: &[&str] = &[
    "The secret of getting ahead is getting started.",
    "It always seems impossible until it's done.",
    "Small steps every day add up to big results.",
    "Don't watch the clock; do what it does. Keep going.",
    "Well done is better than well said.",
    "You don't have to be great to start, but you have to start to be great.",
    "Act as if what you do makes a difference. It does.",
];

pub struct DailyBroadcast {
    schedule: Schedule,
    store: Arc<dyn Store>,
    broadcasts: Arc<BroadcastEngine>,
    registry: Arc<SessionRegistry>,
    quotes: Vec<String>,
}

impl DailyBroadcast {
    pub fn new(
        cron_expr: &str,
        store: Arc<dyn Store>,
        broadcasts: Arc<BroadcastEngine>,
        registry: Arc<SessionRegistry>,
        quotes: Vec<String>,
    ) -> Result<Self> {
        let schedule = Schedule::from_str(cron_expr)
            .map_err(|e| Error::Config(format!("invalid cron expression `{cron_expr}`: {e}")))?;
        let quotes = if quotes.is_empty() {
            BUILTIN_QUOTES.iter().map(|q| q.to_string()).collect()
        } else {
            quotes
        };
        Ok(Self {
            schedule,
            store,
            broadcasts,
            registry,
            quotes,
        })
    }

    /// One quote per non-empty line of `path`; `None` or an unreadable file
    /// yields an empty list (the built-in quotes are used).
    pub async fn load_quotes(path: Option<&Path>) -> Vec<String> {
        let Some(path) = path else {
            return Vec::new();
        };
        match tokio::fs::read_to_string(path).await {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) => {
                tracing::warn!(path = %path.display(), "quotes file unreadable: {e}");
                Vec::new()
            }
        }
    }

    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&now).next()
    }

    /// Text broadcast at `now`: the stored daily message, else the day's quote.
    pub async fn message_for(&self, now: DateTime<Utc>) -> String {
        match self.store.get_setting(DAILY_MESSAGE_KEY).await {
            Ok(Some(text)) => return format!("📢 {}", escape_html(&text)),
            Ok(None) => {}
            Err(e) => tracing::warn!("daily message lookup failed: {e}"),
        }
        let idx = now.ordinal0() as usize % self.quotes.len();
        format!("🌅 <b>Quote of the day</b>\n\n{}", escape_html(&self.quotes[idx]))
    }

    /// Broadcast once, now.
    pub async fn fire(&self, now: DateTime<Utc>) -> Result<BroadcastReport> {
        let Some(messenger) = self.registry.primary_messenger().await else {
            return Err(Error::Transport(
                "primary session is not running".to_string(),
            ));
        };
        let html = self.message_for(now).await;
        self.broadcasts
            .run_for_all(self.store.as_ref(), messenger.as_ref(), html)
            .await
    }

    /// Fire on every schedule instant until `cancel` is triggered.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let now = Utc::now();
            let Some(next) = self.next_after(now) else {
                tracing::warn!("scheduled broadcast has no next run (stopping)");
                break;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!(next = %next, "scheduled broadcast armed");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(wait) => {}
            }

            // A paced run can take long; dropping it stops the remaining sends.
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("scheduled broadcast interrupted by shutdown");
                    break;
                }
                result = self.fire(next) => match result {
                    Ok(r) => tracing::info!(sent = r.sent, failed = r.failed, "scheduled broadcast done"),
                    Err(e) => tracing::warn!("scheduled broadcast failed: {e}"),
                },
            }
        }
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{
        registry::{Credential, SessionKind},
        store::MemoryStore,
        test_support::{sender, FakeConnector},
    };

    fn daily(store: Arc<MemoryStore>, registry: Arc<SessionRegistry>, quotes: Vec<String>) -> DailyBroadcast {
        DailyBroadcast::new(
            "0 0 9 * * *",
            store,
            Arc::new(BroadcastEngine::new(Duration::ZERO)),
            registry,
            quotes,
        )
        .unwrap()
    }

    #[test]
    fn next_run_follows_the_cron_expression() {
        let d = daily(Arc::new(MemoryStore::new()), Arc::new(SessionRegistry::new()), vec![]);
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(
            d.next_after(now),
            Some(Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn invalid_expression_is_a_config_error() {
        let err = DailyBroadcast::new(
            "whenever",
            Arc::new(MemoryStore::new()),
            Arc::new(BroadcastEngine::new(Duration::ZERO)),
            Arc::new(SessionRegistry::new()),
            vec![],
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn quotes_rotate_by_day_unless_overridden() {
        let store = Arc::new(MemoryStore::new());
        let d = daily(
            store.clone(),
            Arc::new(SessionRegistry::new()),
            vec!["first".to_string(), "second".to_string()],
        );
        let jan1 = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let jan2 = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();

        assert!(d.message_for(jan1).await.ends_with("first"));
        assert!(d.message_for(jan2).await.ends_with("second"));

        store
            .set_setting(DAILY_MESSAGE_KEY, Some("Drink water"))
            .await
            .unwrap();
        assert_eq!(d.message_for(jan1).await, "📢 Drink water");
    }

    #[tokio::test]
    async fn fire_needs_a_running_primary() {
        let store = Arc::new(MemoryStore::new());
        store.refresh_profile(&sender(10, "a")).await.unwrap();
        store.refresh_profile(&sender(11, "b")).await.unwrap();
        let registry = Arc::new(SessionRegistry::new());
        let d = daily(store, registry.clone(), vec![]);

        assert!(d.fire(Utc::now()).await.is_err());

        registry
            .start_session(&Credential::new("1:primary"), SessionKind::Primary, &FakeConnector)
            .await
            .unwrap();
        let report = d.fire(Utc::now()).await.unwrap();
        assert_eq!(report, BroadcastReport { sent: 2, failed: 0 });
    }

    #[tokio::test]
    async fn quotes_file_lines_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quotes.txt");
        std::fs::write(&path, "one\n\n  two  \n").unwrap();

        assert_eq!(
            DailyBroadcast::load_quotes(Some(&path)).await,
            vec!["one".to_string(), "two".to_string()]
        );
        assert!(DailyBroadcast::load_quotes(Some(&dir.path().join("missing")))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn cancelled_loop_exits() {
        let d = Arc::new(daily(
            Arc::new(MemoryStore::new()),
            Arc::new(SessionRegistry::new()),
            vec![],
        ));
        let cancel = CancellationToken::new();
        let handle = d.spawn(cancel.clone());
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_a_paced_broadcast() {
        let store = Arc::new(MemoryStore::new());
        for id in [10, 11, 12] {
            store.refresh_profile(&sender(id, "u")).await.unwrap();
        }
        let registry = Arc::new(SessionRegistry::new());
        registry
            .start_session(&Credential::new("1:primary"), SessionKind::Primary, &FakeConnector)
            .await
            .unwrap();
        let d = Arc::new(
            DailyBroadcast::new(
                "* * * * * *",
                store,
                Arc::new(BroadcastEngine::new(Duration::from_secs(3600))),
                registry,
                vec![],
            )
            .unwrap(),
        );

        let cancel = CancellationToken::new();
        let handle = d.spawn(cancel.clone());
        // Past the first instant, into the first inter-send pause.
        sleep(Duration::from_secs(5)).await;

        let start = tokio::time::Instant::now();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(60), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(60));
    }
}
