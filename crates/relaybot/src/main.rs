use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use relaybot_core::{
    access::{AccessGate, LookupFailure},
    broadcast::BroadcastEngine,
    config::{Config, StoreBackend},
    console::OperatorConsole,
    registry::SessionRegistry,
    relay::RelayRouter,
    scheduler::DailyBroadcast,
    store::{FileStore, MemoryStore, Store},
};
use relaybot_telegram::router::AppState;

mod health;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    relaybot_core::logging::init("relaybot")?;

    let cfg = Arc::new(Config::load()?);

    let store: Arc<dyn Store> = match cfg.store_backend {
        StoreBackend::File => Arc::new(FileStore::open(&cfg.data_dir).await?),
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; profiles are lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let policy = if cfg.access_fail_open {
        LookupFailure::Allow
    } else {
        LookupFailure::Deny
    };
    let gate = AccessGate::new(store.clone(), policy);
    let registry = Arc::new(SessionRegistry::new());
    let broadcasts = Arc::new(BroadcastEngine::new(cfg.broadcast_throttle));

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        relay: Arc::new(RelayRouter::new(
            cfg.owner_id,
            store.clone(),
            gate.clone(),
            cfg.ack_retract_delay,
        )),
        console: Arc::new(OperatorConsole::new(
            store.clone(),
            gate,
            broadcasts.clone(),
            registry.clone(),
        )),
        registry: registry.clone(),
    });

    let cancel = CancellationToken::new();
    let mut background = Vec::new();

    if cfg.health_enabled {
        let cancel = cancel.child_token();
        let port = cfg.port;
        background.push(tokio::spawn(async move {
            if let Err(e) = health::serve(port, cancel).await {
                tracing::error!("liveness endpoint failed: {e}");
            }
        }));
    }

    if let Some(expr) = &cfg.daily_broadcast_cron {
        let quotes = DailyBroadcast::load_quotes(cfg.quotes_file.as_deref()).await;
        let daily = DailyBroadcast::new(expr, store.clone(), broadcasts, registry, quotes)?;
        tracing::info!(cron = %expr, "scheduled broadcast enabled");
        background.push(Arc::new(daily).spawn(cancel.child_token()));
    }

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("ctrl-c handler failed: {e}");
                return;
            }
            tracing::info!("shutdown requested");
            cancel.cancel();
        });
    }

    let result = relaybot_telegram::router::run_polling(state, cancel.clone()).await;

    cancel.cancel();
    for task in background {
        let _ = task.await;
    }
    tracing::info!("relay bot stopped");

    result
}
