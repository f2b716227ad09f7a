use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use teloxide::{
    dispatching::{Dispatcher, ShutdownToken},
    dptree,
    prelude::*,
};
use tokio::{sync::Mutex, task::JoinHandle};

use tokio_util::sync::CancellationToken;

use relaybot_core::{
    config::Config,
    console::OperatorConsole,
    errors::Error,
    messaging::{port::MessagingPort, timeout::TimeoutMessenger},
    registry::{
        Credential, SessionConnector, SessionKind, SessionRegistry, SessionRuntime, SessionState,
    },
    relay::RelayRouter,
    Result,
};

use crate::handlers;
use crate::TelegramMessenger;

/// State shared by every session's dispatcher.
pub struct AppState {
    pub cfg: Arc<Config>,
    pub relay: Arc<RelayRouter>,
    pub console: Arc<OperatorConsole>,
    pub registry: Arc<SessionRegistry>,
}

/// Per-session dependencies: the outbound port bound to this session's bot.
pub struct SessionContext {
    pub messenger: Arc<dyn MessagingPort>,
    pub label: String,
    pub bot_username: String,
}

/// Connects credentials by starting a long-polling dispatcher for each.
#[derive(Clone)]
pub struct TelegramConnector {
    state: Arc<AppState>,
}

impl TelegramConnector {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl SessionConnector for TelegramConnector {
    async fn connect(&self, credential: &Credential) -> Result<Arc<dyn SessionRuntime>> {
        let bot = Bot::new(credential.expose());

        let me = tokio::time::timeout(self.state.cfg.delivery_timeout, bot.get_me())
            .await
            .map_err(|_| Error::Timeout(self.state.cfg.delivery_timeout))?
            .map_err(|e| Error::Transport(format!("telegram error: {e}")))?;
        let bot_username = me.username().to_string();

        let raw: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
        let messenger: Arc<dyn MessagingPort> =
            Arc::new(TimeoutMessenger::new(raw, self.state.cfg.delivery_timeout));
        let ctx = Arc::new(SessionContext {
            messenger: messenger.clone(),
            label: credential.label().to_string(),
            bot_username: bot_username.clone(),
        });

        let handler = Update::filter_message().endpoint(handlers::handle_message);
        let mut dispatcher = Dispatcher::builder(bot, handler)
            .dependencies(dptree::deps![self.state.clone(), ctx])
            .default_handler(|_| async {})
            .build();
        let shutdown = dispatcher.shutdown_token();

        let exit = Arc::new(OnceLock::new());
        let inner = tokio::spawn(async move { dispatcher.dispatch().await });
        let abort = inner.abort_handle();
        let watcher = {
            let exit = exit.clone();
            let label = credential.label().to_string();
            tokio::spawn(async move {
                let state = match inner.await {
                    Ok(()) => SessionState::Stopped,
                    Err(e) if e.is_cancelled() => SessionState::Stopped,
                    Err(e) => {
                        tracing::error!(session = %label, "receive loop crashed: {e}");
                        SessionState::Failed
                    }
                };
                let _ = exit.set(state);
                tracing::info!(session = %label, state = %state, "receive loop exited");
            })
        };

        tracing::info!(bot = %bot_username, session = credential.fingerprint(), "telegram session connected");

        Ok(Arc::new(TelegramRuntime {
            bot_username,
            messenger,
            shutdown,
            abort,
            exit,
            watcher: Mutex::new(Some(watcher)),
        }))
    }
}

struct TelegramRuntime {
    bot_username: String,
    messenger: Arc<dyn MessagingPort>,
    shutdown: ShutdownToken,
    abort: tokio::task::AbortHandle,
    exit: Arc<OnceLock<SessionState>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl SessionRuntime for TelegramRuntime {
    fn bot_username(&self) -> &str {
        &self.bot_username
    }

    fn messenger(&self) -> Arc<dyn MessagingPort> {
        self.messenger.clone()
    }

    fn state(&self) -> SessionState {
        self.exit.get().copied().unwrap_or(SessionState::Running)
    }

    async fn shutdown(&self) {
        match self.shutdown.shutdown() {
            Ok(done) => done.await,
            // Not dispatching (yet or anymore).
            Err(_) => self.abort.abort(),
        }
        if let Some(watcher) = self.watcher.lock().await.take() {
            let _ = watcher.await;
        }
    }
}

/// Run the primary session until `cancel` fires, then stop every session.
pub async fn run_polling(state: Arc<AppState>, cancel: CancellationToken) -> anyhow::Result<()> {
    let connector = TelegramConnector::new(state.clone());

    let primary = Credential::new(state.cfg.bot_token.clone());
    let handle = state
        .registry
        .start_session(&primary, SessionKind::Primary, &connector)
        .await?;
    tracing::info!(
        bot = handle.bot_username.as_deref().unwrap_or("?"),
        owner = state.cfg.owner_id.0,
        "relay bot started"
    );

    for token in &state.cfg.clone_tokens {
        let credential = Credential::new(token.clone());
        if let Err(e) = state
            .registry
            .start_session(&credential, SessionKind::Clone, &connector)
            .await
        {
            tracing::warn!(session = credential.label(), "boot clone not started: {e}");
        }
    }

    cancel.cancelled().await;

    tracing::info!("stopping sessions");
    state.relay.shutdown().await;
    state.registry.shutdown_all().await;
    Ok(())
}
