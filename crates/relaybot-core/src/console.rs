//! Operator console: executes parsed commands against the core services.

use std::{fmt::Write as _, sync::Arc};

use crate::{
    access::AccessGate,
    broadcast::BroadcastEngine,
    commands::{Command, HELP_TEXT},
    domain::MessageRef,
    errors::Error,
    formatting::escape_html,
    messaging::port::MessagingPort,
    registry::{SessionConnector, SessionKind, SessionRegistry},
    relay::OPERATOR_READY_TEXT,
    store::{Store, DAILY_MESSAGE_KEY, WELCOME_MESSAGE_KEY},
    Result,
};

/// Broadcast body as users receive it.
pub fn broadcast_html(text: &str) -> String {
    format!("📢 Broadcast:\n\n{}", escape_html(text))
}

/// One-line operator notice for a failed command.
pub fn error_line(err: &Error) -> String {
    match err {
        Error::InvalidCommandArgument(msg) => msg.clone(),
        Error::CorrelationNotFound => "⚠️ User ID not found!".to_string(),
        Error::SessionAlreadyRunning(_) => "⚠️ Clone bot already running!".to_string(),
        Error::SessionStartFailed { reason, .. } => {
            format!("⚠️ Clone failed: {}", escape_html(reason))
        }
        other => format!("⚠️ Error: {}", escape_html(&other.to_string())),
    }
}

pub struct OperatorConsole {
    store: Arc<dyn Store>,
    gate: AccessGate,
    broadcasts: Arc<BroadcastEngine>,
    registry: Arc<SessionRegistry>,
}

impl OperatorConsole {
    pub fn new(
        store: Arc<dyn Store>,
        gate: AccessGate,
        broadcasts: Arc<BroadcastEngine>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            store,
            gate,
            broadcasts,
            registry,
        }
    }

    /// Parse `text`, run it and answer the operator under `reply_to`.
    ///
    /// Failures are answered as a single line, then returned.
    pub async fn handle(
        &self,
        text: &str,
        reply_to: MessageRef,
        messenger: &dyn MessagingPort,
        connector: &dyn SessionConnector,
    ) -> Result<()> {
        let outcome = match Command::parse(text) {
            Ok(cmd) => self.execute(cmd, messenger, connector).await,
            Err(e) => Err(e),
        };

        let (html, result) = match outcome {
            Ok(html) => (html, Ok(())),
            Err(e) => (error_line(&e), Err(e)),
        };
        if let Err(e) = messenger.reply_html(reply_to, &html).await {
            tracing::warn!("command reply not delivered: {e}");
        }
        result
    }

    /// Run one command; returns the HTML answer for the operator.
    ///
    /// `messenger` is the session the command arrived on; broadcasts go out
    /// through it.
    pub async fn execute(
        &self,
        cmd: Command,
        messenger: &dyn MessagingPort,
        connector: &dyn SessionConnector,
    ) -> Result<String> {
        match cmd {
            Command::Start => Ok(OPERATOR_READY_TEXT.to_string()),
            Command::Help => Ok(HELP_TEXT.to_string()),
            Command::Ban(id) => {
                self.gate.set_banned(id, true).await?;
                Ok(format!("🚫 User <code>{id}</code> banned."))
            }
            Command::Unban(id) => {
                self.gate.set_banned(id, false).await?;
                Ok(format!("✅ User <code>{id}</code> unbanned."))
            }
            Command::Broadcast(text) => {
                let report = self
                    .broadcasts
                    .run_for_all(self.store.as_ref(), messenger, broadcast_html(&text))
                    .await?;
                Ok(format!(
                    "✅ Broadcast sent to {} users, ❌ Failed: {}",
                    report.sent, report.failed
                ))
            }
            Command::Clone(credential) => {
                let handle = self
                    .registry
                    .start_session(&credential, SessionKind::Clone, connector)
                    .await?;
                let bot = handle
                    .bot_username
                    .map(|u| format!(" (@{})", escape_html(&u)))
                    .unwrap_or_default();
                Ok(format!(
                    "✅ Clone Bot started with token ending {}{bot}",
                    escape_html(credential.label())
                ))
            }
            Command::Unclone(credential) => {
                let label = escape_html(credential.label());
                match self.registry.stop_session(&credential).await? {
                    Some(_) => Ok(format!("🛑 Clone {label} stopped.")),
                    None => Ok(format!("ℹ️ No clone running with token ending {label}.")),
                }
            }
            Command::Clones => Ok(self.render_sessions().await),
            Command::Stats => {
                let profiles = self.store.scan_profiles().await?;
                let banned = profiles.iter().filter(|p| p.banned).count();
                let sessions = self.registry.active_count().await;
                Ok(format!(
                    "📊 Total registered users: {}\n🚫 Banned: {banned}\n🤖 Active sessions: {sessions}",
                    profiles.len()
                ))
            }
            Command::SetWelcome(text) => {
                self.store
                    .set_setting(WELCOME_MESSAGE_KEY, Some(&text))
                    .await?;
                Ok("✅ Welcome message updated.".to_string())
            }
            Command::SetDaily(text) => {
                self.store
                    .set_setting(DAILY_MESSAGE_KEY, text.as_deref())
                    .await?;
                Ok(match text {
                    Some(_) => "✅ Scheduled broadcast text updated.".to_string(),
                    None => "✅ Scheduled broadcast reset to daily quotes.".to_string(),
                })
            }
        }
    }

    async fn render_sessions(&self) -> String {
        let sessions = self.registry.list_sessions().await;
        if sessions.is_empty() {
            return "🤖 No sessions registered.".to_string();
        }

        let mut out = String::from("🤖 <b>Sessions</b>\n");
        for s in sessions {
            let bot = s
                .bot_username
                .as_deref()
                .map(|u| format!(" @{}", escape_html(u)))
                .unwrap_or_default();
            let primary = if s.kind == SessionKind::Primary {
                " (primary)"
            } else {
                ""
            };
            let _ = writeln!(
                out,
                "• <code>{}</code>{bot}: {}{primary}",
                escape_html(&s.label),
                s.state
            );
        }
        out
    }
}
