//! User ⇄ operator relay.
//!
//! Two entry points share one router: user messages are gated, audited and
//! forwarded to the operator with a relay card; operator replies are routed
//! back by decoding the card they reply to. The router is session-agnostic;
//! every call receives the outbound port of the session the message arrived on.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    access::AccessGate,
    audit::AuditRecord,
    correlation,
    domain::{ChatId, MessageRef, UserId, UserProfile},
    errors::Error,
    formatting::{escape_html, render_template},
    messaging::{
        port::MessagingPort,
        types::{InboundMessage, Payload},
    },
    store::{Store, WELCOME_MESSAGE_KEY},
    Result,
};

pub const BAN_NOTICE: &str = "🚫 You are banned from using this bot.";
pub const ACK_TEXT: &str = "✅ Message sent to admin.";
pub const NOT_FOUND_TEXT: &str = "⚠️ User ID not found!";
pub const DELIVERED_TEXT: &str = "✅ Reply delivered.";
pub const OPERATOR_READY_TEXT: &str = "👑 Admin Panel Ready!";
pub const DEFAULT_WELCOME: &str = "👋 Hello {name}! This is a <b>Livegram style</b> chat bot.\n\
Your messages are delivered directly to the admin.";

const OPERATOR_UNREACHABLE_TEXT: &str = "⚠️ The admin could not be reached, please try again later.";

/// Result of relaying one user message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Forwarded {
    /// The forwarded copy in the operator's chat.
    pub forward: MessageRef,
    /// The relay card replying to the forward, if it could be sent.
    pub card: Option<MessageRef>,
}

pub struct RelayRouter {
    owner: UserId,
    store: Arc<dyn Store>,
    gate: AccessGate,
    ack_retract_delay: Duration,
    audit_tasks: TaskTracker,
    retractions: TaskTracker,
    cancel: CancellationToken,
}

impl RelayRouter {
    pub fn new(
        owner: UserId,
        store: Arc<dyn Store>,
        gate: AccessGate,
        ack_retract_delay: Duration,
    ) -> Self {
        Self {
            owner,
            store,
            gate,
            ack_retract_delay,
            audit_tasks: TaskTracker::new(),
            retractions: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    pub fn is_operator(&self, id: UserId) -> bool {
        id == self.owner
    }

    /// `/start` from anyone: register the profile and greet.
    pub async fn handle_start(
        &self,
        messenger: &dyn MessagingPort,
        msg: &InboundMessage,
    ) -> Result<()> {
        let profile = self.store.refresh_profile(&msg.sender).await?;

        let html = if self.is_operator(msg.sender.id) {
            OPERATOR_READY_TEXT.to_string()
        } else if !self.gate.is_allowed(msg.sender.id).await {
            BAN_NOTICE.to_string()
        } else {
            let template = match self.store.get_setting(WELCOME_MESSAGE_KEY).await {
                Ok(Some(t)) => t,
                Ok(None) => DEFAULT_WELCOME.to_string(),
                Err(e) => {
                    tracing::warn!("welcome message lookup failed: {e}");
                    DEFAULT_WELCOME.to_string()
                }
            };
            render_template(&template, &profile)
        };

        messenger.reply_html(msg.message, &html).await?;
        Ok(())
    }

    /// User → operator.
    ///
    /// Banned users get the ban notice and `Err(AccessDenied)`; nothing is
    /// forwarded or audited for them.
    pub async fn handle_user_message(
        &self,
        messenger: Arc<dyn MessagingPort>,
        msg: &InboundMessage,
    ) -> Result<Forwarded> {
        let user = msg.sender.id;

        // Always refreshed, banned or not.
        let profile = match self.store.refresh_profile(&msg.sender).await {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(user_id = user.0, "profile refresh failed: {e}");
                None
            }
        };

        if let Err(denied) = self.gate.check(user).await {
            if let Err(e) = messenger.reply_html(msg.message, BAN_NOTICE).await {
                tracing::debug!(user_id = user.0, "ban notice not delivered: {e}");
            }
            tracing::info!(user_id = user.0, "message from banned user dropped");
            return Err(denied);
        }

        let summary = msg.payload.summary();
        self.spawn_audit(AuditRecord::inbound(user, &summary));

        let forward = match messenger
            .forward_message(ChatId::from(self.owner), msg.message)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(user_id = user.0, "forward to operator failed: {e}");
                if let Err(e) = messenger
                    .reply_html(msg.message, OPERATOR_UNREACHABLE_TEXT)
                    .await
                {
                    tracing::debug!(user_id = user.0, "unreachable notice not delivered: {e}");
                }
                return Err(Error::delivery(self.owner.0, e));
            }
        };

        let profile = profile.unwrap_or_else(|| UserProfile::new(&msg.sender, Utc::now()));
        let card = match messenger
            .reply_html(forward, &correlation::relay_card(&profile, &summary))
            .await
        {
            Ok(c) => Some(c),
            Err(e) => {
                // The forward header still lets the operator reply.
                tracing::warn!(user_id = user.0, "relay card not delivered: {e}");
                None
            }
        };

        match messenger.reply_html(msg.message, ACK_TEXT).await {
            Ok(ack) => self.spawn_retraction(messenger, ack),
            Err(e) => tracing::debug!(user_id = user.0, "ack not delivered: {e}"),
        }

        tracing::info!(user_id = user.0, "relayed message to operator");
        Ok(Forwarded { forward, card })
    }

    /// Operator → user. Returns the user the reply was delivered to.
    ///
    /// `CorrelationNotFound` and `DeliveryFailed` are reported to the operator
    /// as a single line before being returned.
    pub async fn handle_operator_reply(
        &self,
        messenger: &dyn MessagingPort,
        msg: &InboundMessage,
    ) -> Result<UserId> {
        // A forward origin is reported by the platform; the replied-to text
        // of a forward is whatever the user typed, so it is only decoded for
        // relay cards.
        let target = msg.reply_to.as_ref().and_then(|r| {
            r.forwarded_from
                .or_else(|| r.text.as_deref().and_then(correlation::decode))
        });

        let Some(user) = target else {
            self.notify_operator(messenger, msg.message, NOT_FOUND_TEXT)
                .await;
            return Err(Error::CorrelationNotFound);
        };

        self.spawn_audit(AuditRecord::operator_reply(user, &msg.payload.summary()));

        let delivered = match &msg.payload {
            Payload::Text(text) => {
                messenger
                    .send_html(
                        ChatId::from(user),
                        &format!("📩 Admin: {}", escape_html(text)),
                    )
                    .await
            }
            Payload::Media { .. } => messenger.copy_message(ChatId::from(user), msg.message).await,
        };

        match delivered {
            Ok(_) => {
                self.notify_operator(messenger, msg.message, DELIVERED_TEXT)
                    .await;
                tracing::info!(user_id = user.0, "operator reply delivered");
                Ok(user)
            }
            Err(e) => {
                let err = Error::delivery(user.0, e);
                self.notify_operator(
                    messenger,
                    msg.message,
                    &format!("⚠️ Error: {}", escape_html(&err.to_string())),
                )
                .await;
                tracing::warn!(user_id = user.0, "operator reply failed: {err}");
                Err(err)
            }
        }
    }

    /// Wait for pending audit writes.
    pub async fn flush_audit(&self) {
        self.audit_tasks.close();
        self.audit_tasks.wait().await;
        self.audit_tasks.reopen();
    }

    /// Retract pending acknowledgments now and wait for every background task.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.retractions.close();
        self.audit_tasks.close();
        self.retractions.wait().await;
        self.audit_tasks.wait().await;
    }

    async fn notify_operator(&self, messenger: &dyn MessagingPort, to: MessageRef, html: &str) {
        if let Err(e) = messenger.reply_html(to, html).await {
            tracing::warn!("operator notice not delivered: {e}");
        }
    }

    fn spawn_audit(&self, record: AuditRecord) {
        let store = self.store.clone();
        self.audit_tasks.spawn(async move {
            if let Err(e) = store.append_audit(record).await {
                tracing::warn!("audit append failed: {e}");
            }
        });
    }

    fn spawn_retraction(&self, messenger: Arc<dyn MessagingPort>, ack: MessageRef) {
        let delay = self.ack_retract_delay;
        let cancel = self.cancel.clone();
        self.retractions.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {}
            }
            if let Err(e) = messenger.delete_message(ack).await {
                tracing::debug!("ack retraction failed: {e}");
            }
        });
    }
}
