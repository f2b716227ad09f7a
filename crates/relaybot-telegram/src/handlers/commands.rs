use std::sync::Arc;

use relaybot_core::{
    errors::Error,
    messaging::types::{InboundMessage, Payload},
};

use crate::handlers::convert::command_name;
use crate::router::{AppState, SessionContext, TelegramConnector};

const OPERATOR_HINT: &str =
    "ℹ️ Reply to a relayed message to answer its sender. Send /help for commands.";

pub async fn handle_operator(msg: InboundMessage, state: Arc<AppState>, ctx: Arc<SessionContext>) {
    if let Payload::Text(text) = &msg.payload {
        match command_name(text).as_deref() {
            Some("start") => {
                if let Err(e) = state.relay.handle_start(ctx.messenger.as_ref(), &msg).await {
                    tracing::warn!(session = %ctx.label, "start failed: {e}");
                }
                return;
            }
            Some(_) => {
                // Off the dispatcher: /unclone may stop the very session
                // that is running this handler.
                let text = text.clone();
                tokio::spawn(async move {
                    let connector = TelegramConnector::new(state.clone());
                    let result = state
                        .console
                        .handle(&text, msg.message, ctx.messenger.as_ref(), &connector)
                        .await;
                    if let Err(e) = result {
                        tracing::debug!(session = %ctx.label, "command rejected: {e}");
                    }
                });
                return;
            }
            None => {}
        }
    }

    if msg.reply_to.is_some() {
        match state
            .relay
            .handle_operator_reply(ctx.messenger.as_ref(), &msg)
            .await
        {
            Ok(_) | Err(Error::CorrelationNotFound) | Err(Error::DeliveryFailed { .. }) => {}
            Err(e) => tracing::warn!(session = %ctx.label, "operator reply failed: {e}"),
        }
        return;
    }

    if let Err(e) = ctx.messenger.reply_html(msg.message, OPERATOR_HINT).await {
        tracing::debug!(session = %ctx.label, "hint not delivered: {e}");
    }
}
