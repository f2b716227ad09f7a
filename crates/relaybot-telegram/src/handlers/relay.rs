use std::sync::Arc;

use relaybot_core::{errors::Error, messaging::types::InboundMessage};

use crate::handlers::convert::command_name;
use crate::router::{AppState, SessionContext};

pub async fn handle_user(msg: InboundMessage, state: Arc<AppState>, ctx: Arc<SessionContext>) {
    let user_id = msg.sender.id.0;

    let is_start = msg
        .payload
        .text()
        .and_then(command_name)
        .is_some_and(|c| c == "start");
    if is_start {
        if let Err(e) = state.relay.handle_start(ctx.messenger.as_ref(), &msg).await {
            tracing::warn!(user_id, session = %ctx.label, "start failed: {e}");
        }
        return;
    }

    match state
        .relay
        .handle_user_message(ctx.messenger.clone(), &msg)
        .await
    {
        Ok(_) => {}
        Err(Error::AccessDenied(_)) => {}
        Err(e) => tracing::warn!(user_id, session = %ctx.label, "relay failed: {e}"),
    }
}
