//! Telegram update handlers.
//!
//! Every session's dispatcher feeds the same handlers; the session's own
//! outbound port comes in through `SessionContext`. Failures are logged and
//! never escape to the dispatcher.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use crate::router::{AppState, SessionContext};

mod commands;
pub mod convert;
mod relay;

pub async fn handle_message(
    msg: Message,
    state: Arc<AppState>,
    ctx: Arc<SessionContext>,
) -> ResponseResult<()> {
    // Private chats only.
    if !msg.chat.is_private() {
        return Ok(());
    }
    let Some(inbound) = convert::inbound(&msg) else {
        return Ok(());
    };

    if state.relay.is_operator(inbound.sender.id) {
        commands::handle_operator(inbound, state, ctx).await;
    } else {
        relay::handle_user(inbound, state, ctx).await;
    }

    Ok(())
}
