use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    Result,
};

/// Outbound side of one platform connection.
///
/// Every session (primary and clones) has its own implementation bound to its
/// own credential; the relay logic is shared and receives the port per call.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;

    /// Send `html` into the chat of `to`, threaded as a reply to it.
    async fn reply_html(&self, to: MessageRef, html: &str) -> Result<MessageRef>;

    /// Forward `msg` to `to`, keeping the platform's "forwarded from" header.
    async fn forward_message(&self, to: ChatId, msg: MessageRef) -> Result<MessageRef>;

    /// Copy `msg` to `to` without the forward header (used for media replies).
    async fn copy_message(&self, to: ChatId, msg: MessageRef) -> Result<MessageRef>;

    async fn delete_message(&self, msg: MessageRef) -> Result<()>;
}
