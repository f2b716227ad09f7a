use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    errors::Error,
    messaging::port::MessagingPort,
    Result,
};

/// MessagingPort decorator that bounds every outbound call.
///
/// One slow platform call must not stall a broadcast's pacing or a session's
/// handler indefinitely; expiry becomes `Error::Timeout`.
pub struct TimeoutMessenger {
    inner: Arc<dyn MessagingPort>,
    limit: Duration,
}

impl TimeoutMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(res) => res,
            Err(_) => Err(Error::Timeout(self.limit)),
        }
    }
}

#[async_trait]
impl MessagingPort for TimeoutMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.bounded(self.inner.send_html(chat_id, html)).await
    }

    async fn reply_html(&self, to: MessageRef, html: &str) -> Result<MessageRef> {
        self.bounded(self.inner.reply_html(to, html)).await
    }

    async fn forward_message(&self, to: ChatId, msg: MessageRef) -> Result<MessageRef> {
        self.bounded(self.inner.forward_message(to, msg)).await
    }

    async fn copy_message(&self, to: ChatId, msg: MessageRef) -> Result<MessageRef> {
        self.bounded(self.inner.copy_message(to, msg)).await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.bounded(self.inner.delete_message(msg)).await
    }
}
