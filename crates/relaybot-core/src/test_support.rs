//! In-process fakes shared by unit tests.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicI32, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef, Sender, UserId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{InboundMessage, Payload, ReplyContext},
    },
    registry::{Credential, SessionConnector, SessionRuntime, SessionState},
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Send { chat: i64, html: String },
    Reply { to: MessageRef, html: String },
    Forward { to: i64, msg: MessageRef },
    Copy { to: i64, msg: MessageRef },
    Delete { msg: MessageRef },
}

/// Records every outbound call; chats in `unreachable` fail with a transport error.
#[derive(Default)]
pub struct RecordingMessenger {
    pub unreachable: HashSet<i64>,
    next_id: AtomicI32,
    calls: Mutex<Vec<Call>>,
}

impl RecordingMessenger {
    pub fn failing_for(chats: &[i64]) -> Self {
        Self {
            unreachable: chats.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Every HTML body sent or replied into `chat`.
    pub fn texts_to(&self, chat: i64) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send { chat: c, html } if c == chat => Some(html),
                Call::Reply { to, html } if to.chat_id.0 == chat => Some(html),
                _ => None,
            })
            .collect()
    }

    fn deliver(&self, chat: i64, call: Call) -> Result<MessageRef> {
        self.calls.lock().unwrap().push(call);
        if self.unreachable.contains(&chat) {
            return Err(Error::Transport("Forbidden: bot was blocked by the user".into()));
        }
        Ok(MessageRef {
            chat_id: ChatId(chat),
            message_id: MessageId(1000 + self.next_id.fetch_add(1, Ordering::SeqCst)),
        })
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.deliver(
            chat_id.0,
            Call::Send {
                chat: chat_id.0,
                html: html.to_string(),
            },
        )
    }

    async fn reply_html(&self, to: MessageRef, html: &str) -> Result<MessageRef> {
        self.deliver(
            to.chat_id.0,
            Call::Reply {
                to,
                html: html.to_string(),
            },
        )
    }

    async fn forward_message(&self, to: ChatId, msg: MessageRef) -> Result<MessageRef> {
        self.deliver(to.0, Call::Forward { to: to.0, msg })
    }

    async fn copy_message(&self, to: ChatId, msg: MessageRef) -> Result<MessageRef> {
        self.deliver(to.0, Call::Copy { to: to.0, msg })
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Delete { msg });
        Ok(())
    }
}

pub fn sender(id: i64, name: &str) -> Sender {
    Sender {
        id: UserId(id),
        first_name: name.to_string(),
        username: None,
    }
}

pub fn text_from(id: i64, name: &str, text: &str) -> InboundMessage {
    InboundMessage {
        chat_id: ChatId(id),
        sender: sender(id, name),
        message: MessageRef {
            chat_id: ChatId(id),
            message_id: MessageId(1),
        },
        payload: Payload::Text(text.to_string()),
        reply_to: None,
    }
}

pub fn reply_from(id: i64, text: &str, replied: ReplyContext) -> InboundMessage {
    InboundMessage {
        reply_to: Some(replied),
        ..text_from(id, "Operator", text)
    }
}

pub struct FakeRuntime {
    messenger: Arc<RecordingMessenger>,
    stopped: AtomicBool,
}

#[async_trait]
impl SessionRuntime for FakeRuntime {
    fn bot_username(&self) -> &str {
        "fake_bot"
    }

    fn messenger(&self) -> Arc<dyn MessagingPort> {
        self.messenger.clone()
    }

    fn state(&self) -> SessionState {
        if self.stopped.load(Ordering::SeqCst) {
            SessionState::Stopped
        } else {
            SessionState::Running
        }
    }

    async fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Connects any credential except those containing `bad`.
pub struct FakeConnector;

#[async_trait]
impl SessionConnector for FakeConnector {
    async fn connect(&self, credential: &Credential) -> Result<Arc<dyn SessionRuntime>> {
        if credential.expose().contains("bad") {
            return Err(Error::Transport("Unauthorized".to_string()));
        }
        Ok(Arc::new(FakeRuntime {
            messenger: Arc::new(RecordingMessenger::default()),
            stopped: AtomicBool::new(false),
        }))
    }
}
