//! teloxide `Message` → core `InboundMessage`.

use teloxide::types::Message;

use relaybot_core::{
    domain::{ChatId, MessageId, MessageRef, Sender, UserId},
    messaging::types::{InboundMessage, MediaKind, Payload, ReplyContext},
};

/// `None` for messages without a human sender (channel posts, service messages).
pub fn inbound(msg: &Message) -> Option<InboundMessage> {
    let user = msg.from()?;
    let chat_id = ChatId(msg.chat.id.0);

    Some(InboundMessage {
        chat_id,
        sender: Sender {
            id: UserId(user.id.0 as i64),
            first_name: user.first_name.clone(),
            username: user.username.clone(),
        },
        message: MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        },
        payload: payload(msg),
        reply_to: msg.reply_to_message().map(reply_context),
    })
}

fn payload(msg: &Message) -> Payload {
    if let Some(text) = msg.text() {
        return Payload::Text(text.to_string());
    }

    let kind = if msg.photo().is_some() {
        MediaKind::Photo
    } else if msg.video().is_some() {
        MediaKind::Video
    } else if msg.document().is_some() {
        MediaKind::Document
    } else if msg.audio().is_some() {
        MediaKind::Audio
    } else if msg.voice().is_some() {
        MediaKind::Voice
    } else if msg.sticker().is_some() {
        MediaKind::Sticker
    } else if msg.animation().is_some() {
        MediaKind::Animation
    } else {
        MediaKind::Other
    };

    Payload::Media {
        kind,
        caption: msg.caption().map(str::to_string),
    }
}

fn reply_context(replied: &Message) -> ReplyContext {
    ReplyContext {
        text: replied.text().or_else(|| replied.caption()).map(str::to_string),
        forwarded_from: replied.forward_from_user().map(|u| UserId(u.id.0 as i64)),
    }
}

/// Lowercased command name of `/cmd@bot args`, if `text` is a command.
pub fn command_name(text: &str) -> Option<String> {
    let first = text.trim().split_whitespace().next()?;
    let name = first.strip_prefix('/')?.split('@').next()?;
    (!name.is_empty()).then(|| name.to_lowercase())
}
