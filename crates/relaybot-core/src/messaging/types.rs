use crate::domain::{ChatId, MessageRef, Sender, UserId};

/// Platform-neutral inbound message, as seen by the relay router.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub sender: Sender,
    pub message: MessageRef,
    pub payload: Payload,
    pub reply_to: Option<ReplyContext>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    /// Opaque media; the message itself is the reference that gets forwarded.
    Media {
        kind: MediaKind,
        caption: Option<String>,
    },
}

impl Payload {
    /// One-line summary used in relay cards and audit records.
    pub fn summary(&self) -> String {
        match self {
            Payload::Text(t) => t.clone(),
            Payload::Media {
                kind,
                caption: Some(c),
            } => format!("📎 {} ({c})", kind.label()),
            Payload::Media { kind, caption: None } => format!("📎 {}", kind.label()),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Payload::Text(t) => Some(t),
            Payload::Media { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Document,
    Audio,
    Voice,
    Sticker,
    Animation,
    Other,
}

impl MediaKind {
    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Photo => "Photo",
            MediaKind::Video => "Video",
            MediaKind::Document => "Document",
            MediaKind::Audio => "Audio",
            MediaKind::Voice => "Voice",
            MediaKind::Sticker => "Sticker",
            MediaKind::Animation => "Animation",
            MediaKind::Other => "Media",
        }
    }
}

/// What the platform tells us about the message an inbound message replies to.
#[derive(Clone, Debug, Default)]
pub struct ReplyContext {
    /// Text or caption of the replied-to message, entities stripped.
    pub text: Option<String>,
    /// Original author, when the replied-to message is a visible forward.
    pub forwarded_from: Option<UserId>,
}
