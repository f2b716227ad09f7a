use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Platform chat id (numeric). Private chats share the user's id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

impl From<UserId> for ChatId {
    fn from(u: UserId) -> Self {
        ChatId(u.0)
    }
}

/// Platform message id (numeric, unique within a chat).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a delivered message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Identity and presentation metadata of whoever sent an inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    pub id: UserId,
    pub first_name: String,
    pub username: Option<String>,
}

/// Stored per-user state. Never deleted; the ban flag is the only policy bit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    #[serde(default)]
    pub banned: bool,
}

impl UserProfile {
    pub fn new(sender: &Sender, now: DateTime<Utc>) -> Self {
        Self {
            id: sender.id,
            first_name: sender.first_name.clone(),
            username: sender.username.clone(),
            joined_at: now,
            last_seen_at: now,
            banned: false,
        }
    }

    /// Placeholder for a user known only by id (e.g. banned before writing in).
    pub fn placeholder(id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            first_name: String::new(),
            username: None,
            joined_at: now,
            last_seen_at: now,
            banned: false,
        }
    }

    pub fn display_name(&self) -> &str {
        if self.first_name.trim().is_empty() {
            "Unknown"
        } else {
            &self.first_name
        }
    }
}
