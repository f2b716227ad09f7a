use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{domain::UserId, formatting::truncate_text};

pub const AUDIT_MAX_TEXT: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// A user's message relayed to the operator.
    Inbound,
    /// The operator's reply routed back to a user.
    OperatorReply,
}

/// One append-only audit entry, keyed by the end user it concerns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub user_id: UserId,
    pub direction: Direction,
    pub content: String,
}

impl AuditRecord {
    pub fn inbound(user_id: UserId, content: &str) -> Self {
        Self::new(user_id, Direction::Inbound, content)
    }

    pub fn operator_reply(user_id: UserId, content: &str) -> Self {
        Self::new(user_id, Direction::OperatorReply, content)
    }

    fn new(user_id: UserId, direction: Direction, content: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            user_id,
            direction,
            content: truncate_text(content, AUDIT_MAX_TEXT),
        }
    }
}
