use std::time::Duration;

use crate::domain::UserId;

/// Core error type for the relay bot.
///
/// Adapter crates map their specific errors into this type so the core can
/// decide what is surfaced to the operator and what is only logged.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("user {0} is banned")]
    AccessDenied(UserId),

    #[error("user ID not found in the replied message")]
    CorrelationNotFound,

    #[error("delivery to {recipient} failed: {reason}")]
    DeliveryFailed { recipient: i64, reason: String },

    #[error("session {0} is already running")]
    SessionAlreadyRunning(String),

    #[error("session {label} failed to start: {reason}")]
    SessionStartFailed { label: String, reason: String },

    #[error("{0}")]
    InvalidCommandArgument(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("platform call timed out after {0:?}")]
    Timeout(Duration),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a transport-level failure as a delivery failure to `recipient`.
    pub fn delivery(recipient: i64, cause: Error) -> Self {
        match cause {
            Error::DeliveryFailed { .. } => cause,
            other => Error::DeliveryFailed {
                recipient,
                reason: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
