//! Messaging platform abstractions.

pub mod port;
pub mod timeout;
pub mod types;
