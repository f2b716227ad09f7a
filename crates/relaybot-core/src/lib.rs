//! Core domain + application logic for the relay bot.
//!
//! This crate is framework-agnostic. The messaging platform and the clone
//! connections live behind ports (traits) implemented in adapter crates.

pub mod access;
pub mod audit;
pub mod broadcast;
pub mod commands;
pub mod config;
pub mod console;
pub mod correlation;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod registry;
pub mod relay;
pub mod scheduler;
pub mod store;

#[cfg(test)]
mod test_support;

pub use errors::{Error, Result};
