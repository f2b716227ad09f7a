//! Clone session lifecycle.
//!
//! The registry exclusively owns every running platform connection, keyed by
//! a fingerprint of its credential. Connecting is delegated to a
//! [`SessionConnector`] so the registry is transport-agnostic.

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::{errors::Error, messaging::port::MessagingPort, Result};

/// A platform credential (bot token). Never printed.
pub struct Credential {
    secret: Secret<String>,
    fingerprint: String,
    label: String,
}

impl Credential {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into().trim().to_string();
        let fingerprint = hash_token(&raw);
        let tail: String = {
            let chars: Vec<char> = raw.chars().collect();
            chars[chars.len().saturating_sub(6)..].iter().collect()
        };
        Self {
            secret: Secret::new(raw),
            fingerprint,
            label: format!("…{tail}"),
        }
    }

    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    /// Stable registry key; safe to log.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// The last six characters, as shown to the operator.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("fingerprint", &self.fingerprint)
            .field("label", &self.label)
            .finish()
    }
}

fn hash_token(token: &str) -> String {
    use std::fmt::Write;

    let digest = Sha256::digest(token.as_bytes());
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Requested,
    Starting,
    Running,
    Stopped,
    Failed,
}

impl SessionState {
    fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Requested | SessionState::Starting | SessionState::Running
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Requested => "requested",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionKind {
    /// The connection the process was started with; cannot be stopped by command.
    Primary,
    Clone,
}

/// Snapshot of one registered session.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    pub fingerprint: String,
    pub label: String,
    pub kind: SessionKind,
    pub state: SessionState,
    pub bot_username: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// A live platform connection running its own receive loop.
#[async_trait]
pub trait SessionRuntime: Send + Sync {
    fn bot_username(&self) -> &str;

    fn messenger(&self) -> Arc<dyn MessagingPort>;

    /// `Running` while the receive loop is alive, then `Stopped` or `Failed`.
    fn state(&self) -> SessionState;

    /// Stop the receive loop and wait for it to exit.
    async fn shutdown(&self);
}

/// Establishes platform connections for the registry.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, credential: &Credential) -> Result<Arc<dyn SessionRuntime>>;
}

struct Slot {
    label: String,
    kind: SessionKind,
    state: SessionState,
    started_at: DateTime<Utc>,
    runtime: Option<Arc<dyn SessionRuntime>>,
}

impl Slot {
    fn effective_state(&self) -> SessionState {
        match (&self.runtime, self.state) {
            (Some(rt), SessionState::Running) => rt.state(),
            (_, state) => state,
        }
    }

    fn handle(&self, fingerprint: &str) -> SessionHandle {
        SessionHandle {
            fingerprint: fingerprint.to_string(),
            label: self.label.clone(),
            kind: self.kind,
            state: self.effective_state(),
            bot_username: self.runtime.as_ref().map(|rt| rt.bot_username().to_string()),
            started_at: self.started_at,
        }
    }
}

/// Concurrency-safe owner of every session, primary included.
#[derive(Default)]
pub struct SessionRegistry {
    slots: Mutex<HashMap<String, Slot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect `credential` and register it as running.
    ///
    /// Fails with `SessionAlreadyRunning` while an active session holds the
    /// credential. On connect failure nothing stays registered, so the call
    /// can be retried.
    pub async fn start_session(
        &self,
        credential: &Credential,
        kind: SessionKind,
        connector: &dyn SessionConnector,
    ) -> Result<SessionHandle> {
        let key = credential.fingerprint().to_string();

        {
            let mut slots = self.slots.lock().await;
            if let Some(existing) = slots.get(&key) {
                if existing.effective_state().is_active() {
                    return Err(Error::SessionAlreadyRunning(existing.label.clone()));
                }
            }
            // Either absent or a dead loop: reserve the slot.
            slots.insert(
                key.clone(),
                Slot {
                    label: credential.label().to_string(),
                    kind,
                    state: SessionState::Requested,
                    started_at: Utc::now(),
                    runtime: None,
                },
            );
        }

        self.transition(&key, SessionState::Starting).await;
        tracing::info!(session = %key, ?kind, "starting session");

        let runtime = match connector.connect(credential).await {
            Ok(rt) => rt,
            Err(e) => {
                self.slots.lock().await.remove(&key);
                tracing::warn!(session = %key, state = %SessionState::Failed, "session failed to start: {e}");
                return Err(Error::SessionStartFailed {
                    label: credential.label().to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let registered = {
            let mut slots = self.slots.lock().await;
            match slots.get_mut(&key) {
                Some(slot) if slot.state == SessionState::Starting => {
                    slot.state = SessionState::Running;
                    slot.runtime = Some(runtime.clone());
                    Some(slot.handle(&key))
                }
                _ => None,
            }
        };

        match registered {
            Some(handle) => {
                tracing::info!(
                    session = %key,
                    bot = runtime.bot_username(),
                    "session running"
                );
                Ok(handle)
            }
            None => {
                // Stopped while connecting.
                runtime.shutdown().await;
                Err(Error::SessionStartFailed {
                    label: credential.label().to_string(),
                    reason: "stopped while starting".to_string(),
                })
            }
        }
    }

    /// Gracefully close and unregister. `Ok(None)` when nothing was registered.
    pub async fn stop_session(&self, credential: &Credential) -> Result<Option<SessionHandle>> {
        let key = credential.fingerprint();
        let slot = {
            let mut slots = self.slots.lock().await;
            match slots.get(key) {
                None => return Ok(None),
                Some(slot) if slot.kind == SessionKind::Primary => {
                    return Err(Error::InvalidCommandArgument(
                        "the primary session cannot be stopped".to_string(),
                    ));
                }
                Some(_) => {}
            }
            slots.remove(key)
        };

        let Some(slot) = slot else {
            return Ok(None);
        };
        if let Some(rt) = &slot.runtime {
            rt.shutdown().await;
        }
        tracing::info!(session = %key, "session stopped");

        let mut handle = slot.handle(key);
        handle.state = SessionState::Stopped;
        Ok(Some(handle))
    }

    /// All registered sessions, oldest first.
    pub async fn list_sessions(&self) -> Vec<SessionHandle> {
        let slots = self.slots.lock().await;
        let mut out: Vec<SessionHandle> = slots.iter().map(|(k, s)| s.handle(k)).collect();
        out.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.label.cmp(&b.label)));
        out
    }

    pub async fn get(&self, credential: &Credential) -> Option<SessionHandle> {
        let slots = self.slots.lock().await;
        slots
            .get(credential.fingerprint())
            .map(|s| s.handle(credential.fingerprint()))
    }

    pub async fn active_count(&self) -> usize {
        let slots = self.slots.lock().await;
        slots
            .values()
            .filter(|s| s.effective_state().is_active())
            .count()
    }

    /// Outbound port of the running primary session, if any.
    pub async fn primary_messenger(&self) -> Option<Arc<dyn MessagingPort>> {
        let slots = self.slots.lock().await;
        slots
            .values()
            .filter(|s| s.kind == SessionKind::Primary)
            .filter(|s| s.effective_state() == SessionState::Running)
            .find_map(|s| s.runtime.as_ref().map(|rt| rt.messenger()))
    }

    /// Stop and unregister every session, primary included.
    pub async fn shutdown_all(&self) {
        let drained: Vec<(String, Slot)> = self.slots.lock().await.drain().collect();
        for (key, slot) in drained {
            if let Some(rt) = slot.runtime {
                rt.shutdown().await;
                tracing::info!(session = %key, "session stopped");
            }
        }
    }

    async fn transition(&self, key: &str, state: SessionState) {
        if let Some(slot) = self.slots.lock().await.get_mut(key) {
            slot.state = state;
        }
    }
}
