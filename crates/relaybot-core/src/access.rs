use std::sync::Arc;

use crate::{domain::UserId, errors::Error, store::Store, Result};

/// What the gate answers when the profile lookup itself fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupFailure {
    Allow,
    Deny,
}

/// Per-user allow/deny decision backed by the profile store.
///
/// Users without a profile are allowed. Only `banned = true` denies.
#[derive(Clone)]
pub struct AccessGate {
    store: Arc<dyn Store>,
    on_lookup_failure: LookupFailure,
}

impl AccessGate {
    pub fn new(store: Arc<dyn Store>, on_lookup_failure: LookupFailure) -> Self {
        Self {
            store,
            on_lookup_failure,
        }
    }

    pub async fn is_allowed(&self, id: UserId) -> bool {
        match self.store.find_profile(id).await {
            Ok(Some(p)) => !p.banned,
            Ok(None) => true,
            Err(e) => {
                let allowed = self.on_lookup_failure == LookupFailure::Allow;
                tracing::warn!(user_id = id.0, allowed, "ban lookup failed: {e}");
                allowed
            }
        }
    }

    /// `Err(AccessDenied)` when the user may not use the relay.
    pub async fn check(&self, id: UserId) -> Result<()> {
        if self.is_allowed(id).await {
            Ok(())
        } else {
            Err(Error::AccessDenied(id))
        }
    }

    /// Idempotent; creates a placeholder profile if the user is unknown.
    pub async fn set_banned(&self, id: UserId, banned: bool) -> Result<()> {
        self.store.set_banned(id, banned).await?;
        tracing::info!(user_id = id.0, banned, "ban flag updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{
        audit::AuditRecord,
        domain::{Sender, UserProfile},
        store::MemoryStore,
    };

    struct BrokenStore;

    #[async_trait]
    impl Store for BrokenStore {
        async fn find_profile(&self, _id: UserId) -> Result<Option<UserProfile>> {
            Err(Error::Store("connection refused".to_string()))
        }
        async fn refresh_profile(&self, _sender: &Sender) -> Result<UserProfile> {
            Err(Error::Store("connection refused".to_string()))
        }
        async fn set_banned(&self, _id: UserId, _banned: bool) -> Result<()> {
            Err(Error::Store("connection refused".to_string()))
        }
        async fn scan_profiles(&self) -> Result<Vec<UserProfile>> {
            Err(Error::Store("connection refused".to_string()))
        }
        async fn append_audit(&self, _record: AuditRecord) -> Result<()> {
            Err(Error::Store("connection refused".to_string()))
        }
        async fn get_setting(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::Store("connection refused".to_string()))
        }
        async fn set_setting(&self, _key: &str, _value: Option<&str>) -> Result<()> {
            Err(Error::Store("connection refused".to_string()))
        }
    }

    fn gate() -> AccessGate {
        AccessGate::new(Arc::new(MemoryStore::new()), LookupFailure::Deny)
    }

    #[tokio::test]
    async fn unknown_users_are_allowed() {
        assert!(gate().is_allowed(UserId(1)).await);
    }

    #[tokio::test]
    async fn ban_then_unban() {
        let g = gate();
        g.set_banned(UserId(7), true).await.unwrap();
        assert!(!g.is_allowed(UserId(7)).await);
        assert!(matches!(
            g.check(UserId(7)).await,
            Err(Error::AccessDenied(UserId(7)))
        ));

        // Idempotent.
        g.set_banned(UserId(7), true).await.unwrap();
        assert!(!g.is_allowed(UserId(7)).await);

        g.set_banned(UserId(7), false).await.unwrap();
        assert!(g.is_allowed(UserId(7)).await);
        assert!(g.check(UserId(7)).await.is_ok());
    }

    #[tokio::test]
    async fn lookup_failure_follows_policy() {
        let closed = AccessGate::new(Arc::new(BrokenStore), LookupFailure::Deny);
        assert!(!closed.is_allowed(UserId(1)).await);

        let open = AccessGate::new(Arc::new(BrokenStore), LookupFailure::Allow);
        assert!(open.is_allowed(UserId(1)).await);
    }

    #[tokio::test]
    async fn set_banned_surfaces_store_errors() {
        let g = AccessGate::new(Arc::new(BrokenStore), LookupFailure::Allow);
        assert!(matches!(
            g.set_banned(UserId(1), true).await,
            Err(Error::Store(_))
        ));
    }
}
