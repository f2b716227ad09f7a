use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::{
    audit::AuditRecord,
    domain::{Sender, UserId, UserProfile},
    store::{merge_profile, Store},
    Result,
};

#[derive(Default)]
struct Collections {
    profiles: BTreeMap<UserId, UserProfile>,
    audit: Vec<AuditRecord>,
    settings: BTreeMap<String, String>,
}

/// In-process store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the audit log, oldest first.
    pub async fn audit_records(&self) -> Vec<AuditRecord> {
        self.inner.lock().await.audit.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_profile(&self, id: UserId) -> Result<Option<UserProfile>> {
        Ok(self.inner.lock().await.profiles.get(&id).cloned())
    }

    async fn refresh_profile(&self, sender: &Sender) -> Result<UserProfile> {
        let mut c = self.inner.lock().await;
        let merged = merge_profile(c.profiles.remove(&sender.id), sender);
        c.profiles.insert(sender.id, merged.clone());
        Ok(merged)
    }

    async fn set_banned(&self, id: UserId, banned: bool) -> Result<()> {
        let mut c = self.inner.lock().await;
        c.profiles
            .entry(id)
            .or_insert_with(|| UserProfile::placeholder(id, Utc::now()))
            .banned = banned;
        Ok(())
    }

    async fn scan_profiles(&self) -> Result<Vec<UserProfile>> {
        Ok(self.inner.lock().await.profiles.values().cloned().collect())
    }

    async fn append_audit(&self, record: AuditRecord) -> Result<()> {
        self.inner.lock().await.audit.push(record);
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().await.settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: Option<&str>) -> Result<()> {
        let mut c = self.inner.lock().await;
        match value {
            Some(v) => c.settings.insert(key.to_string(), v.to_string()),
            None => c.settings.remove(key),
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn sender(id: i64, name: &str) -> Sender {
        Sender {
            id: UserId(id),
            first_name: name.to_string(),
            username: None,
        }
    }

    #[tokio::test]
    async fn refresh_keeps_ban_and_join_time() {
        let store = MemoryStore::new();
        let first = store.refresh_profile(&sender(7, "Old")).await.unwrap();
        store.set_banned(UserId(7), true).await.unwrap();

        let again = store.refresh_profile(&sender(7, "New")).await.unwrap();
        assert!(again.banned);
        assert_eq!(again.first_name, "New");
        assert_eq!(again.joined_at, first.joined_at);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_refreshes_never_undo_a_ban() {
        let store = Arc::new(MemoryStore::new());
        store.refresh_profile(&sender(7, "Eve")).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..200 {
            let task_store = store.clone();
            tasks.push(tokio::spawn(async move {
                task_store
                    .refresh_profile(&sender(7, &format!("Eve{i}")))
                    .await
                    .unwrap();
            }));
            if i == 100 {
                let store = store.clone();
                tasks.push(tokio::spawn(async move {
                    store.set_banned(UserId(7), true).await.unwrap();
                }));
            }
        }
        for t in tasks {
            t.await.unwrap();
        }

        assert!(store.find_profile(UserId(7)).await.unwrap().unwrap().banned);
    }

    #[tokio::test]
    async fn set_banned_upserts_placeholder() {
        let store = MemoryStore::new();
        store.set_banned(UserId(3), true).await.unwrap();
        let p = store.find_profile(UserId(3)).await.unwrap().unwrap();
        assert!(p.banned);
        assert_eq!(p.display_name(), "Unknown");
    }

    #[tokio::test]
    async fn scan_is_ordered_by_id() {
        let store = MemoryStore::new();
        for id in [30, 10, 20] {
            store.refresh_profile(&sender(id, "u")).await.unwrap();
        }
        let ids: Vec<i64> = store
            .scan_profiles()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id.0)
            .collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn settings_set_and_clear() {
        let store = MemoryStore::new();
        store.set_setting("k", Some("v")).await.unwrap();
        assert_eq!(store.get_setting("k").await.unwrap().as_deref(), Some("v"));
        store.set_setting("k", None).await.unwrap();
        assert!(store.get_setting("k").await.unwrap().is_none());
    }
}
