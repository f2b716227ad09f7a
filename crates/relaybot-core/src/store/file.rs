use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};

use crate::{
    audit::AuditRecord,
    domain::{Sender, UserId, UserProfile},
    errors::Error,
    store::{merge_profile, Store},
    Result,
};

const PROFILES_FILE: &str = "profiles.json";
const SETTINGS_FILE: &str = "settings.json";
const AUDIT_FILE: &str = "audit.jsonl";

struct Documents {
    profiles: BTreeMap<UserId, UserProfile>,
    settings: BTreeMap<String, String>,
}

/// JSON-file store rooted at a data directory.
///
/// Profiles and settings are held in memory and rewritten atomically (temp
/// file + rename) after each mutation, under the same lock that guards the
/// in-memory copy. A mutation whose write fails is rolled back, so memory
/// never holds state the disk does not. The audit log is append-only JSON
/// lines.
///
/// Every profile write serializes the whole document. `refresh_profile` only
/// writes when a name or handle changed; `last_seen_at` alone stays in memory
/// until the next write.
pub struct FileStore {
    dir: PathBuf,
    docs: Mutex<Documents>,
    audit_lock: Mutex<()>,
}

impl FileStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        let profiles: Vec<UserProfile> = read_json(&dir.join(PROFILES_FILE)).await?;
        let settings: BTreeMap<String, String> = read_json(&dir.join(SETTINGS_FILE)).await?;

        tracing::info!(
            dir = %dir.display(),
            profiles = profiles.len(),
            "opened file store"
        );

        Ok(Self {
            dir,
            docs: Mutex::new(Documents {
                profiles: profiles.into_iter().map(|p| (p.id, p)).collect(),
                settings,
            }),
            audit_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read back the whole audit log, oldest first.
    pub async fn read_audit(&self) -> Result<Vec<AuditRecord>> {
        let _guard = self.audit_lock.lock().await;
        let path = self.dir.join(AUDIT_FILE);
        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(Error::from))
            .collect()
    }

    /// Write profiles; on failure put `previous` back under `id`.
    async fn commit_profile(
        &self,
        docs: &mut Documents,
        id: UserId,
        previous: Option<UserProfile>,
    ) -> Result<()> {
        let written = {
            let list: Vec<&UserProfile> = docs.profiles.values().collect();
            write_json_atomic(&self.dir.join(PROFILES_FILE), &list).await
        };
        if written.is_err() {
            match previous {
                Some(p) => docs.profiles.insert(id, p),
                None => docs.profiles.remove(&id),
            };
        }
        written
    }

    /// Write settings; on failure put `previous` back under `key`.
    async fn commit_setting(
        &self,
        docs: &mut Documents,
        key: &str,
        previous: Option<String>,
    ) -> Result<()> {
        let written = write_json_atomic(&self.dir.join(SETTINGS_FILE), &docs.settings).await;
        if written.is_err() {
            match previous {
                Some(v) => docs.settings.insert(key.to_string(), v),
                None => docs.settings.remove(key),
            };
        }
        written
    }
}

#[async_trait]
impl Store for FileStore {
    async fn find_profile(&self, id: UserId) -> Result<Option<UserProfile>> {
        Ok(self.docs.lock().await.profiles.get(&id).cloned())
    }

    async fn refresh_profile(&self, sender: &Sender) -> Result<UserProfile> {
        let mut docs = self.docs.lock().await;
        let previous = docs.profiles.get(&sender.id).cloned();
        let identity_changed = previous.as_ref().map_or(true, |p| {
            p.first_name != sender.first_name || p.username != sender.username
        });
        let merged = merge_profile(previous.clone(), sender);
        docs.profiles.insert(sender.id, merged.clone());
        if identity_changed {
            self.commit_profile(&mut docs, sender.id, previous).await?;
        }
        Ok(merged)
    }

    async fn set_banned(&self, id: UserId, banned: bool) -> Result<()> {
        let mut docs = self.docs.lock().await;
        let previous = docs.profiles.get(&id).cloned();
        docs.profiles
            .entry(id)
            .or_insert_with(|| UserProfile::placeholder(id, Utc::now()))
            .banned = banned;
        self.commit_profile(&mut docs, id, previous).await
    }

    async fn scan_profiles(&self) -> Result<Vec<UserProfile>> {
        Ok(self.docs.lock().await.profiles.values().cloned().collect())
    }

    async fn append_audit(&self, record: AuditRecord) -> Result<()> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.audit_lock.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(AUDIT_FILE))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.docs.lock().await.settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: Option<&str>) -> Result<()> {
        let mut docs = self.docs.lock().await;
        let previous = match value {
            Some(v) => docs.settings.insert(key.to_string(), v.to_string()),
            None => docs.settings.remove(key),
        };
        self.commit_setting(&mut docs, key, previous).await
    }
}

async fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => Ok(T::default()),
        Ok(content) => serde_json::from_str(&content)
            .map_err(|e| Error::Store(format!("{} is corrupt: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn sender(id: i64) -> Sender {
        Sender {
            id: UserId(id),
            first_name: format!("user{id}"),
            username: Some(format!("handle{id}")),
        }
    }

    #[tokio::test]
    async fn profiles_and_settings_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = FileStore::open(dir.path()).await.unwrap();
            store.refresh_profile(&sender(42)).await.unwrap();
            store.refresh_profile(&sender(7)).await.unwrap();
            store.set_banned(UserId(7), true).await.unwrap();
            store
                .set_setting("welcome_message", Some("hi {name}"))
                .await
                .unwrap();
        }

        let store = FileStore::open(dir.path()).await.unwrap();
        let profiles = store.scan_profiles().await.unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].id, UserId(7));
        assert!(profiles[0].banned);
        assert_eq!(profiles[1].username.as_deref(), Some("handle42"));
        assert_eq!(
            store.get_setting("welcome_message").await.unwrap().as_deref(),
            Some("hi {name}")
        );
    }

    #[tokio::test]
    async fn audit_is_appended_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        assert!(store.read_audit().await.unwrap().is_empty());

        store
            .append_audit(AuditRecord::inbound(UserId(1), "hello"))
            .await
            .unwrap();
        store
            .append_audit(AuditRecord::operator_reply(UserId(1), "hi there"))
            .await
            .unwrap();

        let records = store.read_audit().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].content, "hi there");

        let raw = std::fs::read_to_string(dir.path().join(AUDIT_FILE)).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        let store = FileStore::open(&root).await.unwrap();
        store.refresh_profile(&sender(42)).await.unwrap();
        store.set_setting("welcome_message", Some("hi")).await.unwrap();
        std::fs::remove_dir_all(&root).unwrap();

        assert!(store.set_banned(UserId(7), true).await.is_err());
        assert!(store.find_profile(UserId(7)).await.unwrap().is_none());

        assert!(store.set_banned(UserId(42), true).await.is_err());
        assert!(!store.find_profile(UserId(42)).await.unwrap().unwrap().banned);

        let renamed = Sender {
            first_name: "Renamed".to_string(),
            ..sender(42)
        };
        assert!(store.refresh_profile(&renamed).await.is_err());
        assert_eq!(
            store.find_profile(UserId(42)).await.unwrap().unwrap().first_name,
            "user42"
        );

        assert!(store.set_setting("welcome_message", None).await.is_err());
        assert_eq!(
            store.get_setting("welcome_message").await.unwrap().as_deref(),
            Some("hi")
        );
    }

    #[tokio::test]
    async fn unchanged_sender_does_not_rewrite_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let path = dir.path().join(PROFILES_FILE);

        let first = store.refresh_profile(&sender(42)).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        let again = store.refresh_profile(&sender(42)).await.unwrap();
        assert!(!path.exists());
        assert!(again.last_seen_at >= first.last_seen_at);

        let renamed = Sender {
            first_name: "Renamed".to_string(),
            ..sender(42)
        };
        store.refresh_profile(&renamed).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_refreshes_never_undo_a_ban() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
        store.refresh_profile(&sender(7)).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..40 {
            let task_store = store.clone();
            tasks.push(tokio::spawn(async move {
                let s = Sender {
                    first_name: format!("name{i}"),
                    ..sender(7)
                };
                task_store.refresh_profile(&s).await.unwrap();
            }));
            if i == 20 {
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
        drop(store);
        let reopened = FileStore::open(dir.path()).await.unwrap();
        assert!(reopened.find_profile(UserId(7)).await.unwrap().unwrap().banned);
    }

    #[tokio::test]
    async fn corrupt_profiles_file_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PROFILES_FILE), "{not json").unwrap();
        let err = FileStore::open(dir.path()).await.err().unwrap();
        assert!(matches!(err, Error::Store(_)));
    }
}
