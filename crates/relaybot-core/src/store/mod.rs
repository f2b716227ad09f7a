//! Persistence port: user profiles, the audit log and singleton settings.

mod file;
mod memory;

use async_trait::async_trait;

use crate::{
    audit::AuditRecord,
    domain::{Sender, UserId, UserProfile},
    Result,
};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Setting key of the operator-configured welcome template.
pub const WELCOME_MESSAGE_KEY: &str = "welcome_message";
/// Setting key overriding the scheduled broadcast text.
pub const DAILY_MESSAGE_KEY: &str = "daily_message";

/// Key-value/lookup storage shared by every session.
///
/// Each method is atomic with respect to the others. Profile writes are
/// partial-field upserts so a profile refresh can never undo a concurrent ban.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_profile(&self, id: UserId) -> Result<Option<UserProfile>>;

    /// Create the profile or update its name, handle and last-seen time.
    /// `banned` and `joined_at` are left untouched on existing profiles.
    async fn refresh_profile(&self, sender: &Sender) -> Result<UserProfile>;

    /// Set only the ban flag, creating a placeholder profile if absent.
    async fn set_banned(&self, id: UserId, banned: bool) -> Result<()>;

    /// All profiles, ascending by user id.
    async fn scan_profiles(&self) -> Result<Vec<UserProfile>>;

    async fn append_audit(&self, record: AuditRecord) -> Result<()>;

    async fn get_setting(&self, key: &str) -> Result<Option<String>>;

    /// Store a setting; `None` removes it.
    async fn set_setting(&self, key: &str, value: Option<&str>) -> Result<()>;
}

/// Merge an inbound sender into an existing profile (or a fresh one).
fn merge_profile(existing: Option<UserProfile>, sender: &Sender) -> UserProfile {
    let now = chrono::Utc::now();
    match existing {
        Some(mut p) => {
            p.first_name = sender.first_name.clone();
            p.username = sender.username.clone();
            p.last_seen_at = now;
            p
        }
        None => UserProfile::new(sender, now),
    }
}
