//! Best-effort cache of the last session snapshot.
//!
//! Every operation swallows its failure and logs it at `warn`. Callers never
//! see a store error once the cache is open.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use haru_shared::constants::{CACHE_KEY_GROUP, CACHE_KEY_NOTIFICATIONS, CACHE_KEY_USER};
use haru_shared::{Group, User, Wire};
use serde_json::Value;
use tracing::warn;

use crate::database::Database;
use crate::error::Result;

pub struct LocalCache {
    db: Mutex<Database>,
}

impl LocalCache {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        Database::open_at(path).map(Self::new)
    }

    pub fn in_memory() -> Result<Self> {
        Database::open_in_memory().map(Self::new)
    }

    // -- user --

    pub fn save_user(&self, user: &User) {
        self.put(CACHE_KEY_USER, user.encode());
    }

    pub fn load_user(&self) -> Option<User> {
        self.load(CACHE_KEY_USER)
    }

    pub fn remove_user(&self) {
        self.remove(CACHE_KEY_USER);
    }

    // -- group --

    pub fn save_group(&self, group: &Group) {
        self.put(CACHE_KEY_GROUP, group.encode());
    }

    pub fn load_group(&self) -> Option<Group> {
        self.load(CACHE_KEY_GROUP)
    }

    pub fn remove_group(&self) {
        self.remove(CACHE_KEY_GROUP);
    }

    /// Drop the user and group slots. Preferences survive.
    pub fn purge_session(&self) {
        self.remove_user();
        self.remove_group();
    }

    // -- preferences --

    pub fn set_notifications_enabled(&self, enabled: bool) {
        self.put(CACHE_KEY_NOTIFICATIONS, Value::Bool(enabled));
    }

    /// `false` when never set.
    pub fn notifications_enabled(&self) -> bool {
        self.get(CACHE_KEY_NOTIFICATIONS)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    // -- internals --

    fn lock(&self) -> Option<MutexGuard<'_, Database>> {
        match self.db.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                warn!("cache mutex poisoned, skipping");
                None
            }
        }
    }

    fn put(&self, key: &str, value: Value) {
        let Some(db) = self.lock() else { return };
        if let Err(e) = db.put_slot(key, &value) {
            warn!(key, error = %e, "cache write failed");
        }
    }

    fn get(&self, key: &str) -> Option<Value> {
        let db = self.lock()?;
        match db.get_slot(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "cache read failed");
                None
            }
        }
    }

    fn load<T: Wire>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        let decoded = T::decode(&value);
        if decoded.is_none() {
            warn!(key, "cached snapshot no longer decodes, ignoring");
        }
        decoded
    }

    fn remove(&self, key: &str) {
        let Some(db) = self.lock() else { return };
        if let Err(e) = db.delete_slot(key) {
            warn!(key, error = %e, "cache remove failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use haru_shared::{Gender, GroupId, LoginPlatform, Uid};
    use std::collections::BTreeMap;

    fn user() -> User {
        User {
            uid: Uid::from("u1"),
            register_date: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            login_platform: LoginPlatform::Apple,
            nickname: "하루".into(),
            profile_image_url: None,
            fcm_token: None,
            birthday_date: Utc.with_ymd_and_hms(1999, 3, 3, 0, 0, 0).unwrap(),
            gender: Gender::Female,
            is_push_enabled: false,
            group_id: Some(GroupId::from("g1")),
        }
    }

    fn group() -> Group {
        let mut members = BTreeMap::new();
        members.insert(Uid::from("u1"), "2025-06-01T00:00:00Z".to_string());
        Group {
            group_id: GroupId::from("g1"),
            group_name: "가족".into(),
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            host_user_id: Uid::from("u1"),
            invite_code: "QWE123".into(),
            members,
            posts_by_date: BTreeMap::new(),
        }
    }

    #[test]
    fn empty_cache_loads_nothing() {
        let cache = LocalCache::in_memory().unwrap();
        assert_eq!(cache.load_user(), None);
        assert_eq!(cache.load_group(), None);
        assert!(!cache.notifications_enabled());
    }

    #[test]
    fn snapshots_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let cache = LocalCache::open_at(&path).unwrap();
            cache.save_user(&user());
            cache.save_group(&group());
            cache.set_notifications_enabled(true);
        }

        let cache = LocalCache::open_at(&path).unwrap();
        assert_eq!(cache.load_user(), Some(user()));
        assert_eq!(cache.load_group(), Some(group()));
        assert!(cache.notifications_enabled());
    }

    #[test]
    fn purge_session_keeps_preferences() {
        let cache = LocalCache::in_memory().unwrap();
        cache.save_user(&user());
        cache.save_group(&group());
        cache.set_notifications_enabled(true);

        cache.purge_session();

        assert_eq!(cache.load_user(), None);
        assert_eq!(cache.load_group(), None);
        assert!(cache.notifications_enabled());
    }

    #[test]
    fn undecodable_slot_loads_as_none() {
        let cache = LocalCache::in_memory().unwrap();
        cache.put(CACHE_KEY_USER, serde_json::json!({ "uid": "u1" }));
        assert_eq!(cache.load_user(), None);
    }

    #[test]
    fn remove_on_empty_slot_is_silent() {
        let cache = LocalCache::in_memory().unwrap();
        cache.remove_user();
        cache.remove_group();
        assert_eq!(cache.load_user(), None);
    }
}
