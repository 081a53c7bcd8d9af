//! Sync configuration loaded from environment variables.
//!
//! Every setting has a default so a session can start with zero
//! configuration.

use std::path::PathBuf;

use haru_shared::constants::{
    DEFAULT_BUCKET_UTC_OFFSET_SECS, DEFAULT_INVITE_CODE_ATTEMPTS, DEFAULT_INVITE_CODE_LEN,
    DEFAULT_MIN_GROUP_NAME_LEN,
};
use haru_shared::BucketCalendar;
use haru_store::database::{default_path, DB_FILE_NAME};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Fixed UTC offset of the calendar that buckets posts and decides
    /// "today".
    /// Env: `HARU_BUCKET_UTC_OFFSET` (seconds east of UTC)
    /// Default: `32400` (UTC+09:00)
    pub bucket_utc_offset_secs: i32,

    /// Env: `HARU_CACHE_PATH`
    /// Default: `haru.db` in the platform data directory.
    pub cache_path: PathBuf,

    /// Env: `HARU_INVITE_CODE_LEN`
    /// Default: `6`
    pub invite_code_len: usize,

    /// Draws before giving up on finding an unused invite code.
    /// Env: `HARU_INVITE_CODE_ATTEMPTS`
    /// Default: `5`
    pub invite_code_attempts: u32,

    /// Env: `HARU_MIN_GROUP_NAME_LEN`
    /// Default: `2`
    pub min_group_name_len: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bucket_utc_offset_secs: DEFAULT_BUCKET_UTC_OFFSET_SECS,
            cache_path: default_path().unwrap_or_else(|_| PathBuf::from(DB_FILE_NAME)),
            invite_code_len: DEFAULT_INVITE_CODE_LEN,
            invite_code_attempts: DEFAULT_INVITE_CODE_ATTEMPTS,
            min_group_name_len: DEFAULT_MIN_GROUP_NAME_LEN,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("HARU_BUCKET_UTC_OFFSET") {
            match val.trim().parse::<i32>() {
                Ok(secs) if secs.abs() < 86_400 => config.bucket_utc_offset_secs = secs,
                _ => tracing::warn!(value = %val, "Invalid HARU_BUCKET_UTC_OFFSET, using default"),
            }
        }

        if let Some(path) = lookup("HARU_CACHE_PATH") {
            if !path.is_empty() {
                config.cache_path = PathBuf::from(path);
            }
        }

        if let Some(val) = lookup("HARU_INVITE_CODE_LEN") {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.invite_code_len = n,
                _ => tracing::warn!(value = %val, "Invalid HARU_INVITE_CODE_LEN, using default"),
            }
        }

        if let Some(val) = lookup("HARU_INVITE_CODE_ATTEMPTS") {
            match val.trim().parse::<u32>() {
                Ok(n) if n > 0 => config.invite_code_attempts = n,
                _ => tracing::warn!(value = %val, "Invalid HARU_INVITE_CODE_ATTEMPTS, using default"),
            }
        }

        if let Some(val) = lookup("HARU_MIN_GROUP_NAME_LEN") {
            match val.trim().parse::<usize>() {
                Ok(n) => config.min_group_name_len = n,
                Err(_) => tracing::warn!(value = %val, "Invalid HARU_MIN_GROUP_NAME_LEN, using default"),
            }
        }

        config
    }

    pub fn calendar(&self) -> BucketCalendar {
        BucketCalendar::from_offset_secs(self.bucket_utc_offset_secs)
    }
}
