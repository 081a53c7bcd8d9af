//! Raw slot access. Values are JSON documents, keyed by a fixed name.

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Insert or overwrite a slot.
    pub fn put_slot(&self, key: &str, value: &Value) -> Result<()> {
        self.conn().execute(
            "INSERT INTO cache_slots (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![
                key,
                value.to_string(),
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            ],
        )?;
        Ok(())
    }

    pub fn get_slot(&self, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM cache_slots WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|text| {
            serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
    }

    /// Returns whether a row was removed.
    pub fn delete_slot(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM cache_slots WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }
}
