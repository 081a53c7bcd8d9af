//! v001 -- Initial schema.
//!
//! A single key-value table. Each row is one cache slot holding a JSON
//! document in its wire shape.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS cache_slots (
    key        TEXT PRIMARY KEY NOT NULL,
    value      TEXT NOT NULL,              -- JSON
    updated_at TEXT NOT NULL               -- RFC-3339
);
"#;

pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}
