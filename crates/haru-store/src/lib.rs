//! # haru-store
//!
//! Local warm-start cache for the Haruhancut client, backed by SQLite.
//!
//! The store keeps three independent slots: the last known user, the last
//! known group and the notification preference. It is never a source of
//! truth. [`LocalCache`] is the handle the sync layer talks to; it absorbs
//! every failure so a broken cache can only cost a cold start.

pub mod cache;
pub mod database;
pub mod migrations;
pub mod slots;

mod error;

pub use cache::LocalCache;
pub use database::Database;
pub use error::StoreError;
