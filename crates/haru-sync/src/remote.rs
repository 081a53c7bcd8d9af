//! Collaborator interfaces: the realtime document store, the blob store and
//! the auth provider. Production backends implement these; tests and the
//! simulator use [`crate::memory`].

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use haru_shared::Uid;
use serde_json::{Map, Value};

use crate::error::{AuthError, RemoteError};

/// Stream of full-document values at one path.
///
/// `Ok(None)` means the path currently holds nothing. An `Err` is terminal:
/// the stream ends right after it.
pub type SnapshotStream = BoxStream<'static, Result<Option<Value>, RemoteError>>;

/// Path-addressed realtime document database.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Overwrite the value at `path`. `Value::Null` deletes it.
    async fn set_value(&self, path: &str, value: Value) -> Result<(), RemoteError>;

    async fn read_once(&self, path: &str) -> Result<Option<Value>, RemoteError>;

    /// Partial update. Keys are relative paths and may contain `/`, so
    /// `{"members/u2": ts}` touches one member without rewriting the map.
    /// A `Value::Null` field deletes that child.
    async fn update_fields(&self, path: &str, fields: Map<String, Value>) -> Result<(), RemoteError>;

    async fn delete_value(&self, path: &str) -> Result<(), RemoteError>;

    /// First child of `collection` whose `field` equals `value`, as
    /// `(child key, child value)`.
    async fn find_child(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<(String, Value)>, RemoteError>;

    /// Emits the current value immediately, then on every change. Dropping
    /// the stream unsubscribes.
    fn subscribe(&self, path: &str) -> SnapshotStream;
}

/// Object storage for images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path` and return a download URL.
    async fn upload(&self, bytes: Bytes, path: &str) -> Result<String, RemoteError>;

    async fn delete(&self, path: &str) -> Result<(), RemoteError>;
}

pub trait AuthProvider: Send + Sync {
    fn current_uid(&self) -> Option<Uid>;

    fn is_signed_in(&self) -> bool {
        self.current_uid().is_some()
    }

    fn sign_out(&self) -> Result<(), AuthError>;
}
