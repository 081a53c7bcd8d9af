//! In-memory collaborators.
//!
//! [`MemoryRemoteStore`] behaves like a realtime database: one JSON tree,
//! path-addressed writes, and watchers that receive the new value at their
//! path whenever a write overlaps it. All three collaborators record their
//! calls and accept injected failures, so sync behaviour can be exercised
//! without a network.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;
use haru_shared::Uid;
use serde_json::{Map, Value};

use crate::error::{AuthError, RemoteError};
use crate::remote::{AuthProvider, BlobStore, RemoteStore, SnapshotStream};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Document store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    Set,
    Read,
    Update,
    Delete,
    Find,
    Subscribe,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    pub op: RemoteOp,
    pub path: String,
}

type Snapshot = Result<Option<Value>, RemoteError>;

struct Watcher {
    path: Vec<String>,
    last: Option<Value>,
    tx: UnboundedSender<Snapshot>,
}

#[derive(Default)]
struct RemoteInner {
    root: Map<String, Value>,
    watchers: Vec<Watcher>,
    failures: HashMap<(RemoteOp, String), RemoteError>,
    calls: Vec<RemoteCall>,
}

#[derive(Clone, Default)]
pub struct MemoryRemoteStore {
    inner: Arc<Mutex<RemoteInner>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write as another client would: watchers fire, no call is recorded.
    pub fn put(&self, path: &str, value: Value) {
        let segs = segments(path);
        let mut inner = lock(&self.inner);
        write_at(&mut inner.root, &segs, value);
        inner.notify(&[segs]);
    }

    /// Delete as another client would.
    pub fn remove(&self, path: &str) {
        self.put(path, Value::Null);
    }

    pub fn value_at(&self, path: &str) -> Option<Value> {
        let inner = lock(&self.inner);
        read_at(&inner.root, &segments(path)).cloned()
    }

    /// Make every future `op` on exactly `path` fail with `err`.
    pub fn fail(&self, op: RemoteOp, path: &str, err: RemoteError) {
        lock(&self.inner).failures.insert((op, path.to_string()), err);
    }

    pub fn clear_failure(&self, op: RemoteOp, path: &str) {
        lock(&self.inner).failures.remove(&(op, path.to_string()));
    }

    /// Terminate every live subscription on `path` with `err`.
    pub fn emit_error(&self, path: &str, err: RemoteError) {
        let segs = segments(path);
        let mut inner = lock(&self.inner);
        inner.watchers.retain(|w| {
            if w.path == segs {
                let _ = w.tx.unbounded_send(Err(err.clone()));
                false
            } else {
                true
            }
        });
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.inner).calls.clone()
    }

    pub fn calls_of(&self, op: RemoteOp) -> Vec<String> {
        lock(&self.inner)
            .calls
            .iter()
            .filter(|c| c.op == op)
            .map(|c| c.path.clone())
            .collect()
    }

    /// How many times `path` has been subscribed to, ever.
    pub fn subscribe_count(&self, path: &str) -> usize {
        lock(&self.inner)
            .calls
            .iter()
            .filter(|c| c.op == RemoteOp::Subscribe && c.path == path)
            .count()
    }

    /// Subscriptions on `path` whose stream is still alive.
    pub fn active_subscriptions(&self, path: &str) -> usize {
        let segs = segments(path);
        let mut inner = lock(&self.inner);
        inner.watchers.retain(|w| !w.tx.is_closed());
        inner.watchers.iter().filter(|w| w.path == segs).count()
    }

    fn begin(&self, op: RemoteOp, path: &str) -> Result<MutexGuard<'_, RemoteInner>, RemoteError> {
        let mut inner = lock(&self.inner);
        inner.calls.push(RemoteCall {
            op,
            path: path.to_string(),
        });
        if let Some(err) = inner.failures.get(&(op, path.to_string())).cloned() {
            return Err(err);
        }
        Ok(inner)
    }
}

impl RemoteInner {
    fn notify(&mut self, changed: &[Vec<String>]) {
        self.watchers.retain(|w| !w.tx.is_closed());
        for w in self.watchers.iter_mut() {
            if !changed.iter().any(|c| c.starts_with(&w.path) || w.path.starts_with(c)) {
                continue;
            }
            let current = read_at(&self.root, &w.path).cloned();
            if current != w.last {
                let _ = w.tx.unbounded_send(Ok(current.clone()));
                w.last = current;
            }
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn set_value(&self, path: &str, value: Value) -> Result<(), RemoteError> {
        let mut inner = self.begin(RemoteOp::Set, path)?;
        let segs = segments(path);
        write_at(&mut inner.root, &segs, value);
        inner.notify(&[segs]);
        Ok(())
    }

    async fn read_once(&self, path: &str) -> Result<Option<Value>, RemoteError> {
        let inner = self.begin(RemoteOp::Read, path)?;
        Ok(read_at(&inner.root, &segments(path)).cloned())
    }

    async fn update_fields(&self, path: &str, fields: Map<String, Value>) -> Result<(), RemoteError> {
        let mut inner = self.begin(RemoteOp::Update, path)?;
        let base = segments(path);
        let mut changed = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            let mut segs = base.clone();
            segs.extend(segments(&key));
            write_at(&mut inner.root, &segs, value);
            changed.push(segs);
        }
        inner.notify(&changed);
        Ok(())
    }

    async fn delete_value(&self, path: &str) -> Result<(), RemoteError> {
        let mut inner = self.begin(RemoteOp::Delete, path)?;
        let segs = segments(path);
        write_at(&mut inner.root, &segs, Value::Null);
        inner.notify(&[segs]);
        Ok(())
    }

    async fn find_child(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<(String, Value)>, RemoteError> {
        let inner = self.begin(RemoteOp::Find, collection)?;
        let Some(Value::Object(children)) = read_at(&inner.root, &segments(collection)) else {
            return Ok(None);
        };
        Ok(children
            .iter()
            .find(|(_, child)| child.get(field).and_then(Value::as_str) == Some(value))
            .map(|(key, child)| (key.clone(), child.clone())))
    }

    fn subscribe(&self, path: &str) -> SnapshotStream {
        let mut inner = match self.begin(RemoteOp::Subscribe, path) {
            Ok(inner) => inner,
            Err(err) => return futures::stream::iter(vec![Err(err)]).boxed(),
        };
        let segs = segments(path);
        let current = read_at(&inner.root, &segs).cloned();
        let (tx, rx) = unbounded();
        let _ = tx.unbounded_send(Ok(current.clone()));
        inner.watchers.push(Watcher {
            path: segs,
            last: current,
            tx,
        });
        rx.boxed()
    }
}

fn segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_at<'a>(root: &'a Map<String, Value>, segs: &[String]) -> Option<&'a Value> {
    let (first, rest) = segs.split_first()?;
    let mut cur = root.get(first)?;
    for seg in rest {
        cur = cur.as_object()?.get(seg)?;
    }
    Some(cur)
}

/// Write `value` at `segs`, creating parents. Null and empty objects are
/// stored as absence, the way the realtime database does.
fn write_at(root: &mut Map<String, Value>, segs: &[String], value: Value) {
    let Some(value) = normalize(value) else {
        remove_at(root, segs);
        return;
    };
    let Some((last, parents)) = segs.split_last() else {
        return;
    };
    let mut cur = root;
    for seg in parents {
        let entry = cur
            .entry(seg.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        cur = next;
    }
    cur.insert(last.clone(), value);
}

fn remove_at(map: &mut Map<String, Value>, segs: &[String]) {
    let Some((first, rest)) = segs.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.remove(first);
        return;
    }
    if let Some(Value::Object(child)) = map.get_mut(first) {
        remove_at(child, rest);
        if child.is_empty() {
            map.remove(first);
        }
    }
}

fn normalize(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| normalize(v).map(|v| (k, v)))
                .collect();
            (!map.is_empty()).then_some(Value::Object(map))
        }
        other => Some(other),
    }
}

// ---------------------------------------------------------------------------
// Blob store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobOp {
    Upload,
    Delete,
}

#[derive(Default)]
struct BlobInner {
    blobs: BTreeMap<String, Bytes>,
    fail_upload: Option<RemoteError>,
    fail_delete: Option<RemoteError>,
    calls: Vec<(BlobOp, String)>,
}

#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<Mutex<BlobInner>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url_for(path: &str) -> String {
        format!("memory://blobs/{path}")
    }

    pub fn fail_uploads(&self, err: Option<RemoteError>) {
        lock(&self.inner).fail_upload = err;
    }

    pub fn fail_deletes(&self, err: Option<RemoteError>) {
        lock(&self.inner).fail_delete = err;
    }

    pub fn contains(&self, path: &str) -> bool {
        lock(&self.inner).blobs.contains_key(path)
    }

    pub fn calls(&self) -> Vec<(BlobOp, String)> {
        lock(&self.inner).calls.clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, bytes: Bytes, path: &str) -> Result<String, RemoteError> {
        let mut inner = lock(&self.inner);
        inner.calls.push((BlobOp::Upload, path.to_string()));
        if let Some(err) = &inner.fail_upload {
            return Err(err.clone());
        }
        inner.blobs.insert(path.to_string(), bytes);
        Ok(Self::url_for(path))
    }

    async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        let mut inner = lock(&self.inner);
        inner.calls.push((BlobOp::Delete, path.to_string()));
        if let Some(err) = &inner.fail_delete {
            return Err(err.clone());
        }
        match inner.blobs.remove(path) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(path.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Auth provider with a fixed signed-in uid until `sign_out`.
#[derive(Default)]
pub struct StaticAuth {
    uid: Mutex<Option<Uid>>,
    sign_outs: AtomicUsize,
}

impl StaticAuth {
    pub fn signed_in(uid: Uid) -> Self {
        Self {
            uid: Mutex::new(Some(uid)),
            sign_outs: AtomicUsize::new(0),
        }
    }

    pub fn sign_in(&self, uid: Uid) {
        *lock(&self.uid) = Some(uid);
    }

    pub fn sign_out_count(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }
}

impl AuthProvider for StaticAuth {
    fn current_uid(&self) -> Option<Uid> {
        lock(&self.uid).clone()
    }

    fn sign_out(&self) -> Result<(), AuthError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        *lock(&self.uid) = None;
        Ok(())
    }
}
