//! Sync engine: live subscriptions to the signed-in user, their group and
//! every other member, reconciled into [`SessionState`] and written through
//! to the local cache.
//!
//! Each subscription runs as its own task and applies its snapshots one at
//! a time. Subscriptions carry an id; a snapshot is applied only while the
//! registry still holds that id, and the check and the apply happen under
//! the registry lock. Tearing a subscription down therefore stops its
//! callbacks immediately, even if its task has not been cancelled yet.
//!
//! Cache writes decided under the registry lock are staged with a sequence
//! number and written after the lock is released, so disk latency never
//! holds up other subscriptions. A staged write older than the last one
//! written to the same slot is skipped.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::StreamExt;
use haru_shared::{paths, BucketCalendar, Group, GroupId, Uid, User, Wire};
use haru_store::LocalCache;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::{RemoteError, SyncError};
use crate::events::{emit_event, SessionEvent, EVENT_CHANNEL_CAPACITY};
use crate::mutations::Mutations;
use crate::remote::{AuthProvider, BlobStore, RemoteStore, SnapshotStream};
use crate::state::{SessionSnapshot, SessionState};

/// Collaborators, constructed once at start-up and shared by the engine
/// and the mutation operations.
#[derive(Clone)]
pub struct Backend {
    pub remote: Arc<dyn RemoteStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub cache: Arc<LocalCache>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionPhase {
    Unsubscribed,
    /// Opened, no snapshot applied yet.
    Subscribing,
    Active,
    /// The path vanished or access was denied. Terminal.
    Error,
}

#[derive(Debug, Clone)]
enum Target {
    OwnUser(Uid),
    Group(GroupId),
    Member(Uid),
}

impl Target {
    fn path(&self) -> String {
        match self {
            Self::OwnUser(uid) | Self::Member(uid) => paths::user(uid),
            Self::Group(gid) => paths::group(gid),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

type Snapshot = Result<Option<Value>, RemoteError>;

struct Subscription {
    id: u64,
    phase: SubscriptionPhase,
    task: JoinHandle<()>,
}

impl Subscription {
    fn dispose(self) {
        self.task.abort();
    }
}

#[derive(Debug)]
enum CacheWrite {
    SaveUser(User),
    RemoveUser,
    SaveGroup(Group),
    RemoveGroup,
}

impl CacheWrite {
    fn run(self, cache: &LocalCache) {
        match self {
            Self::SaveUser(user) => cache.save_user(&user),
            Self::RemoveUser => cache.remove_user(),
            Self::SaveGroup(group) => cache.save_group(&group),
            Self::RemoveGroup => cache.remove_group(),
        }
    }
}

/// Sequence number of the last write that reached each cache slot.
#[derive(Default)]
struct CacheVersions {
    user: u64,
    group: u64,
}

impl CacheVersions {
    fn slot_mut(&mut self, write: &CacheWrite) -> &mut u64 {
        match write {
            CacheWrite::SaveUser(_) | CacheWrite::RemoveUser => &mut self.user,
            CacheWrite::SaveGroup(_) | CacheWrite::RemoveGroup => &mut self.group,
        }
    }
}

type StagedWrites = Vec<(u64, CacheWrite)>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    own_user: Option<(Uid, Subscription)>,
    group: Option<(GroupId, Subscription)>,
    members: BTreeMap<Uid, Subscription>,
    next_write: u64,
    staged: StagedWrites,
}

impl Registry {
    fn stage(&mut self, write: CacheWrite) {
        self.next_write += 1;
        self.staged.push((self.next_write, write));
    }

    fn stage_purge(&mut self) {
        self.stage(CacheWrite::RemoveUser);
        self.stage(CacheWrite::RemoveGroup);
    }

    fn take_staged(&mut self) -> StagedWrites {
        std::mem::take(&mut self.staged)
    }

    fn get_mut(&mut self, target: &Target) -> Option<&mut Subscription> {
        match target {
            Target::OwnUser(uid) => self
                .own_user
                .as_mut()
                .filter(|(u, _)| u == uid)
                .map(|(_, s)| s),
            Target::Group(gid) => self
                .group
                .as_mut()
                .filter(|(g, _)| g == gid)
                .map(|(_, s)| s),
            Target::Member(uid) => self.members.get_mut(uid),
        }
    }

    fn is_current(&mut self, target: &Target, id: u64) -> bool {
        self.get_mut(target).is_some_and(|s| s.id == id)
    }

    fn set_phase(&mut self, target: &Target, phase: SubscriptionPhase) {
        if let Some(sub) = self.get_mut(target) {
            sub.phase = phase;
        }
    }

    fn self_uid(&self) -> Option<&Uid> {
        self.own_user.as_ref().map(|(uid, _)| uid)
    }
}

struct Shared {
    backend: Backend,
    state: Arc<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    registry: Mutex<Registry>,
    cache_versions: Mutex<CacheVersions>,
    forced_end_fired: AtomicBool,
    opened: AtomicUsize,
}

pub struct SyncEngine {
    shared: Arc<Shared>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(backend: Backend, config: SyncConfig) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                backend,
                state: Arc::new(SessionState::new()),
                events,
                registry: Mutex::new(Registry::default()),
                cache_versions: Mutex::new(CacheVersions::default()),
                forced_end_fired: AtomicBool::new(false),
                opened: AtomicUsize::new(0),
            }),
            config,
        }
    }

    pub fn state(&self) -> Arc<SessionState> {
        Arc::clone(&self.shared.state)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.state.snapshot()
    }

    pub fn calendar(&self) -> BucketCalendar {
        self.config.calendar()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn mutations(&self) -> Mutations {
        Mutations::new(
            self.shared.backend.clone(),
            Arc::clone(&self.shared.state),
            self.config.clone(),
        )
    }

    /// Start a session for the signed-in user.
    ///
    /// The cached snapshot is loaded into the state first, so projections
    /// work before the network answers; the live subscriptions open after
    /// and supersede it. Must be called from within a Tokio runtime.
    pub fn bootstrap(&self) -> Result<(), SyncError> {
        let shared = &self.shared;
        let uid = shared
            .backend
            .auth
            .current_uid()
            .ok_or(SyncError::NotSignedIn)?;

        let mut reg = shared.lock_registry();
        shared.teardown_all(&mut reg);
        shared.forced_end_fired.store(false, Ordering::SeqCst);

        let cache = &shared.backend.cache;
        let cached_user = match cache.load_user() {
            Some(user) if user.uid == uid => Some(user),
            Some(other) => {
                info!(uid = %uid, cached = %other.uid, "cached session belongs to another user, discarding");
                reg.stage_purge();
                None
            }
            None => None,
        };
        let cached_group = cached_user
            .as_ref()
            .and_then(|u| u.group_id.as_ref())
            .and_then(|gid| cache.load_group().filter(|g| &g.group_id == gid));

        info!(
            uid = %uid,
            cached_user = cached_user.is_some(),
            cached_group = cached_group.is_some(),
            "bootstrapping session"
        );

        shared.state.group.replace(cached_group);
        shared.state.roster.replace(BTreeMap::new());
        shared.state.user.replace(cached_user.clone());
        if let Some(user) = &cached_user {
            shared.state.sync_self_into_roster(user);
        }

        let sub = shared.open(&mut reg, Target::OwnUser(uid.clone()));
        reg.own_user = Some((uid, sub));
        if let Some(user) = &cached_user {
            shared.follow_group(&mut reg, user);
        }
        let staged = reg.take_staged();
        drop(reg);
        shared.write_cache(staged);
        Ok(())
    }

    /// User-initiated sign-out. Does not emit
    /// [`SessionEvent::ForcedSessionEnded`].
    pub fn sign_out(&self) -> Result<(), SyncError> {
        let shared = &self.shared;
        let staged = {
            let mut reg = shared.lock_registry();
            shared.teardown_all(&mut reg);
            reg.stage_purge();
            reg.take_staged()
        };
        shared.state.clear();
        shared.write_cache(staged);
        shared.backend.auth.sign_out()?;
        info!("signed out");
        Ok(())
    }

    /// Close every subscription. State and cache are left as they are.
    pub fn shutdown(&self) {
        let mut reg = self.shared.lock_registry();
        self.shared.teardown_all(&mut reg);
    }

    pub fn own_user_phase(&self) -> SubscriptionPhase {
        let reg = self.shared.lock_registry();
        reg.own_user
            .as_ref()
            .map_or(SubscriptionPhase::Unsubscribed, |(_, s)| s.phase)
    }

    pub fn group_phase(&self) -> SubscriptionPhase {
        let reg = self.shared.lock_registry();
        reg.group
            .as_ref()
            .map_or(SubscriptionPhase::Unsubscribed, |(_, s)| s.phase)
    }

    pub fn member_phase(&self, uid: &Uid) -> SubscriptionPhase {
        let reg = self.shared.lock_registry();
        reg.members
            .get(uid)
            .map_or(SubscriptionPhase::Unsubscribed, |s| s.phase)
    }

    /// Uids with a member subscription, the signed-in user excluded.
    pub fn member_subscriptions(&self) -> Vec<Uid> {
        self.shared.lock_registry().members.keys().cloned().collect()
    }

    /// Subscriptions opened over the engine's lifetime.
    pub fn subscriptions_opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run staged writes in order, skipping any that a later write to the
    /// same slot already superseded.
    fn write_cache(&self, staged: StagedWrites) {
        if staged.is_empty() {
            return;
        }
        let mut versions = self
            .cache_versions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (seq, write) in staged {
            let last = versions.slot_mut(&write);
            if seq <= *last {
                debug!(seq, ?write, "cache write superseded, skipping");
                continue;
            }
            *last = seq;
            write.run(&self.backend.cache);
        }
    }

    fn open(self: &Arc<Self>, reg: &mut Registry, target: Target) -> Subscription {
        reg.next_id += 1;
        let id = reg.next_id;
        let path = target.path();
        let stream = self.backend.remote.subscribe(&path);
        let task = tokio::spawn(run_subscription(Arc::clone(self), target, id, stream));
        self.opened.fetch_add(1, Ordering::SeqCst);
        info!(path = %path, id, "subscription opened");
        Subscription {
            id,
            phase: SubscriptionPhase::Subscribing,
            task,
        }
    }

    fn teardown_all(&self, reg: &mut Registry) {
        if let Some((uid, sub)) = reg.own_user.take() {
            debug!(uid = %uid, "closing own user subscription");
            sub.dispose();
        }
        if let Some((gid, sub)) = reg.group.take() {
            debug!(group_id = %gid, "closing group subscription");
            sub.dispose();
        }
        for (_, sub) in std::mem::take(&mut reg.members) {
            sub.dispose();
        }
    }

    /// Close the group subscription and everything that hangs off it.
    fn teardown_group(&self, reg: &mut Registry) {
        let Some((gid, sub)) = reg.group.take() else {
            return;
        };
        sub.dispose();
        for (_, sub) in std::mem::take(&mut reg.members) {
            sub.dispose();
        }
        self.state.group.update(|g| match g {
            Some(g) if g.group_id == gid => Some(None),
            _ => None,
        });
        self.state.roster.replace(BTreeMap::new());
        info!(group_id = %gid, "group subscription closed");
    }

    fn apply(self: &Arc<Self>, target: &Target, id: u64, item: Snapshot) -> Flow {
        let mut reg = self.lock_registry();
        if !reg.is_current(target, id) {
            debug!(path = %target.path(), id, "snapshot for a closed subscription, discarding");
            return Flow::Stop;
        }
        let flow = match target {
            Target::OwnUser(uid) => self.apply_own_user(&mut reg, target, uid, item),
            Target::Group(gid) => self.apply_group(&mut reg, target, gid, item),
            Target::Member(uid) => self.apply_member(&mut reg, target, uid, item),
        };
        let staged = reg.take_staged();
        drop(reg);
        self.write_cache(staged);
        flow
    }

    fn apply_own_user(self: &Arc<Self>, reg: &mut Registry, target: &Target, uid: &Uid, item: Snapshot) -> Flow {
        let value = match item {
            Ok(Some(value)) => value,
            Ok(None) => {
                warn!(uid = %uid, "own user document no longer exists");
                self.force_end(reg, target, uid);
                return Flow::Stop;
            }
            Err(e) => {
                warn!(uid = %uid, error = %e, "own user subscription failed");
                self.force_end(reg, target, uid);
                return Flow::Stop;
            }
        };

        let user = match User::decode(&value) {
            Some(user) if &user.uid == uid => user,
            _ => {
                warn!(uid = %uid, "own user snapshot did not decode, keeping previous");
                return Flow::Continue;
            }
        };

        reg.set_phase(target, SubscriptionPhase::Active);
        debug!(uid = %uid, group_id = ?user.group_id, "own user snapshot applied");
        self.state.user.replace(Some(user.clone()));
        reg.stage(CacheWrite::SaveUser(user.clone()));
        self.follow_group(reg, &user);
        self.state.sync_self_into_roster(&user);
        Flow::Continue
    }

    /// Point the group subscription at `user.group_id`.
    fn follow_group(self: &Arc<Self>, reg: &mut Registry, user: &User) {
        let current = reg.group.as_ref().map(|(gid, _)| gid.clone());
        if current == user.group_id {
            return;
        }
        self.teardown_group(reg);
        match &user.group_id {
            Some(gid) => {
                let sub = self.open(reg, Target::Group(gid.clone()));
                reg.group = Some((gid.clone(), sub));
            }
            None => {
                self.state.group.replace(None);
                self.state.roster.replace(BTreeMap::new());
                reg.stage(CacheWrite::RemoveGroup);
            }
        }
    }

    fn apply_group(self: &Arc<Self>, reg: &mut Registry, target: &Target, gid: &GroupId, item: Snapshot) -> Flow {
        let value = match item {
            Ok(Some(value)) => value,
            Ok(None) => {
                warn!(group_id = %gid, "group document no longer exists");
                self.group_lost(reg, target, gid);
                return Flow::Stop;
            }
            Err(e) => {
                warn!(group_id = %gid, error = %e, "group subscription failed");
                self.group_lost(reg, target, gid);
                return Flow::Stop;
            }
        };

        let group = match Group::decode(&value) {
            Some(group) if &group.group_id == gid => group,
            _ => {
                warn!(group_id = %gid, "group snapshot did not decode, keeping previous");
                return Flow::Continue;
            }
        };

        reg.set_phase(target, SubscriptionPhase::Active);
        debug!(
            group_id = %gid,
            members = group.members.len(),
            days = group.posts_by_date.len(),
            "group snapshot applied"
        );
        self.state.group.replace(Some(group.clone()));
        self.reconcile_roster(reg, &group);
        reg.stage(CacheWrite::SaveGroup(group));
        Flow::Continue
    }

    fn group_lost(&self, reg: &mut Registry, target: &Target, gid: &GroupId) {
        reg.set_phase(target, SubscriptionPhase::Error);
        for (_, sub) in std::mem::take(&mut reg.members) {
            sub.dispose();
        }
        self.state.group.update(|g| match g {
            Some(g) if &g.group_id == gid => Some(None),
            _ => None,
        });
        self.state.roster.replace(BTreeMap::new());
        reg.stage(CacheWrite::RemoveGroup);
    }

    /// Diff the subscribed members against `group.members` and open or
    /// close subscriptions to match. Safe to run on every snapshot.
    fn reconcile_roster(self: &Arc<Self>, reg: &mut Registry, group: &Group) {
        let self_uid = reg.self_uid().cloned();
        let wanted: BTreeSet<&Uid> = group
            .members
            .keys()
            .filter(|uid| Some(*uid) != self_uid.as_ref())
            .collect();

        let removed: Vec<Uid> = reg
            .members
            .keys()
            .filter(|uid| !wanted.contains(uid))
            .cloned()
            .collect();
        let added: Vec<Uid> = wanted
            .iter()
            .filter(|uid| !reg.members.contains_key(**uid))
            .map(|uid| (*uid).clone())
            .collect();

        for uid in &removed {
            if let Some(sub) = reg.members.remove(uid) {
                sub.dispose();
            }
        }
        for uid in &added {
            let sub = self.open(reg, Target::Member(uid.clone()));
            reg.members.insert(uid.clone(), sub);
        }

        self.state.roster.update(|roster| {
            if roster.keys().all(|uid| group.is_member(uid)) {
                return None;
            }
            Some(
                roster
                    .iter()
                    .filter(|(uid, _)| group.is_member(uid))
                    .map(|(uid, user)| (uid.clone(), user.clone()))
                    .collect(),
            )
        });
        if let Some(me) = (*self.state.user.get()).as_ref() {
            self.state.sync_self_into_roster(me);
        }

        if !added.is_empty() || !removed.is_empty() {
            debug!(group_id = %group.group_id, ?added, ?removed, "roster reconciled");
        }
    }

    fn apply_member(&self, reg: &mut Registry, target: &Target, uid: &Uid, item: Snapshot) -> Flow {
        match item {
            Ok(Some(value)) => {
                let Some(user) = User::decode(&value).filter(|u| &u.uid == uid) else {
                    warn!(uid = %uid, "member snapshot did not decode, keeping previous");
                    return Flow::Continue;
                };
                reg.set_phase(target, SubscriptionPhase::Active);
                self.state.roster.update(|roster| {
                    if roster.get(uid) == Some(&user) {
                        return None;
                    }
                    let mut next = roster.clone();
                    next.insert(uid.clone(), user.clone());
                    Some(next)
                });
                Flow::Continue
            }
            other => {
                match other {
                    Err(e) => info!(uid = %uid, error = %e, "member subscription failed, treating as departure"),
                    _ => info!(uid = %uid, "member document gone, treating as departure"),
                }
                reg.set_phase(target, SubscriptionPhase::Error);
                self.state.roster.update(|roster| {
                    roster.get(uid)?;
                    let mut next = roster.clone();
                    next.remove(uid);
                    Some(next)
                });
                Flow::Stop
            }
        }
    }

    /// The backend no longer knows the signed-in user: drop everything,
    /// sign out, and tell the navigation layer once.
    fn force_end(&self, reg: &mut Registry, target: &Target, uid: &Uid) {
        reg.set_phase(target, SubscriptionPhase::Error);
        if let Some((gid, sub)) = reg.group.take() {
            debug!(group_id = %gid, "closing group subscription");
            sub.dispose();
        }
        for (_, sub) in std::mem::take(&mut reg.members) {
            sub.dispose();
        }

        self.state.clear();
        reg.stage_purge();
        if let Err(e) = self.backend.auth.sign_out() {
            warn!(uid = %uid, error = %e, "sign-out during forced session end failed");
        }

        if !self.forced_end_fired.swap(true, Ordering::SeqCst) {
            info!(uid = %uid, "session ended by backend");
            emit_event(&self.events, SessionEvent::ForcedSessionEnded { uid: uid.clone() });
        }
    }
}

async fn run_subscription(shared: Arc<Shared>, target: Target, id: u64, mut stream: SnapshotStream) {
    while let Some(item) = stream.next().await {
        if shared.apply(&target, id, item) == Flow::Stop {
            break;
        }
    }
    debug!(path = %target.path(), id, "subscription task finished");
}
