//! The in-memory session model: one observable cell per entity.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use haru_shared::{BucketCalendar, Comment, DateKey, Group, GroupId, Post, Uid, User};

use crate::cell::ObservableCell;
use crate::projection;

/// Live session state. Written by the sync engine and by optimistic
/// mutation updates; everything else only reads.
#[derive(Default)]
pub struct SessionState {
    pub user: ObservableCell<Option<User>>,
    pub group: ObservableCell<Option<Group>>,
    /// Current members' user documents, including the signed-in user.
    pub roster: ObservableCell<BTreeMap<Uid, User>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A consistent view of all three cells for projections.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            user: self.user.get(),
            group: self.group.get(),
            roster: self.roster.get(),
        }
    }

    pub fn clear(&self) {
        self.user.replace(None);
        self.group.replace(None);
        self.roster.replace(BTreeMap::new());
    }

    /// Apply `f` to the current group only if it is still `group_id`.
    /// A result that arrives after the group changed is dropped.
    pub(crate) fn update_group_if(&self, group_id: &GroupId, f: impl FnOnce(&mut Group)) -> bool {
        self.group.update(|current| match current {
            Some(g) if &g.group_id == group_id => {
                let mut next = g.clone();
                f(&mut next);
                Some(Some(next))
            }
            _ => None,
        })
    }

    /// Keep the signed-in user's roster entry equal to `me` while they are
    /// a member of the current group, and absent otherwise.
    pub(crate) fn sync_self_into_roster(&self, me: &User) {
        let is_member = (*self.group.get())
            .as_ref()
            .is_some_and(|g| g.is_member(&me.uid));
        self.roster.update(|roster| match (is_member, roster.get(&me.uid)) {
            (true, Some(current)) if current == me => None,
            (true, _) => {
                let mut next = roster.clone();
                next.insert(me.uid.clone(), me.clone());
                Some(next)
            }
            (false, Some(_)) => {
                let mut next = roster.clone();
                next.remove(&me.uid);
                Some(next)
            }
            (false, None) => None,
        });
    }

    /// Apply `f` to the current user only if it is still `uid`.
    pub(crate) fn update_user_if(&self, uid: &Uid, f: impl FnOnce(&mut User)) -> Option<User> {
        let mut updated = None;
        self.user.update(|current| match current {
            Some(u) if &u.uid == uid => {
                let mut next = u.clone();
                f(&mut next);
                updated = Some(next.clone());
                Some(Some(next))
            }
            _ => None,
        });
        updated
    }
}

/// Immutable snapshot of the session. Cheap to take, safe to hold.
#[derive(Clone)]
pub struct SessionSnapshot {
    pub user: Arc<Option<User>>,
    pub group: Arc<Option<Group>>,
    pub roster: Arc<BTreeMap<Uid, User>>,
}

impl SessionSnapshot {
    pub fn user(&self) -> Option<&User> {
        (*self.user).as_ref()
    }

    pub fn group(&self) -> Option<&Group> {
        (*self.group).as_ref()
    }

    pub fn todays_posts(&self, now: DateTime<Utc>, calendar: &BucketCalendar) -> Vec<&Post> {
        self.group()
            .map(|g| projection::todays_posts(g, now, calendar))
            .unwrap_or_default()
    }

    pub fn posts_by_date_key(&self, key: &DateKey) -> Vec<&Post> {
        self.group()
            .map(|g| projection::posts_by_date_key(g, key))
            .unwrap_or_default()
    }

    pub fn posts_by_user_desc(&self, uid: &Uid) -> Vec<&Post> {
        self.group()
            .map(|g| projection::posts_by_user_desc(g, uid))
            .unwrap_or_default()
    }

    /// Sorted around the signed-in user; empty when signed out.
    pub fn roster_sorted_for_display(&self) -> Vec<&User> {
        match self.user() {
            Some(me) => projection::roster_sorted_for_display(&self.roster, &me.uid),
            None => Vec::new(),
        }
    }

    pub fn has_posted_today(&self, uid: &Uid, now: DateTime<Utc>, calendar: &BucketCalendar) -> bool {
        self.group()
            .is_some_and(|g| projection::has_posted_today(g, uid, now, calendar))
    }

    pub fn calendar_thumbnails(&self) -> BTreeMap<DateKey, &Post> {
        self.group()
            .map(projection::calendar_thumbnails)
            .unwrap_or_default()
    }

    pub fn comments_for_display(&self, post: &Post) -> Vec<Comment> {
        projection::comments_for_display(post, &self.roster)
    }
}
