//! Mutation operations: remote writes followed by an optimistic update of
//! the session state.
//!
//! Each operation captures the user and group it started with. The
//! optimistic update is applied only if the state still refers to them, so
//! a result that lands after a sign-out or a group switch is discarded.

mod comments;
mod group;
mod posts;
mod profile;

use std::sync::Arc;

use haru_shared::{BucketCalendar, DateKey, GroupId, Post, User};

use crate::config::SyncConfig;
use crate::engine::Backend;
use crate::error::MutationError;
use crate::state::SessionState;

pub use group::CreatedGroup;

pub struct Mutations {
    backend: Backend,
    state: Arc<SessionState>,
    config: SyncConfig,
    calendar: BucketCalendar,
}

impl Mutations {
    pub fn new(backend: Backend, state: Arc<SessionState>, config: SyncConfig) -> Self {
        let calendar = config.calendar();
        Self {
            backend,
            state,
            config,
            calendar,
        }
    }

    fn current_user(&self) -> Option<User> {
        (*self.state.user.get()).clone()
    }

    /// The user and group a post or comment write targets.
    fn post_context(&self) -> Result<(User, GroupId), MutationError> {
        let user = self.current_user().ok_or(MutationError::NotSignedIn)?;
        let group_id = user.group_id.clone().ok_or(MutationError::NoGroup)?;
        Ok((user, group_id))
    }

    /// Date bucket holding `post`. Falls back to the bucket its creation
    /// time maps to when the post is not in the current state.
    fn bucket_of(&self, group_id: &GroupId, post: &Post) -> DateKey {
        (*self.state.group.get())
            .as_ref()
            .filter(|g| &g.group_id == group_id)
            .and_then(|g| g.find_post(&post.post_id).map(|(key, _)| key.clone()))
            .unwrap_or_else(|| self.calendar.date_key(post.created_at))
    }

    fn save_group_if_current(&self, group_id: &GroupId) {
        if let Some(group) = (*self.state.group.get()).as_ref() {
            if &group.group_id == group_id {
                self.backend.cache.save_group(group);
            }
        }
    }
}
