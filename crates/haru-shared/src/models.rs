//! In-memory domain entities.
//!
//! These are the validated shapes the rest of the workspace works with. The
//! loose wire shapes live in [`crate::codec`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::date_key::{BucketCalendar, DateKey};
use crate::types::{CommentId, GroupId, PostId, Uid};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    /// Raw tag stored on the wire.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Male => "남자",
            Self::Female => "여자",
            Self::Other => "비공개",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "남자" => Some(Self::Male),
            "여자" => Some(Self::Female),
            "비공개" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPlatform {
    Kakao,
    Apple,
}

impl LoginPlatform {
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Kakao => "kakao",
            Self::Apple => "apple",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "kakao" => Some(Self::Kakao),
            "apple" => Some(Self::Apple),
            _ => None,
        }
    }
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uid: Uid,
    pub register_date: DateTime<Utc>,
    pub login_platform: LoginPlatform,
    pub nickname: String,
    pub profile_image_url: Option<String>,
    /// Push token, absent until the device registers for notifications.
    pub fcm_token: Option<String>,
    pub birthday_date: DateTime<Utc>,
    pub gender: Gender,
    pub is_push_enabled: bool,
    /// `None` until the user creates or joins a group.
    pub group_id: Option<GroupId>,
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// A shared household. Posts are bucketed by calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub group_id: GroupId,
    pub group_name: String,
    pub created_at: DateTime<Utc>,
    pub host_user_id: Uid,
    pub invite_code: String,
    /// uid -> join timestamp (ISO-8601, kept verbatim from the wire).
    pub members: BTreeMap<Uid, String>,
    pub posts_by_date: BTreeMap<DateKey, BTreeMap<PostId, Post>>,
}

impl Group {
    pub fn is_member(&self, uid: &Uid) -> bool {
        self.members.contains_key(uid)
    }

    /// Every post across every bucket, in no particular order.
    pub fn all_posts(&self) -> impl Iterator<Item = &Post> {
        self.posts_by_date.values().flat_map(|bucket| bucket.values())
    }

    /// Find a post by id regardless of its bucket.
    pub fn find_post(&self, post_id: &PostId) -> Option<(&DateKey, &Post)> {
        self.posts_by_date
            .iter()
            .find_map(|(key, bucket)| bucket.get(post_id).map(|post| (key, post)))
    }

    pub fn find_post_mut(&mut self, post_id: &PostId) -> Option<&mut Post> {
        self.posts_by_date
            .values_mut()
            .find_map(|bucket| bucket.get_mut(post_id))
    }

    /// Insert a post into its bucket, replacing any post with the same id.
    pub fn insert_post(&mut self, key: DateKey, post: Post) {
        self.posts_by_date
            .entry(key)
            .or_default()
            .insert(post.post_id.clone(), post);
    }

    /// Remove a post wherever it lives. Empty buckets are dropped so the
    /// calendar does not show a day without photos.
    pub fn remove_post(&mut self, post_id: &PostId) -> Option<Post> {
        let key = self
            .posts_by_date
            .iter()
            .find(|(_, bucket)| bucket.contains_key(post_id))
            .map(|(key, _)| key.clone())?;
        let bucket = self.posts_by_date.get_mut(&key)?;
        let removed = bucket.remove(post_id);
        if bucket.is_empty() {
            self.posts_by_date.remove(&key);
        }
        removed
    }
}

// ---------------------------------------------------------------------------
// Post
// ---------------------------------------------------------------------------

/// One photo. Author fields are a snapshot taken at upload time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub post_id: PostId,
    pub user_id: Uid,
    pub nickname: String,
    pub profile_image_url: Option<String>,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
    pub like_count: i64,
    pub comments: BTreeMap<CommentId, Comment>,
}

impl Post {
    /// Recomputed on every call, never stored.
    pub fn is_today(&self, now: DateTime<Utc>, calendar: &BucketCalendar) -> bool {
        calendar.is_same_day(self.created_at, now)
    }

    pub fn is_authored_by(&self, uid: &Uid) -> bool {
        &self.user_id == uid
    }
}

// ---------------------------------------------------------------------------
// Comment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub comment_id: CommentId,
    pub user_id: Uid,
    pub nickname: String,
    /// Stored snapshot. Display code replaces it from the live roster.
    pub profile_image_url: Option<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_authored_by(&self, uid: &Uid) -> bool {
        &self.user_id == uid
    }
}
