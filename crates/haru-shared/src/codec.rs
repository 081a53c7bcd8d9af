//! Wire codec for the realtime document store.
//!
//! The wire shape is plain JSON: dates are ISO-8601 strings, enums are raw
//! string tags, nested collections are objects keyed by id. Decoding never
//! fails loudly. A payload missing a required field decodes to `None`, and a
//! malformed nested element (one post, one comment, one bucket) is dropped on
//! its own so the rest of the parent stays available.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::date_key::DateKey;
use crate::models::{Comment, Gender, Group, LoginPlatform, Post, User};
use crate::types::{CommentId, GroupId, PostId, Uid};

/// Conversion between an entity and its wire value.
pub trait Wire: Sized {
    /// `None` when a required field is missing or fails to parse.
    fn decode(value: &Value) -> Option<Self>;

    /// Always succeeds.
    fn encode(&self) -> Value;
}

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

// DTOs below hold only primitives and string-keyed maps, so serializing them
// into a `Value` cannot fail.
fn to_value<T: Serialize>(dto: &T) -> Value {
    serde_json::to_value(dto).unwrap_or(Value::Null)
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    register_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    login_platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nickname: Option<String>,
    #[serde(rename = "profileImageURL", skip_serializing_if = "Option::is_none")]
    profile_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fcm_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    birthday_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_push_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group_id: Option<String>,
}

impl Wire for User {
    fn decode(value: &Value) -> Option<Self> {
        let dto = match UserDto::deserialize(value) {
            Ok(dto) => dto,
            Err(e) => {
                debug!(error = %e, "user payload has the wrong shape");
                return None;
            }
        };

        Some(User {
            uid: Uid(dto.uid?),
            register_date: parse_timestamp(&dto.register_date?)?,
            login_platform: LoginPlatform::from_tag(&dto.login_platform?)?,
            nickname: dto.nickname?,
            profile_image_url: dto.profile_image_url,
            fcm_token: dto.fcm_token,
            birthday_date: parse_timestamp(&dto.birthday_date?)?,
            gender: Gender::from_tag(&dto.gender?)?,
            is_push_enabled: dto.is_push_enabled?,
            group_id: dto.group_id.map(GroupId),
        })
    }

    fn encode(&self) -> Value {
        to_value(&UserDto {
            uid: Some(self.uid.0.clone()),
            register_date: Some(format_timestamp(&self.register_date)),
            login_platform: Some(self.login_platform.as_tag().to_string()),
            nickname: Some(self.nickname.clone()),
            profile_image_url: self.profile_image_url.clone(),
            fcm_token: self.fcm_token.clone(),
            birthday_date: Some(format_timestamp(&self.birthday_date)),
            gender: Some(self.gender.as_tag().to_string()),
            is_push_enabled: Some(self.is_push_enabled),
            group_id: self.group_id.as_ref().map(|g| g.0.clone()),
        })
    }
}

// ---------------------------------------------------------------------------
// Comment
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    comment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nickname: Option<String>,
    #[serde(rename = "profileImageURL", skip_serializing_if = "Option::is_none")]
    profile_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
}

impl Wire for Comment {
    fn decode(value: &Value) -> Option<Self> {
        let dto = CommentDto::deserialize(value).ok()?;
        Some(Comment {
            comment_id: CommentId(dto.comment_id?),
            user_id: Uid(dto.user_id?),
            nickname: dto.nickname?,
            profile_image_url: dto.profile_image_url,
            text: dto.text?,
            created_at: parse_timestamp(&dto.created_at?)?,
        })
    }

    fn encode(&self) -> Value {
        to_value(&CommentDto {
            comment_id: Some(self.comment_id.0.clone()),
            user_id: Some(self.user_id.0.clone()),
            nickname: Some(self.nickname.clone()),
            profile_image_url: self.profile_image_url.clone(),
            text: Some(self.text.clone()),
            created_at: Some(format_timestamp(&self.created_at)),
        })
    }
}

// ---------------------------------------------------------------------------
// Post
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nickname: Option<String>,
    #[serde(rename = "profileImageURL", skip_serializing_if = "Option::is_none")]
    profile_image_url: Option<String>,
    #[serde(rename = "imageURL", skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    like_count: Option<i64>,
    // Decoded element by element, so kept loose here.
    #[serde(skip_serializing_if = "Option::is_none")]
    comments: Option<Value>,
}

impl Wire for Post {
    fn decode(value: &Value) -> Option<Self> {
        let dto = PostDto::deserialize(value).ok()?;
        let post_id = PostId(dto.post_id?);

        let comments = match dto.comments {
            Some(Value::Object(raw)) => decode_keyed::<Comment, _>(&raw, |c| c.comment_id.clone()),
            Some(Value::Null) | None => BTreeMap::new(),
            Some(_) => {
                warn!(post_id = %post_id, "comments is not an object, ignoring");
                BTreeMap::new()
            }
        };

        Some(Post {
            post_id,
            user_id: Uid(dto.user_id?),
            nickname: dto.nickname?,
            profile_image_url: dto.profile_image_url,
            image_url: dto.image_url?,
            created_at: parse_timestamp(&dto.created_at?)?,
            like_count: dto.like_count?,
            comments,
        })
    }

    fn encode(&self) -> Value {
        let comments: Map<String, Value> = self
            .comments
            .iter()
            .map(|(id, c)| (id.0.clone(), c.encode()))
            .collect();

        to_value(&PostDto {
            post_id: Some(self.post_id.0.clone()),
            user_id: Some(self.user_id.0.clone()),
            nickname: Some(self.nickname.clone()),
            profile_image_url: self.profile_image_url.clone(),
            image_url: Some(self.image_url.clone()),
            created_at: Some(format_timestamp(&self.created_at)),
            like_count: Some(self.like_count),
            comments: Some(Value::Object(comments)),
        })
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    invite_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    members: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    posts_by_date: Option<Value>,
}

impl Wire for Group {
    /// Buckets with an invalid date key, or left empty only because every
    /// post in them was malformed, are omitted. A bucket that is empty on
    /// the wire stays.
    fn decode(value: &Value) -> Option<Self> {
        let dto = match GroupDto::deserialize(value) {
            Ok(dto) => dto,
            Err(e) => {
                debug!(error = %e, "group payload has the wrong shape");
                return None;
            }
        };
        let group_id = GroupId(dto.group_id?);

        let mut posts_by_date = BTreeMap::new();
        if let Some(Value::Object(buckets)) = &dto.posts_by_date {
            for (raw_key, bucket) in buckets {
                let Some(key) = DateKey::parse(raw_key) else {
                    warn!(group_id = %group_id, key = %raw_key, "dropping bucket with invalid date key");
                    continue;
                };
                let Some(raw_posts) = bucket.as_object() else {
                    warn!(group_id = %group_id, key = %raw_key, "dropping bucket that is not an object");
                    continue;
                };
                let posts = decode_keyed::<Post, _>(raw_posts, |p| p.post_id.clone());
                if posts.is_empty() && !raw_posts.is_empty() {
                    continue;
                }
                posts_by_date.insert(key, posts);
            }
        }

        Some(Group {
            group_id,
            group_name: dto.group_name?,
            created_at: parse_timestamp(&dto.created_at?)?,
            host_user_id: Uid(dto.host_user_id?),
            invite_code: dto.invite_code?,
            members: dto
                .members
                .unwrap_or_default()
                .into_iter()
                .map(|(uid, joined)| (Uid(uid), joined))
                .collect(),
            posts_by_date,
        })
    }

    fn encode(&self) -> Value {
        let buckets: Map<String, Value> = self
            .posts_by_date
            .iter()
            .map(|(key, posts)| {
                let posts: Map<String, Value> = posts
                    .iter()
                    .map(|(id, p)| (id.0.clone(), p.encode()))
                    .collect();
                (key.as_str().to_string(), Value::Object(posts))
            })
            .collect();

        to_value(&GroupDto {
            group_id: Some(self.group_id.0.clone()),
            group_name: Some(self.group_name.clone()),
            created_at: Some(format_timestamp(&self.created_at)),
            host_user_id: Some(self.host_user_id.0.clone()),
            invite_code: Some(self.invite_code.clone()),
            members: Some(
                self.members
                    .iter()
                    .map(|(uid, joined)| (uid.0.clone(), joined.clone()))
                    .collect(),
            ),
            posts_by_date: Some(Value::Object(buckets)),
        })
    }
}

/// Decode every value of a keyed object, dropping the ones that fail.
fn decode_keyed<T, K>(raw: &Map<String, Value>, key_of: impl Fn(&T) -> K) -> BTreeMap<K, T>
where
    T: Wire,
    K: Ord,
{
    raw.iter()
        .filter_map(|(raw_key, value)| {
            let decoded = T::decode(value);
            if decoded.is_none() {
                warn!(key = %raw_key, "dropping malformed nested element");
            }
            decoded
        })
        .map(|item| (key_of(&item), item))
        .collect()
}
