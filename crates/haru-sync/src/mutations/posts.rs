use std::collections::BTreeMap;

use bytes::Bytes;
use haru_shared::{paths, Post, PostId, Wire};
use tracing::{debug, info, warn};

use super::Mutations;
use crate::error::MutationError;

impl Mutations {
    /// Upload today's photo for the current user.
    ///
    /// The image goes to the blob store first; the post record is written
    /// only once the upload returned a URL. A failed upload writes nothing.
    pub async fn upload_post(&self, image: Bytes) -> Result<Post, MutationError> {
        let (user, group_id) = self.post_context()?;
        let post_id = PostId::new();
        let now = self.backend.clock.now();
        let key = self.calendar.date_key(now);

        let image_url = self
            .backend
            .blobs
            .upload(image, &paths::post_image(&group_id, &post_id))
            .await
            .map_err(|e| {
                warn!(uid = %user.uid, post_id = %post_id, error = %e, "image upload failed");
                MutationError::Upload(e)
            })?;

        let post = Post {
            post_id: post_id.clone(),
            user_id: user.uid.clone(),
            nickname: user.nickname.clone(),
            profile_image_url: user.profile_image_url.clone(),
            image_url,
            created_at: now,
            like_count: 0,
            comments: BTreeMap::new(),
        };

        // A failure here leaves the uploaded blob orphaned.
        self.backend
            .remote
            .set_value(&paths::post(&group_id, &key, &post_id), post.encode())
            .await?;

        info!(uid = %user.uid, group_id = %group_id, post_id = %post_id, key = %key, "post uploaded");
        if self
            .state
            .update_group_if(&group_id, |g| g.insert_post(key.clone(), post.clone()))
        {
            self.save_group_if_current(&group_id);
        } else {
            debug!(group_id = %group_id, "group changed before upload returned, discarding");
        }
        Ok(post)
    }

    /// Delete a post: record first, image second.
    ///
    /// If the record delete fails the image is left alone and the error is
    /// returned. A failed image delete after that only logs; the post is
    /// already gone for everyone.
    ///
    /// Authorship is not checked here. Callers check
    /// [`Post::is_authored_by`] before offering the action.
    pub async fn delete_post(&self, post: &Post) -> Result<(), MutationError> {
        let (_, group_id) = self.post_context()?;
        let key = self.bucket_of(&group_id, post);

        self.backend
            .remote
            .delete_value(&paths::post(&group_id, &key, &post.post_id))
            .await?;

        let blob_path = paths::post_image(&group_id, &post.post_id);
        if let Err(e) = self.backend.blobs.delete(&blob_path).await {
            warn!(path = %blob_path, error = %e, "post deleted but image delete failed; blob orphaned");
        }

        info!(group_id = %group_id, post_id = %post.post_id, "post deleted");
        if self.state.update_group_if(&group_id, |g| {
            g.remove_post(&post.post_id);
        }) {
            self.save_group_if_current(&group_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::error::RemoteError;
    use crate::memory::{BlobOp, RemoteOp};
    use crate::mutations::test_support::{fixture, group, now, user};
    use haru_shared::{BucketCalendar, GroupId, Uid};

    #[tokio::test]
    async fn upload_writes_blob_then_record() {
        let fx = fixture(user("u1", Some("g1")), Some(group("g1", "AB12CD", &["u1"])));
        let post = fx.mutations.upload_post(Bytes::from_static(b"jpeg")).await.unwrap();

        let blob_path = paths::post_image(&GroupId::from("g1"), &post.post_id);
        assert!(fx.blobs.contains(&blob_path));
        assert_eq!(post.image_url, crate::memory::MemoryBlobStore::url_for(&blob_path));
        assert_eq!(post.user_id, Uid::from("u1"));
        assert_eq!(post.nickname, "nick-u1");

        let key = BucketCalendar::default().date_key(now());
        let record = fx
            .remote
            .value_at(&paths::post(&GroupId::from("g1"), &key, &post.post_id))
            .unwrap();
        assert_eq!(Post::decode(&record), Some(post.clone()));

        let state = fx.state.group.get();
        let (found_key, _) = (*state).as_ref().unwrap().find_post(&post.post_id).unwrap();
        assert_eq!(found_key, &key);
        assert!(fx.cache.load_group().unwrap().find_post(&post.post_id).is_some());
    }

    #[tokio::test]
    async fn failed_upload_writes_nothing() {
        let fx = fixture(user("u1", Some("g1")), Some(group("g1", "AB12CD", &["u1"])));
        fx.blobs.fail_uploads(Some(RemoteError::Transport("offline".into())));

        let err = fx.mutations.upload_post(Bytes::from_static(b"jpeg")).await.unwrap_err();
        assert!(matches!(err, MutationError::Upload(_)));
        assert!(fx.remote.calls().is_empty());
        assert!((*fx.state.group.get()).as_ref().unwrap().posts_by_date.is_empty());
    }

    #[tokio::test]
    async fn upload_after_midnight_lands_in_next_bucket() {
        let fx = fixture(user("u1", Some("g1")), Some(group("g1", "AB12CD", &["u1"])));
        let calendar = BucketCalendar::default();
        let first = fx.mutations.upload_post(Bytes::from_static(b"day one")).await.unwrap();

        // 03:00 UTC is noon in the bucket zone; 13 hours on it is past midnight.
        fx.clock.advance(chrono::Duration::hours(13));
        let second = fx.mutations.upload_post(Bytes::from_static(b"day two")).await.unwrap();

        let snapshot = fx.state.snapshot();
        let today: Vec<&PostId> = snapshot
            .todays_posts(fx.clock.now(), &calendar)
            .into_iter()
            .map(|p| &p.post_id)
            .collect();
        assert_eq!(today, vec![&second.post_id]);

        let yesterday: Vec<&PostId> = snapshot
            .posts_by_date_key(&calendar.date_key(now()))
            .into_iter()
            .map(|p| &p.post_id)
            .collect();
        assert_eq!(yesterday, vec![&first.post_id]);
        assert_eq!(snapshot.group().unwrap().posts_by_date.len(), 2);
        assert!(snapshot.has_posted_today(&Uid::from("u1"), fx.clock.now(), &calendar));
    }

    #[tokio::test]
    async fn upload_requires_a_group() {
        let fx = fixture(user("u1", None), None);
        let err = fx.mutations.upload_post(Bytes::from_static(b"jpeg")).await.unwrap_err();
        assert!(matches!(err, MutationError::NoGroup));
        assert!(fx.blobs.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_record_then_blob() {
        let fx = fixture(user("u1", Some("g1")), Some(group("g1", "AB12CD", &["u1"])));
        let post = fx.mutations.upload_post(Bytes::from_static(b"jpeg")).await.unwrap();

        fx.mutations.delete_post(&post).await.unwrap();

        assert_eq!(fx.remote.value_at("groups/g1/postsByDate"), None);
        let blob_calls = fx.blobs.calls();
        assert_eq!(blob_calls.last().map(|(op, _)| *op), Some(BlobOp::Delete));
        assert!((*fx.state.group.get()).as_ref().unwrap().posts_by_date.is_empty());
    }

    #[tokio::test]
    async fn failed_record_delete_keeps_blob() {
        let fx = fixture(user("u1", Some("g1")), Some(group("g1", "AB12CD", &["u1"])));
        let post = fx.mutations.upload_post(Bytes::from_static(b"jpeg")).await.unwrap();
        let key = BucketCalendar::default().date_key(now());
        let record = paths::post(&GroupId::from("g1"), &key, &post.post_id);
        let blob = paths::post_image(&GroupId::from("g1"), &post.post_id);
        fx.remote.fail(
            RemoteOp::Delete,
            &record,
            RemoteError::PermissionDenied("rules".into()),
        );

        let err = fx.mutations.delete_post(&post).await.unwrap_err();
        assert!(matches!(err, MutationError::Remote(RemoteError::PermissionDenied(_))));
        assert!(!fx.blobs.calls().iter().any(|(op, _)| *op == BlobOp::Delete));
        assert!(fx.blobs.contains(&blob));
        assert!((*fx.state.group.get()).as_ref().unwrap().find_post(&post.post_id).is_some());

        // Retrying once the store accepts the delete removes both.
        fx.remote.clear_failure(RemoteOp::Delete, &record);
        fx.mutations.delete_post(&post).await.unwrap();
        assert_eq!(fx.remote.value_at(&record), None);
        assert!(!fx.blobs.contains(&blob));
    }

    #[tokio::test]
    async fn failed_blob_delete_still_reports_success() {
        let fx = fixture(user("u1", Some("g1")), Some(group("g1", "AB12CD", &["u1"])));
        let post = fx.mutations.upload_post(Bytes::from_static(b"jpeg")).await.unwrap();
        fx.blobs.fail_deletes(Some(RemoteError::Transport("offline".into())));

        fx.mutations.delete_post(&post).await.unwrap();
        assert_eq!(fx.remote.value_at("groups/g1/postsByDate"), None);
    }

    #[tokio::test]
    async fn late_result_after_group_switch_is_discarded() {
        let fx = fixture(user("u1", Some("g1")), Some(group("g1", "AB12CD", &["u1"])));
        // The session moved on to another group before the write returned.
        fx.state.group.replace(Some(group("g2", "ZX98YU", &["u1"])));

        let post = fx.mutations.upload_post(Bytes::from_static(b"jpeg")).await.unwrap();
        let current = fx.state.group.get();
        let current = (*current).as_ref().unwrap();
        assert_eq!(current.group_id, GroupId::from("g2"));
        assert!(current.find_post(&post.post_id).is_none());
    }
}
