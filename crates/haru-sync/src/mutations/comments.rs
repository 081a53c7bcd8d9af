use haru_shared::{paths, Comment, CommentId, Post, Wire};
use tracing::{debug, info};

use super::Mutations;
use crate::error::MutationError;

impl Mutations {
    /// Append a comment under `post`, attributed to the current user.
    pub async fn add_comment(&self, post: &Post, text: &str) -> Result<Comment, MutationError> {
        let (user, group_id) = self.post_context()?;
        let key = self.bucket_of(&group_id, post);
        let comment = Comment {
            comment_id: CommentId::new(),
            user_id: user.uid.clone(),
            nickname: user.nickname.clone(),
            profile_image_url: user.profile_image_url.clone(),
            text: text.to_string(),
            created_at: self.backend.clock.now(),
        };

        self.backend
            .remote
            .set_value(
                &paths::comment(&group_id, &key, &post.post_id, &comment.comment_id),
                comment.encode(),
            )
            .await?;

        debug!(post_id = %post.post_id, comment_id = %comment.comment_id, "comment added");
        let applied = self.state.update_group_if(&group_id, |g| {
            if let Some(p) = g.find_post_mut(&post.post_id) {
                p.comments.insert(comment.comment_id.clone(), comment.clone());
            }
        });
        if applied {
            self.save_group_if_current(&group_id);
        }
        Ok(comment)
    }

    /// Remove a comment. Callers check [`Comment::is_authored_by`] first;
    /// nothing here does.
    pub async fn delete_comment(&self, post: &Post, comment_id: &CommentId) -> Result<(), MutationError> {
        let (_, group_id) = self.post_context()?;
        let key = self.bucket_of(&group_id, post);

        self.backend
            .remote
            .delete_value(&paths::comment(&group_id, &key, &post.post_id, comment_id))
            .await?;

        info!(post_id = %post.post_id, comment_id = %comment_id, "comment deleted");
        let applied = self.state.update_group_if(&group_id, |g| {
            if let Some(p) = g.find_post_mut(&post.post_id) {
                p.comments.remove(comment_id);
            }
        });
        if applied {
            self.save_group_if_current(&group_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use haru_shared::{BucketCalendar, GroupId, Uid};

    use super::*;
    use crate::error::RemoteError;
    use crate::memory::RemoteOp;
    use crate::mutations::test_support::{fixture, group, now, user};

    #[tokio::test]
    async fn add_then_delete_comment() {
        let fx = fixture(user("u1", Some("g1")), Some(group("g1", "AB12CD", &["u1"])));
        let post = fx.mutations.upload_post(Bytes::from_static(b"jpeg")).await.unwrap();

        let comment = fx.mutations.add_comment(&post, "좋아요").await.unwrap();
        assert!(comment.is_authored_by(&Uid::from("u1")));

        let key = BucketCalendar::default().date_key(now());
        let path = paths::comment(&GroupId::from("g1"), &key, &post.post_id, &comment.comment_id);
        assert_eq!(fx.remote.value_at(&path).and_then(|v| Comment::decode(&v)), Some(comment.clone()));

        let group = fx.state.group.get();
        let (_, stored) = (*group).as_ref().unwrap().find_post(&post.post_id).unwrap();
        assert!(stored.comments.contains_key(&comment.comment_id));

        fx.mutations.delete_comment(&post, &comment.comment_id).await.unwrap();
        assert_eq!(fx.remote.value_at(&path), None);
        let group = fx.state.group.get();
        let (_, stored) = (*group).as_ref().unwrap().find_post(&post.post_id).unwrap();
        assert!(stored.comments.is_empty());
    }

    #[tokio::test]
    async fn comment_requires_signed_in_user() {
        let fx = fixture(user("u1", Some("g1")), Some(group("g1", "AB12CD", &["u1"])));
        let post = fx.mutations.upload_post(Bytes::from_static(b"jpeg")).await.unwrap();
        let writes_before = fx.remote.calls().len();

        fx.state.user.replace(None);
        let err = fx.mutations.add_comment(&post, "hi").await.unwrap_err();
        assert!(matches!(err, MutationError::NotSignedIn));
        assert_eq!(fx.remote.calls().len(), writes_before);
    }

    #[tokio::test]
    async fn delete_comment_failure_keeps_local_copy() {
        let fx = fixture(user("u1", Some("g1")), Some(group("g1", "AB12CD", &["u1"])));
        let post = fx.mutations.upload_post(Bytes::from_static(b"jpeg")).await.unwrap();
        let comment = fx.mutations.add_comment(&post, "hi").await.unwrap();

        let key = BucketCalendar::default().date_key(now());
        let path = paths::comment(&GroupId::from("g1"), &key, &post.post_id, &comment.comment_id);
        fx.remote.fail(RemoteOp::Delete, &path, RemoteError::Transport("offline".into()));

        assert!(fx.mutations.delete_comment(&post, &comment.comment_id).await.is_err());
        assert!(fx.remote.value_at(&path).is_some());
        let group = fx.state.group.get();
        let (_, stored) = (*group).as_ref().unwrap().find_post(&post.post_id).unwrap();
        assert!(stored.comments.contains_key(&comment.comment_id));
    }
}
