//! Path scheme shared by the remote document store and the blob store.

use crate::date_key::DateKey;
use crate::types::{CommentId, GroupId, PostId, Uid};

/// Top-level collection holding every group document.
pub const GROUPS: &str = "groups";

/// Top-level collection holding every user document.
pub const USERS: &str = "users";

pub fn user(uid: &Uid) -> String {
    format!("{USERS}/{uid}")
}

pub fn group(group_id: &GroupId) -> String {
    format!("{GROUPS}/{group_id}")
}

pub fn post(group_id: &GroupId, key: &DateKey, post_id: &PostId) -> String {
    format!("{GROUPS}/{group_id}/postsByDate/{key}/{post_id}")
}

pub fn comment(group_id: &GroupId, key: &DateKey, post_id: &PostId, comment_id: &CommentId) -> String {
    format!("{}/comments/{comment_id}", post(group_id, key, post_id))
}

// -- blob store --

pub fn post_image(group_id: &GroupId, post_id: &PostId) -> String {
    format!("{GROUPS}/{group_id}/images/{post_id}.jpg")
}

pub fn profile_image(uid: &Uid) -> String {
    format!("{USERS}/{uid}/profile.jpg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_the_documented_scheme() {
        let gid = GroupId::from("g1");
        let key = DateKey::parse("2025-06-17").unwrap();
        let pid = PostId::from("p1");
        let cid = CommentId::from("c1");

        assert_eq!(user(&Uid::from("u1")), "users/u1");
        assert_eq!(group(&gid), "groups/g1");
        assert_eq!(post(&gid, &key, &pid), "groups/g1/postsByDate/2025-06-17/p1");
        assert_eq!(
            comment(&gid, &key, &pid, &cid),
            "groups/g1/postsByDate/2025-06-17/p1/comments/c1"
        );
        assert_eq!(post_image(&gid, &pid), "groups/g1/images/p1.jpg");
        assert_eq!(profile_image(&Uid::from("u1")), "users/u1/profile.jpg");
    }
}
