use haru_shared::codec::format_timestamp;
use haru_shared::{paths, Group, GroupId, InviteCode, Wire};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::Mutations;
use crate::error::GroupError;

/// Result of a successful `create_group`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedGroup {
    pub group_id: GroupId,
    pub invite_code: InviteCode,
}

const INVITE_CODE_FIELD: &str = "inviteCode";

fn group_id_field(group_id: &GroupId) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("groupId".into(), Value::String(group_id.to_string()));
    fields
}

impl Mutations {
    /// Create a group hosted by the current user and move them into it.
    ///
    /// Two writes: the group document, then `groupId` on the user. If the
    /// second fails the group document stays behind and an error is
    /// returned.
    pub async fn create_group(&self, name: &str) -> Result<CreatedGroup, GroupError> {
        let user = self.current_user().ok_or(GroupError::NotSignedIn)?;
        let name = name.trim();
        let min = self.config.min_group_name_len;
        if name.chars().count() < min {
            return Err(GroupError::InvalidGroupName { min });
        }

        let invite_code = self.unused_invite_code().await?;
        let now = self.backend.clock.now();
        let group_id = GroupId::new();
        let mut group = Group {
            group_id: group_id.clone(),
            group_name: name.to_string(),
            created_at: now,
            host_user_id: user.uid.clone(),
            invite_code: invite_code.to_string(),
            members: Default::default(),
            posts_by_date: Default::default(),
        };
        group.members.insert(user.uid.clone(), format_timestamp(&now));

        self.backend
            .remote
            .set_value(&paths::group(&group_id), group.encode())
            .await?;

        if let Err(e) = self
            .backend
            .remote
            .update_fields(&paths::user(&user.uid), group_id_field(&group_id))
            .await
        {
            error!(
                uid = %user.uid,
                group_id = %group_id,
                error = %e,
                "group created but assigning it to the host failed; group document left orphaned"
            );
            return Err(e.into());
        }

        info!(uid = %user.uid, group_id = %group_id, "group created");
        self.enter_group(&user.uid, group);
        Ok(CreatedGroup {
            group_id,
            invite_code,
        })
    }

    /// Join the group whose invite code matches `input`. The code is
    /// trimmed and uppercased first; malformed input is a
    /// [`GroupError::GroupNotFound`] without a network call.
    pub async fn join_group(&self, input: &str) -> Result<Group, GroupError> {
        let user = self.current_user().ok_or(GroupError::NotSignedIn)?;
        let code = InviteCode::parse(input).map_err(|e| {
            debug!(error = %e, "rejecting invite code");
            GroupError::GroupNotFound
        })?;

        let Some((_, value)) = self
            .backend
            .remote
            .find_child(paths::GROUPS, INVITE_CODE_FIELD, code.as_str())
            .await?
        else {
            return Err(GroupError::GroupNotFound);
        };
        let mut group = Group::decode(&value).ok_or_else(|| {
            warn!(code = %code, "group matching invite code did not decode");
            GroupError::GroupNotFound
        })?;

        if !group.is_member(&user.uid) {
            let joined_at = format_timestamp(&self.backend.clock.now());
            let mut fields = Map::new();
            fields.insert(format!("members/{}", user.uid), Value::String(joined_at.clone()));
            self.backend
                .remote
                .update_fields(&paths::group(&group.group_id), fields)
                .await?;
            group.members.insert(user.uid.clone(), joined_at);
        }

        if let Err(e) = self
            .backend
            .remote
            .update_fields(&paths::user(&user.uid), group_id_field(&group.group_id))
            .await
        {
            error!(
                uid = %user.uid,
                group_id = %group.group_id,
                error = %e,
                "added to group members but assigning the group to the user failed"
            );
            return Err(e.into());
        }

        info!(uid = %user.uid, group_id = %group.group_id, "joined group");
        self.enter_group(&user.uid, group.clone());
        Ok(group)
    }

    pub async fn fetch_group(&self, group_id: &GroupId) -> Result<Group, GroupError> {
        let value = self
            .backend
            .remote
            .read_once(&paths::group(group_id))
            .await?
            .ok_or(GroupError::GroupNotFound)?;
        Group::decode(&value).ok_or_else(|| {
            warn!(group_id = %group_id, "fetched group did not decode");
            GroupError::GroupNotFound
        })
    }

    /// Draw codes until one is not used by any group.
    async fn unused_invite_code(&self) -> Result<InviteCode, GroupError> {
        let attempts = self.config.invite_code_attempts;
        for attempt in 1..=attempts {
            let code = InviteCode::generate(self.config.invite_code_len);
            let taken = self
                .backend
                .remote
                .find_child(paths::GROUPS, INVITE_CODE_FIELD, code.as_str())
                .await?;
            if taken.is_none() {
                return Ok(code);
            }
            debug!(attempt, "invite code already in use, drawing again");
        }
        Err(GroupError::InviteCodeExhausted { attempts })
    }

    /// Optimistic update after a create or join. Dropped if the signed-in
    /// user changed meanwhile. A group the live subscription already
    /// delivered is left alone.
    fn enter_group(&self, uid: &haru_shared::Uid, group: Group) {
        let group_id = group.group_id.clone();
        let Some(user) = self
            .state
            .update_user_if(uid, |u| u.group_id = Some(group_id.clone()))
        else {
            debug!(uid = %uid, "session changed before the group write returned, discarding");
            return;
        };
        self.backend.cache.save_user(&user);
        let installed = self.state.group.update(|current| match current {
            Some(live) if live.group_id == group.group_id => None,
            _ => Some(Some(group.clone())),
        });
        if installed {
            self.backend.cache.save_group(&group);
        } else {
            debug!(group_id = %group.group_id, "live group snapshot already applied, keeping it");
        }
        self.state.sync_self_into_roster(&user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::memory::RemoteOp;
    use crate::mutations::test_support::{fixture, group, now, user};
    use haru_shared::Uid;

    #[tokio::test]
    async fn create_group_writes_group_then_user() {
        let fx = fixture(user("u1", None), None);
        let created = fx.mutations.create_group("  우리 가족 ").await.unwrap();

        let updates = fx.remote.calls();
        let set_idx = updates.iter().position(|c| c.op == RemoteOp::Set).unwrap();
        let upd_idx = updates.iter().position(|c| c.op == RemoteOp::Update).unwrap();
        assert!(set_idx < upd_idx);

        let stored = Group::decode(&fx.remote.value_at(&paths::group(&created.group_id)).unwrap()).unwrap();
        assert_eq!(stored.group_name, "우리 가족");
        assert_eq!(stored.host_user_id, Uid::from("u1"));
        assert_eq!(stored.invite_code, created.invite_code.as_str());
        assert!(stored.is_member(&Uid::from("u1")));
        assert_eq!(stored.created_at, now());

        assert_eq!(
            fx.remote.value_at("users/u1/groupId"),
            Some(Value::String(created.group_id.to_string()))
        );
        let me = fx.state.user.get();
        assert_eq!((*me).as_ref().unwrap().group_id.as_ref(), Some(&created.group_id));
        assert_eq!(fx.cache.load_group(), Some(stored));
        assert!(fx.state.roster.get().contains_key(&Uid::from("u1")));
    }

    #[tokio::test]
    async fn create_group_rejects_short_name_before_writing() {
        let fx = fixture(user("u1", None), None);
        let err = fx.mutations.create_group(" a ").await.unwrap_err();
        assert!(matches!(err, GroupError::InvalidGroupName { min: 2 }));
        assert!(fx.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn create_group_second_write_failure_leaves_orphan() {
        let fx = fixture(user("u1", None), None);
        fx.remote
            .fail(RemoteOp::Update, "users/u1", RemoteError::Transport("offline".into()));

        let err = fx.mutations.create_group("family").await.unwrap_err();
        assert!(matches!(err, GroupError::Remote(RemoteError::Transport(_))));

        let groups = fx.remote.value_at(paths::GROUPS).unwrap();
        assert_eq!(groups.as_object().unwrap().len(), 1);
        assert_eq!(fx.remote.value_at("users/u1/groupId"), None);
        assert!((*fx.state.group.get()).is_none());
    }

    #[tokio::test]
    async fn invite_code_collision_exhausts() {
        let fx = fixture(user("u1", None), None);
        // Occupy every one-character code.
        for c in haru_shared::constants::INVITE_CODE_ALPHABET {
            let code = (*c as char).to_string();
            fx.remote
                .put(&format!("groups/taken-{code}"), serde_json::json!({ "inviteCode": code }));
        }
        let mut config = crate::config::SyncConfig::default();
        config.invite_code_len = 1;
        config.invite_code_attempts = 3;
        let mutations = Mutations::new(fx.mutations.backend.clone(), fx.state.clone(), config);

        let err = mutations.create_group("family").await.unwrap_err();
        assert!(matches!(err, GroupError::InviteCodeExhausted { attempts: 3 }));
        assert_eq!(fx.remote.calls_of(RemoteOp::Find).len(), 3);
        assert!(fx.remote.calls_of(RemoteOp::Set).is_empty());
    }

    #[tokio::test]
    async fn join_group_normalises_code_and_adds_member() {
        let fx = fixture(user("u2", None), None);
        fx.remote.put("groups/g1", group("g1", "AB12CD", &["u1"]).encode());

        let joined = fx.mutations.join_group("  ab12cd ").await.unwrap();
        assert!(joined.is_member(&Uid::from("u2")));
        assert!(fx.remote.value_at("groups/g1/members/u2").is_some());
        assert!(fx.remote.value_at("groups/g1/members/u1").is_some());
        assert_eq!(fx.remote.value_at("users/u2/groupId"), Some(Value::String("g1".into())));
        assert_eq!((*fx.state.group.get()).as_ref().map(|g| g.group_id.clone()), Some(GroupId::from("g1")));
    }

    #[tokio::test]
    async fn join_group_unknown_code_is_not_found() {
        let fx = fixture(user("u2", None), None);
        fx.remote.put("groups/g1", group("g1", "AB12CD", &["u1"]).encode());

        let err = fx.mutations.join_group("ZZZZZZ").await.unwrap_err();
        assert!(matches!(err, GroupError::GroupNotFound));
        assert!(fx.remote.calls_of(RemoteOp::Update).is_empty());
    }

    #[tokio::test]
    async fn join_group_malformed_code_skips_network() {
        let fx = fixture(user("u2", None), None);
        for input in ["", "   ", "AB-12"] {
            let err = fx.mutations.join_group(input).await.unwrap_err();
            assert!(matches!(err, GroupError::GroupNotFound));
        }
        assert!(fx.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn fetch_group_reads_once() {
        let fx = fixture(user("u1", Some("g1")), None);
        fx.remote.put("groups/g1", group("g1", "AB12CD", &["u1"]).encode());

        let fetched = fx.mutations.fetch_group(&GroupId::from("g1")).await.unwrap();
        assert_eq!(fetched, group("g1", "AB12CD", &["u1"]));
        assert!(matches!(
            fx.mutations.fetch_group(&GroupId::from("nope")).await,
            Err(GroupError::GroupNotFound)
        ));
    }
}
