use bytes::Bytes;
use haru_shared::{paths, User};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::Mutations;
use crate::error::MutationError;

impl Mutations {
    pub async fn update_nickname(&self, nickname: &str) -> Result<User, MutationError> {
        let user = self.current_user().ok_or(MutationError::NotSignedIn)?;
        let nickname = nickname.trim().to_string();

        let mut fields = Map::new();
        fields.insert("nickname".into(), Value::String(nickname.clone()));
        self.backend
            .remote
            .update_fields(&paths::user(&user.uid), fields)
            .await?;

        info!(uid = %user.uid, "nickname updated");
        Ok(self.apply_profile(&user, move |u| u.nickname.clone_from(&nickname)))
    }

    /// Replace the profile photo at `users/{uid}/profile.jpg` and point the
    /// user document at the new URL.
    pub async fn update_profile_image(&self, image: Bytes) -> Result<User, MutationError> {
        let user = self.current_user().ok_or(MutationError::NotSignedIn)?;
        let url = self
            .backend
            .blobs
            .upload(image, &paths::profile_image(&user.uid))
            .await
            .map_err(MutationError::Upload)?;

        let mut fields = Map::new();
        fields.insert("profileImageURL".into(), Value::String(url.clone()));
        self.backend
            .remote
            .update_fields(&paths::user(&user.uid), fields)
            .await?;

        info!(uid = %user.uid, "profile image updated");
        Ok(self.apply_profile(&user, move |u| u.profile_image_url = Some(url.clone())))
    }

    pub fn set_notifications_enabled(&self, enabled: bool) {
        self.backend.cache.set_notifications_enabled(enabled);
    }

    pub fn notifications_enabled(&self) -> bool {
        self.backend.cache.notifications_enabled()
    }

    /// Optimistic profile edit, applied to the user as the state holds it
    /// now. Returns `before` with the edit when the session moved on and
    /// nothing was applied locally.
    fn apply_profile(&self, before: &User, edit: impl Fn(&mut User)) -> User {
        match self.state.update_user_if(&before.uid, &edit) {
            Some(user) => {
                self.backend.cache.save_user(&user);
                self.state.sync_self_into_roster(&user);
                user
            }
            None => {
                debug!(uid = %before.uid, "session changed before profile write returned, discarding");
                let mut edited = before.clone();
                edit(&mut edited);
                edited
            }
        }
    }
}
