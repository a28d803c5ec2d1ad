use serde_json::Value;
use tracing::info;

use crate::error::CraftResult;
use crate::ids::ActorId;
use crate::model::UserProfile;
use crate::schema::{self, fields};

use super::CraftEngine;

impl CraftEngine {
    /// Change the current actor's username.
    ///
    /// # Errors
    /// `Unauthenticated`, or `Validation` for a blank or oversized name.
    pub fn set_username(&self, username: &str) -> CraftResult<()> {
        let actor = self.actor()?;
        let limits = &self.cfg.limits;
        limits.check_required(fields::USERNAME, username, limits.max_name_len)?;
        self.store
            .write(&schema::username(&actor), Value::String(username.to_string()))?;
        info!(%actor, "Username updated");
        Ok(())
    }

    /// Replace the current actor's profile picture (an opaque base64 payload).
    ///
    /// # Errors
    /// `Unauthenticated`, or `Validation` for an empty or oversized payload.
    pub fn set_profile_image(&self, image_base64: &str) -> CraftResult<()> {
        let actor = self.actor()?;
        let limits = &self.cfg.limits;
        limits.check_required(fields::PROFILE_PIC, image_base64, limits.max_image_bytes)?;
        self.store
            .write(&schema::profile_pic(&actor), Value::String(image_base64.to_string()))?;
        info!(%actor, bytes = image_base64.len(), "Profile picture updated");
        Ok(())
    }

    /// Everything stored for `user`. Unknown users have an empty profile.
    ///
    /// # Errors
    /// A storage error, or `Validation` if the stored profile is malformed.
    pub fn profile(&self, user: &ActorId) -> CraftResult<UserProfile> {
        let path = schema::user(user);
        let node = self.store.read(&path)?;
        Ok(UserProfile::from_node(user.clone(), &path, node.as_ref())?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::auth::StaticAuth;
    use crate::config::{ContentLimits, CraftConfig};
    use crate::model::NewPost;

    use super::*;

    #[test]
    fn test_profile_round_trip() {
        let me = ActorId::new("u1").unwrap();
        let auth = Arc::new(StaticAuth::signed_in(me.clone()));
        let engine = CraftEngine::in_memory(auth, CraftConfig::default());

        engine.set_username("crochet_cat").unwrap();
        engine.set_profile_image("Y2F0").unwrap();
        let post_id = engine.create_post(&NewPost::new("Granny square", "d", "i")).unwrap();
        engine.create_board("Squares", "").unwrap();

        let profile = engine.profile(&me).unwrap();
        assert_eq!(profile.username.as_deref(), Some("crochet_cat"));
        assert_eq!(profile.profile_pic.as_deref(), Some("Y2F0"));
        assert_eq!(profile.post_ids, vec![post_id]);
        assert_eq!(profile.boards.len(), 1);
    }

    #[test]
    fn test_profile_limits() {
        let me = ActorId::new("u1").unwrap();
        let auth = Arc::new(StaticAuth::signed_in(me));
        let cfg = CraftConfig {
            limits: ContentLimits {
                max_image_bytes: 8,
                ..ContentLimits::default()
            },
            ..CraftConfig::default()
        };
        let engine = CraftEngine::in_memory(auth, cfg);

        assert!(engine.set_username("   ").unwrap_err().is_validation());
        assert!(engine.set_profile_image("").unwrap_err().is_validation());
        assert!(engine.set_profile_image("0123456789").unwrap_err().is_validation());
        assert!(engine.set_profile_image("01234567").is_ok());
    }
}
