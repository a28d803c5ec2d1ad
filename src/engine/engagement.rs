use tracing::info;

use crate::engagement::EngagementRecord;
use crate::error::CraftResult;
use crate::ids::{CommentId, PostId};
use crate::reconciler::{EngagementTarget, ReconcileOutcome};

use super::CraftEngine;

impl CraftEngine {
    /// Like (`true`) or unlike (`false`) a post as the current actor.
    ///
    /// # Errors
    /// See [`set_engaged`](Self::set_engaged).
    pub fn set_post_liked(&self, post_id: &PostId, liked: bool) -> CraftResult<ReconcileOutcome> {
        self.set_engaged(&EngagementTarget::post(post_id.clone()), liked)
    }

    /// Like or unlike a comment or reply as the current actor.
    ///
    /// # Errors
    /// `Validation(EmptyThread)` for an empty thread; otherwise see
    /// [`set_engaged`](Self::set_engaged).
    pub fn set_comment_liked(&self, post_id: &PostId, thread: &[CommentId], liked: bool) -> CraftResult<ReconcileOutcome> {
        let target = EngagementTarget::comment(post_id.clone(), thread.to_vec())?;
        self.set_engaged(&target, liked)
    }

    /// Set the current actor's engagement with `target`.
    ///
    /// # Errors
    /// `Unauthenticated`, `NotFound`, `Validation` for a malformed stored
    /// record, or `ReconciliationFailed` when the caller should resync from the
    /// next authoritative read.
    pub fn set_engaged(&self, target: &EngagementTarget, liked: bool) -> CraftResult<ReconcileOutcome> {
        let actor = self.actor()?;
        let outcome = self.reconciler.apply(target, &actor, liked)?;
        if outcome.changed {
            info!(post_id = %target.post_id(), %actor, liked, count = outcome.record.count(), "Engagement changed");
        }
        Ok(outcome)
    }

    /// Current engagement record of `target`.
    ///
    /// # Errors
    /// `NotFound` if the item does not exist, `Validation` if it is malformed.
    pub fn engagement(&self, target: &EngagementTarget) -> CraftResult<EngagementRecord> {
        self.reconciler.read(target)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::auth::StaticAuth;
    use crate::config::CraftConfig;
    use crate::error::CraftError;
    use crate::ids::ActorId;
    use crate::model::{NewComment, NewPost};
    use crate::storage::InMemoryDocumentStore;

    use super::*;

    #[test]
    fn test_post_and_comment_likes_share_semantics() {
        let auth = Arc::new(StaticAuth::signed_in(ActorId::new("a").unwrap()));
        let engine = CraftEngine::in_memory(auth.clone(), CraftConfig::default());
        let post_id = engine.create_post(&NewPost::new("Mittens", "fair isle", "bWl0dA==")).unwrap();
        let comment_id = engine.add_comment(&post_id, &NewComment::new("cosy")).unwrap();
        let thread = [comment_id];

        engine.set_post_liked(&post_id, true).unwrap();
        engine.set_comment_liked(&post_id, &thread, true).unwrap();
        auth.set_actor(Some(ActorId::new("b").unwrap()));
        engine.set_post_liked(&post_id, true).unwrap();
        engine.set_comment_liked(&post_id, &thread, true).unwrap();
        auth.set_actor(Some(ActorId::new("a").unwrap()));
        engine.set_post_liked(&post_id, false).unwrap();
        let last = engine.set_comment_liked(&post_id, &thread, false).unwrap();
        assert!(last.changed);

        let expected = EngagementRecord::from_actors([ActorId::new("b").unwrap()]);
        let post_target = EngagementTarget::post(post_id.clone());
        let comment_target = EngagementTarget::comment(post_id.clone(), thread.to_vec()).unwrap();
        assert_eq!(engine.engagement(&post_target).unwrap(), expected);
        assert_eq!(engine.engagement(&comment_target).unwrap(), expected);

        // Content fields survive engagement writes.
        let post = engine.post(&post_id).unwrap();
        assert_eq!(post.title, "Mittens");
        assert_eq!(post.comments[0].text, "cosy");
    }

    #[test]
    fn test_unlike_on_fresh_post_leaves_store_untouched() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let auth = Arc::new(StaticAuth::signed_in(ActorId::new("a").unwrap()));
        let engine = CraftEngine::new(store.clone(), auth);
        let post_id = engine.create_post(&NewPost::new("Beret", "mohair", "YmVyZXQ=")).unwrap();
        let comment_id = engine.add_comment(&post_id, &NewComment::new("chic")).unwrap();
        let revision = store.revision().unwrap();

        let post = engine.set_post_liked(&post_id, false).unwrap();
        let comment = engine.set_comment_liked(&post_id, &[comment_id], false).unwrap();
        assert!(!post.changed);
        assert!(!comment.changed);
        assert_eq!(store.revision().unwrap(), revision);
    }

    #[test]
    fn test_like_requires_actor() {
        let auth = Arc::new(StaticAuth::signed_in(ActorId::new("a").unwrap()));
        let engine = CraftEngine::in_memory(auth.clone(), CraftConfig::default());
        let post_id = engine.create_post(&NewPost::new("t", "d", "i")).unwrap();

        auth.set_actor(None);
        assert!(matches!(
            engine.set_post_liked(&post_id, true).unwrap_err(),
            CraftError::Unauthenticated
        ));
    }
}
