use serde::Serialize;
use tracing::info;

use crate::error::CraftResult;
use crate::ids::{ActorId, CommentId, PostId};
use crate::model::{Comment, NewComment};
use crate::path::DataPath;
use crate::schema;

use super::{serialization, CraftEngine};

/// A top-level comment listed on its author's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthoredComment {
    pub post_id: PostId,
    pub post_title: String,
    pub comment_id: CommentId,
    pub text: String,
}

impl CraftEngine {
    /// Comment on a post as the current actor.
    ///
    /// # Errors
    /// `Unauthenticated`, `Validation` for blank or oversized text, `NotFound`
    /// if the post does not exist.
    pub fn add_comment(&self, post_id: &PostId, comment: &NewComment) -> CraftResult<CommentId> {
        let author = self.actor()?;
        comment.validate(&self.cfg.limits)?;
        self.require(&schema::post(post_id))?;

        let parent = schema::post_comments(post_id);
        let comment_id = self.write_comment(&parent, &author, comment)?;
        info!(%post_id, %comment_id, %author, "Comment added");
        Ok(comment_id)
    }

    /// Reply to the last comment of `thread` as the current actor. The new
    /// reply's own thread is `thread` followed by the returned id.
    ///
    /// # Errors
    /// `Unauthenticated`, `Validation` for blank text or an empty thread,
    /// `NotFound` if the parent comment does not exist.
    pub fn add_reply(&self, post_id: &PostId, thread: &[CommentId], reply: &NewComment) -> CraftResult<CommentId> {
        let author = self.actor()?;
        reply.validate(&self.cfg.limits)?;
        self.require(&schema::comment(post_id, thread)?)?;

        let parent = schema::comment_replies(post_id, thread)?;
        let comment_id = self.write_comment(&parent, &author, reply)?;
        info!(%post_id, %comment_id, %author, depth = thread.len(), "Reply added");
        Ok(comment_id)
    }

    /// Top-level comments of a post, oldest first, each with its replies.
    ///
    /// # Errors
    /// `NotFound` if the post does not exist, `Validation` if it is malformed.
    pub fn comments(&self, post_id: &PostId) -> CraftResult<Vec<Comment>> {
        Ok(self.post(post_id)?.comments)
    }

    /// Top-level comments written by `author` across all posts, with the title
    /// of the post each was left on. Posts are visited oldest first.
    ///
    /// # Errors
    /// A storage error if `posts` cannot be read.
    pub fn comments_by_author(&self, author: &ActorId) -> CraftResult<Vec<AuthoredComment>> {
        let mut posts = self.feed()?;
        posts.reverse();
        Ok(posts
            .into_iter()
            .flat_map(|post| {
                let post_id = post.id;
                let post_title = post.title;
                post.comments
                    .into_iter()
                    .filter(|comment| comment.user_id.as_ref() == Some(author))
                    .map(move |comment| AuthoredComment {
                        post_id: post_id.clone(),
                        post_title: post_title.clone(),
                        comment_id: comment.id,
                        text: comment.text,
                    })
            })
            .collect())
    }

    fn write_comment(&self, parent: &DataPath, author: &ActorId, comment: &NewComment) -> CraftResult<CommentId> {
        let now = self.clock.now();
        let comment_id = self.ids.next_comment_id(now);
        let node = comment.to_node(author, now.timestamp_millis()).map_err(serialization)?;
        self.store.write(&parent.child_trusted(comment_id.as_str()), node)?;
        Ok(comment_id)
    }
}
