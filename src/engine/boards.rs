use serde_json::Value;
use tracing::{debug, info};

use crate::config::ContentLimits;
use crate::error::CraftResult;
use crate::ids::{ActorId, PostId};
use crate::model::{Board, Post};
use crate::schema::{self, fields};

use super::CraftEngine;

impl CraftEngine {
    /// Create a board for the current actor, or change an existing board's
    /// description. Saved posts are kept.
    ///
    /// # Errors
    /// `Unauthenticated`, or `Validation` if the name is blank, too long or not
    /// a legal key, or the description is too long.
    pub fn create_board(&self, name: &str, description: &str) -> CraftResult<()> {
        let owner = self.actor()?;
        let limits = &self.cfg.limits;
        limits.check_required("name", name, limits.max_name_len)?;
        ContentLimits::check_len(fields::DESCRIPTION, description, limits.max_text_len)?;
        let path = schema::board(&owner, name)?;

        self.store.update(
            &path,
            vec![(fields::DESCRIPTION.to_string(), Value::String(description.to_string()))],
        )?;
        info!(%owner, board = name, "Board created");
        Ok(())
    }

    /// Save a post to one of the current actor's boards. Saving to a board
    /// that does not exist yet creates it.
    ///
    /// # Errors
    /// `Unauthenticated`, `Validation` for an illegal board name, or `NotFound`
    /// if the post does not exist.
    pub fn save_to_board(&self, name: &str, post_id: &PostId) -> CraftResult<()> {
        let owner = self.actor()?;
        let path = schema::board_posts(&owner, name)?.child_trusted(post_id.as_str());
        self.require(&schema::post(post_id))?;

        self.store.write(&path, Value::Bool(true))?;
        debug!(%owner, board = name, %post_id, "Post saved to board");
        Ok(())
    }

    /// Boards of `owner`, in name order.
    ///
    /// # Errors
    /// A storage error, or `Validation` if a board is malformed.
    pub fn boards(&self, owner: &ActorId) -> CraftResult<Vec<Board>> {
        Ok(self.profile(owner)?.boards)
    }

    /// Posts saved to one of `owner`'s boards, in the order they were saved
    /// under. Markers for posts that no longer exist are skipped; an unknown
    /// board has no posts.
    ///
    /// # Errors
    /// `Validation` for an illegal board name, or a storage error.
    pub fn board_posts(&self, owner: &ActorId, name: &str) -> CraftResult<Vec<Post>> {
        let path = schema::board(owner, name)?;
        let Some(node) = self.store.read(&path)? else {
            return Ok(Vec::new());
        };
        let board = Board::from_node(name, &path, &node)?;

        let mut posts = Vec::with_capacity(board.post_ids.len());
        for post_id in &board.post_ids {
            match self.post(post_id) {
                Ok(post) => posts.push(post),
                Err(err) if err.is_not_found() => {
                    debug!(%owner, board = name, %post_id, "Skipping orphaned board marker");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(posts)
    }
}
