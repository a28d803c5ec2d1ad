//! Field names and the paths content is stored under.
//!
//! ```text
//! posts/{postId}                                   Post
//! posts/{postId}/comments/{commentId}              Comment
//! posts/{postId}/comments/{c0}/replies/{c1}/...    nested reply
//! users/{userId}/username                          string
//! users/{userId}/profilePic                        base64 string
//! users/{userId}/posts/{postId}                    true
//! users/{userId}/boards/{name}/description         string
//! users/{userId}/boards/{name}/posts/{postId}      true
//! ```

use crate::error::ValidationError;
use crate::ids::{ActorId, CommentId, PostId};
use crate::path::{validate_segment, DataPath};

/// Stored field names.
#[allow(missing_docs)]
pub mod fields {
    pub const TITLE: &str = "title";
    pub const DESCRIPTION: &str = "description";
    pub const IMAGE_BASE64: &str = "imageBase64";
    pub const TIMESTAMP: &str = "timestamp";
    pub const USER_ID: &str = "userId";
    pub const TEXT: &str = "text";
    pub const LIKES: &str = "likes";
    pub const LIKED_BY: &str = "likedBy";
    pub const COMMENTS: &str = "comments";
    pub const REPLIES: &str = "replies";
    pub const USERNAME: &str = "username";
    pub const PROFILE_PIC: &str = "profilePic";
    pub const POSTS: &str = "posts";
    pub const BOARDS: &str = "boards";
}

const USERS: &str = "users";

/// `posts`
#[must_use]
pub fn posts() -> DataPath {
    DataPath::root().child_trusted(fields::POSTS)
}

/// `posts/{postId}`
#[must_use]
pub fn post(post_id: &PostId) -> DataPath {
    posts().child_trusted(post_id.as_str())
}

/// `posts/{postId}/comments`
#[must_use]
pub fn post_comments(post_id: &PostId) -> DataPath {
    post(post_id).child_trusted(fields::COMMENTS)
}

/// The node of a comment. A one-element thread is a top-level comment; each
/// further id descends into `replies`.
///
/// # Errors
/// `EmptyThread` if `thread` is empty.
pub fn comment(post_id: &PostId, thread: &[CommentId]) -> Result<DataPath, ValidationError> {
    let (first, rest) = thread.split_first().ok_or(ValidationError::EmptyThread)?;
    let mut path = post_comments(post_id).child_trusted(first.as_str());
    for reply in rest {
        path = path.child_trusted(fields::REPLIES).child_trusted(reply.as_str());
    }
    Ok(path)
}

/// Where replies to the last comment of `thread` are stored.
///
/// # Errors
/// `EmptyThread` if `thread` is empty.
pub fn comment_replies(post_id: &PostId, thread: &[CommentId]) -> Result<DataPath, ValidationError> {
    Ok(comment(post_id, thread)?.child_trusted(fields::REPLIES))
}

/// `users/{userId}`
#[must_use]
pub fn user(user_id: &ActorId) -> DataPath {
    DataPath::root().child_trusted(USERS).child_trusted(user_id.as_str())
}

/// `users/{userId}/username`
#[must_use]
pub fn username(user_id: &ActorId) -> DataPath {
    user(user_id).child_trusted(fields::USERNAME)
}

/// `users/{userId}/profilePic`
#[must_use]
pub fn profile_pic(user_id: &ActorId) -> DataPath {
    user(user_id).child_trusted(fields::PROFILE_PIC)
}

/// `users/{userId}/posts`
#[must_use]
pub fn user_posts(user_id: &ActorId) -> DataPath {
    user(user_id).child_trusted(fields::POSTS)
}

/// `users/{userId}/boards`
#[must_use]
pub fn boards(user_id: &ActorId) -> DataPath {
    user(user_id).child_trusted(fields::BOARDS)
}

/// `users/{userId}/boards/{name}`
///
/// # Errors
/// `InvalidPathSegment` if the board name cannot be used as a key.
pub fn board(user_id: &ActorId, name: &str) -> Result<DataPath, ValidationError> {
    validate_segment(name)?;
    Ok(boards(user_id).child_trusted(name))
}

/// `users/{userId}/boards/{name}/posts`
///
/// # Errors
/// `InvalidPathSegment` if the board name cannot be used as a key.
pub fn board_posts(user_id: &ActorId, name: &str) -> Result<DataPath, ValidationError> {
    Ok(board(user_id, name)?.child_trusted(fields::POSTS))
}
