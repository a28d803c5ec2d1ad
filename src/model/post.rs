use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ContentLimits;
use crate::engagement::EngagementRecord;
use crate::error::ValidationError;
use crate::ids::{ActorId, PostId};
use crate::path::DataPath;
use crate::schema::fields;

use super::comment::{comments_from_map, Comment};
use super::{author, decode};

/// A post as read from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub description: String,
    /// Opaque base64 image payload.
    pub image_base64: String,
    /// Creation time, epoch milliseconds.
    pub timestamp: i64,
    pub user_id: Option<ActorId>,
    /// Top-level comments, oldest first.
    pub comments: Vec<Comment>,
    pub engagement: EngagementRecord,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PostNode {
    title: String,
    description: String,
    image_base64: String,
    timestamp: i64,
    user_id: Option<String>,
    comments: BTreeMap<String, Value>,
}

impl Post {
    /// Decode the node stored at `path`.
    ///
    /// # Errors
    /// `MalformedRecord` if a field has the wrong type, a child key is not a
    /// valid id or the engagement fields are malformed.
    pub fn from_node(id: PostId, path: &DataPath, node: &Value) -> Result<Self, ValidationError> {
        let raw: PostNode = decode(path, node)?;
        let engagement = EngagementRecord::from_node(path, Some(node))?;
        let comments = comments_from_map(&path.child_trusted(fields::COMMENTS), raw.comments)?;
        Ok(Self {
            id,
            title: raw.title,
            description: raw.description,
            image_base64: raw.image_base64,
            timestamp: raw.timestamp,
            user_id: author(path, raw.user_id)?,
            comments,
            engagement,
        })
    }

    /// Every comment on the post, replies included.
    #[must_use]
    pub fn comment_count(&self) -> usize {
        self.comments.iter().map(Comment::thread_size).sum()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PostWrite<'a> {
    title: &'a str,
    description: &'a str,
    image_base64: &'a str,
    timestamp: i64,
    user_id: &'a str,
    likes: u64,
}

/// Input for creating a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub title: String,
    pub description: String,
    pub image_base64: String,
}

impl NewPost {
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>, image_base64: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            image_base64: image_base64.into(),
        }
    }

    /// All three fields are required.
    ///
    /// # Errors
    /// `MissingField` for a blank field, `FieldTooLong` past the configured limits.
    pub fn validate(&self, limits: &ContentLimits) -> Result<(), ValidationError> {
        limits.check_required(fields::TITLE, &self.title, limits.max_title_len)?;
        limits.check_required(fields::DESCRIPTION, &self.description, limits.max_text_len)?;
        limits.check_required(fields::IMAGE_BASE64, &self.image_base64, limits.max_image_bytes)?;
        Ok(())
    }

    pub(crate) fn to_node(&self, author: &ActorId, timestamp: i64) -> Result<Value, serde_json::Error> {
        serde_json::to_value(PostWrite {
            title: &self.title,
            description: &self.description,
            image_base64: &self.image_base64,
            timestamp,
            user_id: author.as_str(),
            likes: 0,
        })
    }
}
