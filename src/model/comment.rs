use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ContentLimits;
use crate::engagement::EngagementRecord;
use crate::error::ValidationError;
use crate::ids::{ActorId, CommentId};
use crate::path::DataPath;
use crate::schema::fields;

use super::{author, decode, malformed};

/// A comment or reply, with its replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub user_id: Option<ActorId>,
    pub text: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    /// Direct replies, oldest first.
    pub replies: Vec<Comment>,
    pub engagement: EngagementRecord,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CommentNode {
    user_id: Option<String>,
    text: String,
    timestamp: i64,
    replies: BTreeMap<String, Value>,
}

impl Comment {
    /// Decode the node stored at `path`.
    ///
    /// # Errors
    /// `MalformedRecord` on wrong field types, invalid reply keys or malformed
    /// engagement fields anywhere in the thread.
    pub fn from_node(id: CommentId, path: &DataPath, node: &Value) -> Result<Self, ValidationError> {
        let raw: CommentNode = decode(path, node)?;
        let engagement = EngagementRecord::from_node(path, Some(node))?;
        let replies = comments_from_map(&path.child_trusted(fields::REPLIES), raw.replies)?;
        Ok(Self {
            id,
            user_id: author(path, raw.user_id)?,
            text: raw.text,
            timestamp: raw.timestamp,
            replies,
            engagement,
        })
    }

    /// This comment plus all replies below it.
    #[must_use]
    pub fn thread_size(&self) -> usize {
        1 + self.replies.iter().map(Self::thread_size).sum::<usize>()
    }
}

/// Decode a `comments` or `replies` map, oldest first.
pub(crate) fn comments_from_map(
    parent: &DataPath,
    nodes: BTreeMap<String, Value>,
) -> Result<Vec<Comment>, ValidationError> {
    let mut out = Vec::with_capacity(nodes.len());
    for (key, node) in nodes {
        let id = CommentId::from_key(key.as_str()).map_err(|e| malformed(parent, e.to_string()))?;
        let path = parent.child_trusted(id.as_str());
        out.push(Comment::from_node(id, &path, &node)?);
    }
    out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    Ok(out)
}

/// Input for a comment or reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    pub text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CommentWrite<'a> {
    user_id: &'a str,
    text: &'a str,
    timestamp: i64,
    likes: u64,
}

impl NewComment {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// # Errors
    /// `MissingField` for blank text, `FieldTooLong` past `max_text_len`.
    pub fn validate(&self, limits: &ContentLimits) -> Result<(), ValidationError> {
        limits.check_required(fields::TEXT, &self.text, limits.max_text_len)
    }

    /// New comments start with an explicit zero like count.
    pub(crate) fn to_node(&self, author: &ActorId, timestamp: i64) -> Result<Value, serde_json::Error> {
        serde_json::to_value(CommentWrite {
            user_id: author.as_str(),
            text: &self.text,
            timestamp,
            likes: 0,
        })
    }
}
