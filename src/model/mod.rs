//! Typed views of stored content.
//!
//! Stored nodes are decoded leniently, the way clients wrote them: missing
//! text fields read as empty and unknown fields are ignored. Engagement fields
//! and child keys are validated.

mod board;
mod comment;
mod post;
mod profile;

pub use board::Board;
pub use comment::{Comment, NewComment};
pub use post::{NewPost, Post};
pub use profile::UserProfile;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ValidationError;
use crate::ids::ActorId;
use crate::path::DataPath;

pub(crate) fn malformed(path: &DataPath, reason: impl Into<String>) -> ValidationError {
    ValidationError::MalformedRecord {
        path: path.to_string(),
        reason: reason.into(),
    }
}

pub(crate) fn decode<T: DeserializeOwned>(path: &DataPath, node: &Value) -> Result<T, ValidationError> {
    T::deserialize(node).map_err(|e| malformed(path, e.to_string()))
}

/// Author ids were optional on old clients; blank means unknown.
pub(crate) fn author(path: &DataPath, raw: Option<String>) -> Result<Option<ActorId>, ValidationError> {
    match raw {
        None => Ok(None),
        Some(id) if id.trim().is_empty() => Ok(None),
        Some(id) => ActorId::new(id)
            .map(Some)
            .map_err(|e| malformed(path, format!("invalid author: {e}"))),
    }
}

/// Keys of a `{ key: true }` membership map, in key order.
pub(crate) fn marker_keys(node: Option<&Value>) -> Vec<&str> {
    node.and_then(Value::as_object)
        .map(|members| {
            members
                .iter()
                .filter(|(_, marker)| marker.as_bool() == Some(true))
                .map(|(key, _)| key.as_str())
                .collect()
        })
        .unwrap_or_default()
}
