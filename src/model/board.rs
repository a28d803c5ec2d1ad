use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::ids::PostId;
use crate::path::DataPath;
use crate::schema::fields;

use super::{malformed, marker_keys};

/// A user's named collection of saved posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub name: String,
    pub description: String,
    /// Saved posts, in key (creation) order.
    pub post_ids: Vec<PostId>,
}

impl Board {
    /// Decode the board node stored at `path`; the board name is its key.
    ///
    /// # Errors
    /// `MalformedRecord` if the description is not a string.
    pub fn from_node(name: &str, path: &DataPath, node: &Value) -> Result<Self, ValidationError> {
        let description = match node.get(fields::DESCRIPTION) {
            None => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => return Err(malformed(path, format!("board description is not a string: {other}"))),
        };
        let post_ids = marker_keys(node.get(fields::POSTS))
            .into_iter()
            .map(|key| PostId::from_key(key).map_err(|e| malformed(path, e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.to_string(),
            description,
            post_ids,
        })
    }
}
