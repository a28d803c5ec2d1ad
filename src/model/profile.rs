use serde::Serialize;
use serde_json::Value;

use crate::error::ValidationError;
use crate::ids::{ActorId, PostId};
use crate::path::DataPath;
use crate::schema::fields;

use super::board::Board;
use super::{malformed, marker_keys};

/// Everything stored under `users/{userId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: ActorId,
    pub username: Option<String>,
    /// Opaque base64 image payload.
    pub profile_pic: Option<String>,
    /// Posts the user authored, in key (creation) order.
    pub post_ids: Vec<PostId>,
    /// Boards in name order.
    pub boards: Vec<Board>,
}

impl UserProfile {
    /// Decode a user node. An absent node is an empty profile.
    ///
    /// # Errors
    /// `MalformedRecord` if a field has the wrong type or a key is invalid.
    pub fn from_node(user_id: ActorId, path: &DataPath, node: Option<&Value>) -> Result<Self, ValidationError> {
        let text_field = |field: &str| -> Result<Option<String>, ValidationError> {
            match node.and_then(|n| n.get(field)) {
                None => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(other) => Err(malformed(path, format!("'{field}' is not a string: {other}"))),
            }
        };
        let username = text_field(fields::USERNAME)?;
        let profile_pic = text_field(fields::PROFILE_PIC)?;

        let post_ids = marker_keys(node.and_then(|n| n.get(fields::POSTS)))
            .into_iter()
            .map(|key| PostId::from_key(key).map_err(|e| malformed(path, e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        let boards_path = path.child_trusted(fields::BOARDS);
        let mut boards = Vec::new();
        if let Some(entries) = node.and_then(|n| n.get(fields::BOARDS)).and_then(Value::as_object) {
            for (name, board_node) in entries {
                let board_path = boards_path
                    .child(name)
                    .map_err(|e| malformed(&boards_path, e.to_string()))?;
                boards.push(Board::from_node(name, &board_path, board_node)?);
            }
        }

        Ok(Self {
            user_id,
            username,
            profile_pic,
            post_ids,
            boards,
        })
    }
}
