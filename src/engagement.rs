//! Engagement records and the idempotent toggle.
//!
//! An engagement record lives inside the node of the item it belongs to
//! (a post or a comment) as two fields:
//!
//! ```text
//! likes:   2
//! likedBy: { "u1": true, "u2": true }
//! ```
//!
//! `likedBy` is the authoritative membership. `likes` is always re-derived from
//! it, so a counter that drifted (for example after a client wrote it
//! directly) is healed by the next toggle.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::ids::ActorId;
use crate::path::DataPath;
use crate::schema::fields;

/// Who engaged with an item, and how many of them there are.
///
/// The count is derived from the membership set on construction and cannot
/// drift from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RecordWire", into = "RecordWire")]
pub struct EngagementRecord {
    count: u64,
    engaged_by: BTreeSet<ActorId>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordWire {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    engaged_by: BTreeSet<ActorId>,
}

impl From<RecordWire> for EngagementRecord {
    fn from(wire: RecordWire) -> Self {
        // The stored count is advisory.
        Self::from_actors(wire.engaged_by)
    }
}

impl From<EngagementRecord> for RecordWire {
    fn from(record: EngagementRecord) -> Self {
        Self {
            count: record.count,
            engaged_by: record.engaged_by,
        }
    }
}

impl EngagementRecord {
    /// A record nobody has engaged with.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a record from its members.
    #[must_use]
    pub fn from_actors(actors: impl IntoIterator<Item = ActorId>) -> Self {
        let engaged_by: BTreeSet<ActorId> = actors.into_iter().collect();
        Self {
            count: engaged_by.len() as u64,
            engaged_by,
        }
    }

    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub fn engaged_by(&self) -> &BTreeSet<ActorId> {
        &self.engaged_by
    }

    #[must_use]
    pub fn is_engaged(&self, actor: &ActorId) -> bool {
        self.engaged_by.contains(actor)
    }

    /// Parse the engagement fields of an item node.
    ///
    /// An absent node, or a node without engagement fields, is an empty
    /// record. `likedBy` entries whose value is not `true` are not members.
    ///
    /// # Errors
    /// `MalformedRecord` if the node is not an object, `likedBy` is not an
    /// object, `likes` is not a non-negative integer, or a member key is not a
    /// valid actor id.
    pub fn from_node(path: &DataPath, node: Option<&Value>) -> Result<Self, ValidationError> {
        let Some(node) = node else {
            return Ok(Self::empty());
        };
        let malformed = |reason: String| ValidationError::MalformedRecord {
            path: path.to_string(),
            reason,
        };
        let Some(fields_map) = node.as_object() else {
            return Err(malformed("item is not an object".to_string()));
        };

        if let Some(likes) = fields_map.get(fields::LIKES) {
            if likes.as_u64().is_none() {
                return Err(malformed(format!("'{}' is not a non-negative integer: {likes}", fields::LIKES)));
            }
        }

        let mut engaged_by = BTreeSet::new();
        match fields_map.get(fields::LIKED_BY) {
            None | Some(Value::Null) => {}
            Some(Value::Object(members)) => {
                for (key, marker) in members {
                    if marker != &Value::Bool(true) {
                        continue;
                    }
                    let actor = ActorId::new(key.as_str())
                        .map_err(|e| malformed(format!("invalid member key '{key}': {e}")))?;
                    engaged_by.insert(actor);
                }
            }
            Some(other) => {
                return Err(malformed(format!("'{}' is not an object: {other}", fields::LIKED_BY)));
            }
        }

        Ok(Self::from_actors(engaged_by))
    }

    /// Write this record into an item node, preserving every other field.
    ///
    /// An empty membership removes `likedBy` and leaves `likes: 0`.
    #[must_use]
    pub fn apply_to_node(&self, node: &Value) -> Value {
        let mut out = node.as_object().cloned().unwrap_or_default();
        out.insert(fields::LIKES.to_string(), Value::from(self.count));
        if self.engaged_by.is_empty() {
            out.remove(fields::LIKED_BY);
        } else {
            let members: Map<String, Value> = self
                .engaged_by
                .iter()
                .map(|actor| (actor.as_str().to_string(), Value::Bool(true)))
                .collect();
            out.insert(fields::LIKED_BY.to_string(), Value::Object(members));
        }
        Value::Object(out)
    }
}

/// Apply one actor's intended engagement state to a record.
///
/// Idempotent: engaging twice, or withdrawing when not engaged, returns an
/// equal record. The count is recomputed from the membership rather than
/// incremented.
///
/// # Examples
///
/// ```
/// use craftable::{toggle_engagement, ActorId, EngagementRecord};
///
/// let a = ActorId::new("a").unwrap();
/// let b = ActorId::new("b").unwrap();
///
/// let r = toggle_engagement(&EngagementRecord::empty(), &a, true);
/// let r = toggle_engagement(&r, &b, true);
/// let r = toggle_engagement(&r, &a, false);
/// assert_eq!(r.count(), 1);
/// assert!(r.is_engaged(&b));
/// ```
#[must_use]
pub fn toggle_engagement(record: &EngagementRecord, actor: &ActorId, intended: bool) -> EngagementRecord {
    let mut engaged_by = record.engaged_by.clone();
    if intended {
        engaged_by.insert(actor.clone());
    } else {
        engaged_by.remove(actor);
    }
    EngagementRecord::from_actors(engaged_by)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn actor(id: &str) -> ActorId {
        ActorId::new(id).unwrap()
    }

    fn path() -> DataPath {
        DataPath::parse("posts/p1").unwrap()
    }

    #[test]
    fn test_toggle_is_idempotent() {
        let u1 = actor("u1");
        let once = toggle_engagement(&EngagementRecord::empty(), &u1, true);
        let twice = toggle_engagement(&once, &u1, true);
        assert_eq!(once, twice);
        assert_eq!(twice.count(), 1);
    }

    #[test]
    fn test_withdraw_when_not_engaged_is_noop() {
        let record = EngagementRecord::from_actors([actor("b")]);
        let after = toggle_engagement(&record, &actor("a"), false);
        assert_eq!(after, record);
    }

    #[test]
    fn test_engage_then_withdraw_restores_record() {
        let start = EngagementRecord::from_actors([actor("x"), actor("y")]);
        let u = actor("u");
        let back = toggle_engagement(&toggle_engagement(&start, &u, true), &u, false);
        assert_eq!(back, start);
    }

    #[test]
    fn test_scenario_two_engage_one_withdraws() {
        let (a, b) = (actor("a"), actor("b"));
        let r = toggle_engagement(&EngagementRecord::empty(), &a, true);
        let r = toggle_engagement(&r, &b, true);
        let r = toggle_engagement(&r, &a, false);
        assert_eq!(r, EngagementRecord::from_actors([b]));
        assert_eq!(r.count(), 1);
    }

    #[test]
    fn test_from_node_absent_and_bare() {
        assert_eq!(EngagementRecord::from_node(&path(), None).unwrap(), EngagementRecord::empty());
        let node = json!({"title": "hat"});
        assert_eq!(
            EngagementRecord::from_node(&path(), Some(&node)).unwrap(),
            EngagementRecord::empty()
        );
    }

    #[test]
    fn test_from_node_heals_drifted_count() {
        let node = json!({"likes": 7, "likedBy": {"u1": true, "u2": true}});
        let record = EngagementRecord::from_node(&path(), Some(&node)).unwrap();
        assert_eq!(record.count(), 2);
    }

    #[test]
    fn test_from_node_ignores_non_true_markers() {
        let node = json!({"likes": 1, "likedBy": {"u1": true, "u2": false, "u3": "yes"}});
        let record = EngagementRecord::from_node(&path(), Some(&node)).unwrap();
        assert_eq!(record, EngagementRecord::from_actors([actor("u1")]));
    }

    #[test]
    fn test_from_node_rejects_malformed() {
        let cases = [
            json!("not an object"),
            json!({"likedBy": ["u1"]}),
            json!({"likes": -1}),
            json!({"likes": 1.5}),
            json!({"likes": "3"}),
            json!({"likedBy": {"": true}}),
            json!({"likedBy": {"   ": true}}),
        ];
        for node in cases {
            let err = EngagementRecord::from_node(&path(), Some(&node)).unwrap_err();
            assert!(
                matches!(err, ValidationError::MalformedRecord { .. }),
                "expected malformed for {node}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_apply_to_node_preserves_other_fields() {
        let node = json!({
            "title": "Granny square",
            "comments": {"c1": {"text": "nice"}},
            "likes": 9,
        });
        let record = EngagementRecord::from_actors([actor("u1")]);
        let out = record.apply_to_node(&node);
        assert_eq!(out["title"], "Granny square");
        assert_eq!(out["comments"]["c1"]["text"], "nice");
        assert_eq!(out["likes"], 1);
        assert_eq!(out["likedBy"], json!({"u1": true}));
    }

    #[test]
    fn test_apply_empty_record_drops_membership() {
        let node = json!({"likes": 1, "likedBy": {"u1": true}});
        let out = EngagementRecord::empty().apply_to_node(&node);
        assert_eq!(out, json!({"likes": 0}));
    }

    #[test]
    fn test_serde_recomputes_count() {
        let record: EngagementRecord = serde_json::from_value(json!({"count": 5, "engagedBy": ["a"]})).unwrap();
        assert_eq!(record.count(), 1);
        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back, json!({"count": 1, "engagedBy": ["a"]}));
    }
}
