//! Identifiers for actors, posts and comments.
//!
//! Posts and comments use push keys: 20-character keys whose first 8
//! characters encode the creation time in milliseconds, so lexicographic key
//! order matches creation order. The remaining 12 characters are random and are
//! incremented when two keys are generated in the same millisecond.

use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::path::validate_segment;

/// Push key alphabet, in ASCII order.
const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Length of a generated push key.
pub const PUSH_KEY_LEN: usize = 20;

/// Identifier of an authenticated user performing an action.
///
/// # Examples
///
/// ```
/// use craftable::ActorId;
///
/// let actor = ActorId::new("u1").unwrap();
/// assert_eq!(actor.as_str(), "u1");
/// assert!(ActorId::new("  ").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActorId(String);

impl ActorId {
    /// Create an actor id. The id must be a non-empty, legal key.
    ///
    /// # Errors
    /// `EmptyActorId` for empty or whitespace-only input, `InvalidPathSegment`
    /// if the id cannot be used as a key.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyActorId);
        }
        validate_segment(&id)?;
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ActorId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ActorId> for String {
    fn from(id: ActorId) -> Self {
        id.0
    }
}

/// Identifier of a post.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    /// Wrap an existing key.
    ///
    /// # Errors
    /// Returns `InvalidPathSegment` if `key` is not a legal key.
    pub fn from_key(key: impl Into<String>) -> Result<Self, ValidationError> {
        let key = key.into();
        validate_segment(&key)?;
        Ok(Self(key))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a comment or reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(String);

impl CommentId {
    /// Wrap an existing key.
    ///
    /// # Errors
    /// Returns `InvalidPathSegment` if `key` is not a legal key.
    pub fn from_key(key: impl Into<String>) -> Result<Self, ValidationError> {
        let key = key.into();
        validate_segment(&key)?;
        Ok(Self(key))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Default)]
struct PushState {
    last_millis: i64,
    last_random: [u8; 12],
}

/// Generator of time-ordered push keys.
///
/// Keys generated by one generator are strictly increasing, even within a
/// single millisecond or if the clock steps backwards.
#[derive(Debug, Default)]
pub struct PushIdGenerator {
    state: Mutex<PushState>,
}

impl PushIdGenerator {
    /// Create a new generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate the next key for the given creation time.
    pub fn next_key(&self, now: DateTime<Utc>) -> String {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut millis = now.timestamp_millis().max(0);
        if millis <= state.last_millis && state.last_millis > 0 {
            millis = state.last_millis;
            // Same (or earlier) millisecond: increment the random suffix.
            let mut i = state.last_random.len();
            while i > 0 {
                i -= 1;
                if state.last_random[i] == 63 {
                    state.last_random[i] = 0;
                } else {
                    state.last_random[i] += 1;
                    break;
                }
            }
        } else {
            let entropy = Uuid::new_v4();
            for (slot, byte) in state.last_random.iter_mut().zip(entropy.as_bytes()) {
                *slot = byte & 0x3F;
            }
            state.last_millis = millis;
        }

        let mut out = [0u8; PUSH_KEY_LEN];
        let mut t = millis;
        for slot in out[..8].iter_mut().rev() {
            *slot = PUSH_CHARS[(t % 64) as usize];
            t /= 64;
        }
        for (slot, r) in out[8..].iter_mut().zip(state.last_random.iter()) {
            *slot = PUSH_CHARS[*r as usize];
        }
        out.iter().map(|&b| b as char).collect()
    }

    /// Generate the next post id.
    pub fn next_post_id(&self, now: DateTime<Utc>) -> PostId {
        PostId(self.next_key(now))
    }

    /// Generate the next comment id.
    pub fn next_comment_id(&self, now: DateTime<Utc>) -> CommentId {
        CommentId(self.next_key(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_actor_id_rejects_empty() {
        assert_eq!(ActorId::new(""), Err(ValidationError::EmptyActorId));
        assert_eq!(ActorId::new("   "), Err(ValidationError::EmptyActorId));
        assert!(ActorId::new("bad.id").is_err());
    }

    #[test]
    fn test_actor_id_serde() {
        let a = ActorId::new("u1").unwrap();
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"u1\"");
        assert!(serde_json::from_str::<ActorId>("\"\"").is_err());
    }

    #[test]
    fn test_push_keys_are_ordered_by_time() {
        let gen = PushIdGenerator::new();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let a = gen.next_key(t0);
        let b = gen.next_key(t0 + Duration::milliseconds(1));
        let c = gen.next_key(t0 + Duration::seconds(60));
        assert_eq!(a.len(), PUSH_KEY_LEN);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_push_keys_unique_within_same_millisecond() {
        let gen = PushIdGenerator::new();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut prev = gen.next_key(t0);
        for _ in 0..500 {
            let next = gen.next_key(t0);
            assert!(next > prev, "{next} should sort after {prev}");
            prev = next;
        }
    }

    #[test]
    fn test_push_key_is_valid_segment() {
        let gen = PushIdGenerator::new();
        let key = gen.next_key(Utc::now());
        assert!(PostId::from_key(key).is_ok());
    }
}
