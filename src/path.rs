//! Slash-separated locations in the document tree.
//!
//! A `DataPath` addresses a node such as `posts/{postId}/comments/{commentId}`.
//! The empty path is the root of the tree. Segments are validated once on
//! construction so every stored path is a legal key sequence.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// Maximum byte length of a single key.
pub const MAX_SEGMENT_LEN: usize = 768;

static SEGMENT_RE: OnceLock<Regex> = OnceLock::new();

fn segment_regex() -> &'static Regex {
    SEGMENT_RE.get_or_init(|| {
        // Keys may not contain '.', '#', '$', '[', ']', '/' or ASCII control characters.
        Regex::new(r"^[^.#$\[\]/\x00-\x1F\x7F]+$").expect("key regex is valid")
    })
}

/// Validate a single key.
pub fn validate_segment(segment: &str) -> Result<(), ValidationError> {
    if segment.is_empty() {
        return Err(ValidationError::InvalidPathSegment {
            segment: String::new(),
            reason: "empty key".to_string(),
        });
    }
    if segment.len() > MAX_SEGMENT_LEN {
        return Err(ValidationError::InvalidPathSegment {
            segment: segment.chars().take(32).collect(),
            reason: format!("key exceeds {MAX_SEGMENT_LEN} bytes"),
        });
    }
    if !segment_regex().is_match(segment) {
        return Err(ValidationError::InvalidPathSegment {
            segment: segment.to_string(),
            reason: "keys may not contain '.', '#', '$', '[', ']', '/' or control characters".to_string(),
        });
    }
    Ok(())
}

/// A validated location in the document tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataPath {
    segments: Vec<String>,
}

impl DataPath {
    /// The root of the tree.
    #[must_use]
    pub const fn root() -> Self {
        Self { segments: Vec::new() }
    }

    /// Parse a slash-separated path. Leading and trailing slashes are ignored.
    ///
    /// # Errors
    /// Returns `InvalidPathSegment` if any segment is empty or contains a forbidden character.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        for segment in trimmed.split('/') {
            validate_segment(segment)?;
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    /// Build a path from individual keys.
    ///
    /// # Errors
    /// Returns `InvalidPathSegment` if any key is invalid.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Self::root();
        for segment in segments {
            out = out.child(segment.as_ref())?;
        }
        Ok(out)
    }

    /// Return the path of a direct child.
    ///
    /// # Errors
    /// Returns `InvalidPathSegment` if `key` is not a legal key.
    pub fn child(&self, key: &str) -> Result<Self, ValidationError> {
        validate_segment(key)?;
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend(self.segments.iter().cloned());
        segments.push(key.to_string());
        Ok(Self { segments })
    }

    /// Append a key that is already known to be legal (a constant or a typed id).
    pub(crate) fn child_trusted(&self, key: &str) -> Self {
        debug_assert!(validate_segment(key).is_ok(), "untrusted key {key:?}");
        let mut segments = self.segments.clone();
        segments.push(key.to_string());
        Self { segments }
    }

    /// Append an already validated relative path.
    #[must_use]
    pub fn join(&self, relative: &Self) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(relative.segments.iter().cloned());
        Self { segments }
    }

    /// Parent path, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Last key, or `None` for the root.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// All keys from the root down.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True if `self` equals `other` or is one of its ancestors.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        other.segments.len() >= self.segments.len()
            && self.segments.iter().zip(&other.segments).all(|(a, b)| a == b)
    }

    /// True if a write at one path can change the value observed at the other.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.contains(other) || other.contains(self)
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        write!(f, "{}", self.segments.join("/"))
    }
}

impl Serialize for DataPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.segments.join("/"))
    }
}

impl<'de> Deserialize<'de> for DataPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
