//! Subscription identifiers and the events delivered to subscribers.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::path::DataPath;

/// Unique identifier for a subscription.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// The value at a subscribed path as of some committed revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub path: DataPath,
    /// `None` when nothing is stored at the path.
    pub value: Option<Value>,
    /// Store revision the value was read at.
    pub revision: u64,
}

impl Snapshot {
    #[must_use]
    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    /// Deserialize the value into a typed model. Absent values yield `Ok(None)`.
    ///
    /// # Errors
    /// Returns the serde error if the stored shape does not match `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.value
            .as_ref()
            .map(|v| T::deserialize(v))
            .transpose()
    }
}

/// Event delivered on a subscription stream.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// The value at the path changed (or this is the initial value).
    Changed(Snapshot),
    /// Reading the path failed. The subscription stays registered and will
    /// deliver the next successful read.
    Failed { path: DataPath, reason: String },
}
