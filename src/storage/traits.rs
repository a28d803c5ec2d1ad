//! Abstract document store trait for Craftable.
//!
//! The store is a tree of JSON values addressed by [`DataPath`]. It offers
//! plain reads and unconditional writes, multi-child merges, optimistic
//! read-modify-write transactions and change subscriptions. By using a trait
//! we enable:
//! - An in-memory backend for tests, simulations and embedded use
//! - A persistent (WAL) backend behind the `persistent` feature
//! - Remote realtime-database adapters supplied by the application

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::ValidationError;
use crate::path::DataPath;
use crate::subscription::Subscription;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A transaction could not commit within the retry budget.
    #[error("Transaction at '{path}' exhausted {attempts} attempts")]
    TransactionExhausted { path: DataPath, attempts: u32 },

    /// A child key passed to `update` is not a legal relative path.
    #[error("Invalid path: {0}")]
    InvalidPath(#[from] ValidationError),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The subscription dispatcher or a remote connection went away.
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// Durable log I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Returns true if the same call may succeed when retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TransactionExhausted { .. } | Self::Disconnected(_))
    }
}

/// What a transaction function wants done with the value it was shown.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionOutcome {
    /// Replace the value at the path. `Value::Null` deletes it.
    Commit(Value),
    /// Leave the stored value untouched and stop retrying.
    Abort,
}

/// Result of a settled transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionCommit {
    /// False if the transaction function aborted.
    pub committed: bool,
    /// The value at the path once the transaction settled.
    pub snapshot: Option<Value>,
    /// How many times the transaction function ran.
    pub attempts: u32,
}

/// A committed change, as recorded by durable backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    /// Replace (or delete, when null) the value at `path`.
    Set { path: DataPath, value: Value },
    /// Replace several descendants of `path` at once.
    Merge {
        path: DataPath,
        children: Vec<(DataPath, Value)>,
    },
}

/// Transaction body. Receives the current value at the path (`None` when absent).
///
/// The store may call it several times: once per attempt, each time with the
/// latest committed value. It must therefore be free of side effects other
/// than computing its return value.
pub type TransactionFn<'a> = dyn FnMut(Option<&Value>) -> TransactionOutcome + 'a;

/// Transactional, subscribable document store.
///
/// # Safety Considerations
/// - `transact` must never apply an outcome computed from a stale snapshot
/// - Implementations must handle concurrent access safely
pub trait DocumentStore: Send + Sync {
    /// Read the value at a path. Absent nodes read as `None`.
    fn read(&self, path: &DataPath) -> Result<Option<Value>, StorageError>;

    /// Unconditionally replace the value at a path. `Value::Null` deletes it.
    fn write(&self, path: &DataPath, value: Value) -> Result<(), StorageError>;

    /// Atomically replace several descendants of `path`. Child keys are
    /// relative paths and may span several levels (`"boards/Knits/description"`).
    fn update(&self, path: &DataPath, children: Vec<(String, Value)>) -> Result<(), StorageError>;

    /// Run an optimistic read-modify-write transaction against one path.
    ///
    /// # Errors
    /// `TransactionExhausted` if a concurrent writer won every attempt.
    fn transact(&self, path: &DataPath, update: &mut TransactionFn<'_>) -> Result<TransactionCommit, StorageError>;

    /// Subscribe to the value at a path. The subscription first yields the
    /// current value, then every subsequent change.
    fn subscribe(&self, path: &DataPath) -> Result<Subscription, StorageError>;
}
