//! Persistent storage backend.
//!
//! Durable, single-process storage built from:
//! - the in-memory tree, which serves every read and subscription
//! - a write-ahead log that records each mutation before it is applied
//! - an exclusive lock on the data directory
//!
//! ```text
//! write/update/transact
//!         │
//!         ↓
//! ┌──────────────────┐  record   ┌───────────────┐
//! │ InMemory tree    │ ────────→ │ WriteAheadLog │
//! │ (write lock held)│           │ (CRC framed)  │
//! └──────────────────┘           └───────────────┘
//! ```
//!
//! On open the log is replayed into a fresh tree. Once the log grows past
//! [`PersistentConfig::max_wal_size`] it is rewritten as a snapshot of the
//! tree, split into entries that each fit one frame.

mod codec;
mod file_lock;
mod store;
mod wal;

pub use file_lock::DirLock;
pub use store::PersistentDocumentStore;
pub use wal::{Recovery, WalEntry, WriteAheadLog};

use crate::error::ValidationError;

/// Configuration for persistent storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentConfig {
    /// Whether to fsync after every append (slower but safer).
    pub sync_on_write: bool,
    /// Log size that triggers compaction (bytes).
    pub max_wal_size: u64,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            max_wal_size: 64 * 1024 * 1024,
        }
    }
}

impl PersistentConfig {
    /// Smallest accepted compaction threshold. Anything lower would compact on
    /// nearly every write.
    pub const MIN_WAL_SIZE: u64 = 4 * 1024;

    /// Check the configuration.
    ///
    /// # Errors
    /// `InvalidConfig` if `max_wal_size` is below [`Self::MIN_WAL_SIZE`].
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.max_wal_size < Self::MIN_WAL_SIZE {
            return Err(ValidationError::InvalidConfig {
                reason: format!(
                    "max_wal_size must be at least {} bytes (got {})",
                    Self::MIN_WAL_SIZE,
                    self.max_wal_size
                ),
            });
        }
        Ok(self)
    }
}
