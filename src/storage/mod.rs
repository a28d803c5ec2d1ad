//! Storage layer for Craftable.
//!
//! [`DocumentStore`] is the abstract interface every backend implements.
//! [`InMemoryDocumentStore`] is the reference backend; the durable backend in
//! [`persistent`] wraps it with a write-ahead log.

mod memory;
mod traits;
pub(crate) mod tree;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::{CommitSink, InMemoryDocumentStore, DEFAULT_MAX_ATTEMPTS};
pub use traits::{
    DocumentStore, Mutation, StorageError, TransactionCommit, TransactionFn, TransactionOutcome,
};

#[cfg(feature = "persistent")]
pub use persistent::{PersistentConfig, PersistentDocumentStore};
