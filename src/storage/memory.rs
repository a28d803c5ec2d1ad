//! In-memory storage backend.
//!
//! This module provides a thread-safe in-memory implementation of
//! [`DocumentStore`]. It is intended for embedded usage, tests and
//! simulations, and as the reference implementation of the transaction
//! contract: transaction functions run outside any lock, and a result is only
//! committed if the value at the path still equals the snapshot the function
//! was shown. Otherwise the function is re-run against the fresh value.

use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::CraftConfig;
use crate::path::DataPath;
use crate::storage::traits::{
    DocumentStore, Mutation, StorageError, TransactionCommit, TransactionFn, TransactionOutcome,
};
use crate::storage::tree;
use crate::subscription::{SnapshotSource, Subscription, SubscriptionConfig, SubscriptionHub};

/// Default transaction retry budget.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 25;

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// Receives every mutation before it is applied. Durable backends use this to
/// write ahead of the in-memory tree.
pub trait CommitSink: Send + Sync {
    /// Record a mutation. An error aborts the commit.
    fn record(&self, mutation: &Mutation) -> Result<(), StorageError>;
}

impl<T: CommitSink + ?Sized> CommitSink for Arc<T> {
    fn record(&self, mutation: &Mutation) -> Result<(), StorageError> {
        (**self).record(mutation)
    }
}

#[derive(Debug, Default)]
struct TreeState {
    root: Value,
    revision: u64,
}

impl TreeState {
    fn apply(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::Set { path, value } => tree::set(&mut self.root, path, value.clone()),
            Mutation::Merge { path, children } => tree::merge(&mut self.root, path, children),
        }
        self.revision += 1;
    }
}

#[derive(Debug, Default)]
struct SharedTree {
    state: RwLock<TreeState>,
}

impl SnapshotSource for SharedTree {
    fn snapshot(&self, path: &DataPath) -> Result<(Option<Value>, u64), StorageError> {
        let state = self.state.read().map_err(|_| lock_err("tree.snapshot"))?;
        Ok((tree::get(&state.root, path).cloned(), state.revision))
    }
}

/// Thread-safe in-memory document store.
pub struct InMemoryDocumentStore {
    tree: Arc<SharedTree>,
    hub: SubscriptionHub,
    max_attempts: u32,
    sink: Option<Box<dyn CommitSink>>,
}

impl fmt::Debug for InMemoryDocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryDocumentStore")
            .field("max_attempts", &self.max_attempts)
            .field("durable", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    /// Create a new empty store with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(DEFAULT_MAX_ATTEMPTS, SubscriptionConfig::default())
    }

    /// Create a store using the transaction and subscription settings of `cfg`.
    #[must_use]
    pub fn from_config(cfg: &CraftConfig) -> Self {
        Self::with_options(cfg.transaction_max_attempts, cfg.subscriptions.clone())
    }

    /// Create a store with an explicit retry budget.
    #[must_use]
    pub fn with_options(max_attempts: u32, subscriptions: SubscriptionConfig) -> Self {
        let tree = Arc::new(SharedTree::default());
        let hub = SubscriptionHub::new(subscriptions, Arc::clone(&tree) as Arc<dyn SnapshotSource>);
        Self {
            tree,
            hub,
            max_attempts: max_attempts.max(1),
            sink: None,
        }
    }

    /// Attach a sink that sees every mutation before it is applied.
    #[must_use]
    #[cfg_attr(not(feature = "persistent"), allow(dead_code))]
    pub(crate) fn with_sink(mut self, sink: Box<dyn CommitSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Apply a mutation recovered from a durable log, bypassing the sink.
    #[cfg_attr(not(feature = "persistent"), allow(dead_code))]
    pub(crate) fn replay(&self, mutation: &Mutation) -> Result<(), StorageError> {
        let mut state = self.tree.state.write().map_err(|_| lock_err("tree.replay"))?;
        state.apply(mutation);
        Ok(())
    }

    /// Run `f` on the whole tree while commits are held off.
    #[cfg_attr(not(feature = "persistent"), allow(dead_code))]
    pub(crate) fn with_frozen_tree<R>(
        &self,
        f: impl FnOnce(&Value) -> Result<R, StorageError>,
    ) -> Result<R, StorageError> {
        let state = self.tree.state.read().map_err(|_| lock_err("tree.freeze"))?;
        f(&state.root)
    }

    /// The transaction retry budget.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Number of committed mutations so far.
    pub fn revision(&self) -> Result<u64, StorageError> {
        let state = self.tree.state.read().map_err(|_| lock_err("tree.revision"))?;
        Ok(state.revision)
    }

    /// Copy of the whole tree.
    pub fn export(&self) -> Result<Value, StorageError> {
        let state = self.tree.state.read().map_err(|_| lock_err("tree.export"))?;
        Ok(state.root.clone())
    }

    /// Deliveries deferred because a subscriber was slow.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.hub.dropped_events()
    }

    fn commit(&self, mutation: Mutation, context: &'static str) -> Result<(), StorageError> {
        {
            let mut state = self.tree.state.write().map_err(|_| lock_err(context))?;
            self.commit_locked(&mut state, &mutation)?;
        }
        self.hub.notify();
        Ok(())
    }

    fn commit_locked(&self, state: &mut TreeState, mutation: &Mutation) -> Result<(), StorageError> {
        if let Some(sink) = &self.sink {
            sink.record(mutation)?;
        }
        state.apply(mutation);
        Ok(())
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn read(&self, path: &DataPath) -> Result<Option<Value>, StorageError> {
        let state = self.tree.state.read().map_err(|_| lock_err("store.read"))?;
        Ok(tree::get(&state.root, path).cloned())
    }

    fn write(&self, path: &DataPath, value: Value) -> Result<(), StorageError> {
        self.commit(
            Mutation::Set {
                path: path.clone(),
                value: tree::normalize(value),
            },
            "store.write",
        )
    }

    fn update(&self, path: &DataPath, children: Vec<(String, Value)>) -> Result<(), StorageError> {
        if children.is_empty() {
            return Ok(());
        }
        let mut parsed = Vec::with_capacity(children.len());
        for (key, value) in children {
            let relative = DataPath::parse(&key)?;
            if relative.is_root() {
                return Err(StorageError::BackendError(format!(
                    "update at '{path}' has an empty child key"
                )));
            }
            parsed.push((relative, tree::normalize(value)));
        }
        self.commit(
            Mutation::Merge {
                path: path.clone(),
                children: parsed,
            },
            "store.update",
        )
    }

    fn transact(&self, path: &DataPath, update: &mut TransactionFn<'_>) -> Result<TransactionCommit, StorageError> {
        for attempt in 1..=self.max_attempts {
            let snapshot = self.read(path)?;

            // No lock is held while user code runs.
            let value = match update(snapshot.as_ref()) {
                TransactionOutcome::Abort => {
                    return Ok(TransactionCommit {
                        committed: false,
                        snapshot,
                        attempts: attempt,
                    });
                }
                TransactionOutcome::Commit(value) => tree::normalize(value),
            };
            let proposed = if value.is_null() { None } else { Some(value) };

            {
                let mut state = self.tree.state.write().map_err(|_| lock_err("store.transact"))?;
                let current = tree::get(&state.root, path);
                if current != snapshot.as_ref() {
                    debug!(%path, attempt, "Transaction snapshot is stale; retrying");
                    continue;
                }
                if current == proposed.as_ref() {
                    // Nothing to write.
                    return Ok(TransactionCommit {
                        committed: true,
                        snapshot: proposed,
                        attempts: attempt,
                    });
                }
                let mutation = Mutation::Set {
                    path: path.clone(),
                    value: proposed.clone().unwrap_or(Value::Null),
                };
                self.commit_locked(&mut state, &mutation)?;
            }
            self.hub.notify();

            return Ok(TransactionCommit {
                committed: true,
                snapshot: proposed,
                attempts: attempt,
            });
        }

        warn!(%path, attempts = self.max_attempts, "Transaction exhausted its retry budget");
        Err(StorageError::TransactionExhausted {
            path: path.clone(),
            attempts: self.max_attempts,
        })
    }

    fn subscribe(&self, path: &DataPath) -> Result<Subscription, StorageError> {
        self.hub.register(path)
    }
}
