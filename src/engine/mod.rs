//! Content engine.
//!
//! [`CraftEngine`] performs the application's operations (posts, comments,
//! engagement, boards and profiles) on behalf of the signed-in actor against a
//! pluggable [`DocumentStore`]. Content writes are plain overwrites; only
//! engagement goes through the reconciler's transactions.

mod boards;
mod comments;
mod engagement;
mod posts;
mod profiles;

pub use comments::AuthoredComment;
pub use posts::{FeedSubscription, PostSubscription};

use std::sync::Arc;

use crate::auth::AuthProvider;
use crate::clock::{Clock, SystemClock};
use crate::config::CraftConfig;
use crate::error::{CraftError, CraftResult};
use crate::ids::{ActorId, PushIdGenerator};
use crate::path::DataPath;
use crate::reconciler::EngagementReconciler;
use crate::storage::{DocumentStore, InMemoryDocumentStore, StorageError};

/// Craftable operations for one signed-in actor at a time.
#[derive(Clone)]
pub struct CraftEngine {
    store: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthProvider>,
    clock: Arc<dyn Clock>,
    ids: Arc<PushIdGenerator>,
    reconciler: EngagementReconciler,
    cfg: CraftConfig,
}

impl std::fmt::Debug for CraftEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CraftEngine")
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

impl CraftEngine {
    /// Create an engine with default configuration and the system clock.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, auth: Arc<dyn AuthProvider>) -> Self {
        Self::with_config(store, auth, CraftConfig::default())
    }

    /// Create an engine with explicit configuration.
    ///
    /// The store's own retry budget is set when the store is built; see
    /// [`InMemoryDocumentStore::from_config`].
    #[must_use]
    pub fn with_config(store: Arc<dyn DocumentStore>, auth: Arc<dyn AuthProvider>, cfg: CraftConfig) -> Self {
        let reconciler = EngagementReconciler::new(Arc::clone(&store));
        Self {
            store,
            auth,
            clock: Arc::new(SystemClock),
            ids: Arc::new(PushIdGenerator::new()),
            reconciler,
            cfg,
        }
    }

    /// An engine over a fresh in-memory store built from `cfg`.
    #[must_use]
    pub fn in_memory(auth: Arc<dyn AuthProvider>, cfg: CraftConfig) -> Self {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::from_config(&cfg));
        Self::with_config(store, auth, cfg)
    }

    /// Replace the clock used for timestamps and push ids.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get a reference to the document store.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn config(&self) -> &CraftConfig {
        &self.cfg
    }

    /// The reconciler engagement operations run through.
    pub fn reconciler(&self) -> &EngagementReconciler {
        &self.reconciler
    }

    fn actor(&self) -> CraftResult<ActorId> {
        self.auth.current_actor_id().ok_or(CraftError::Unauthenticated)
    }

    fn require(&self, path: &DataPath) -> CraftResult<()> {
        if self.store.read(path)?.is_none() {
            return Err(CraftError::NotFound { path: path.clone() });
        }
        Ok(())
    }
}

fn serialization(err: serde_json::Error) -> CraftError {
    CraftError::Storage(StorageError::SerializationError(err.to_string()))
}
