//! # Craftable - engagement reconciliation for a crafting social app
//!
//! Craftable stores posts, nested comments, boards and profiles in a tree of
//! JSON documents. The one piece of non-trivial logic is the like counter:
//! many actors may like and unlike the same post or comment at the same time,
//! and every toggle must land exactly once without a global lock.
//!
//! ## Core Concepts
//!
//! - **EngagementRecord**: who engaged with an item; the count is derived from the membership
//! - **toggle_engagement**: idempotent, pure state transition for one actor
//! - **EngagementReconciler**: runs toggles as optimistic store transactions
//! - **DocumentStore**: transactional, subscribable tree store (in-memory or WAL-backed)
//! - **OptimisticEngagement**: local-then-confirmed state for interactive callers
//! - **CraftEngine**: the application's content operations for the signed-in actor
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use craftable::{ActorId, CraftConfig, CraftEngine, NewPost, StaticAuth};
//!
//! let auth = Arc::new(StaticAuth::signed_in(ActorId::new("u1")?));
//! let engine = CraftEngine::in_memory(auth.clone(), CraftConfig::default());
//!
//! let post_id = engine.create_post(&NewPost::new("Granny square", "free pattern", "aW1hZ2U="))?;
//! engine.set_post_liked(&post_id, true)?;
//!
//! auth.set_actor(Some(ActorId::new("u2")?));
//! let outcome = engine.set_post_liked(&post_id, true)?;
//! assert_eq!(outcome.record.count(), 2);
//! # Ok::<(), craftable::CraftError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod clock;
pub mod error;
pub mod ids;
pub mod path;
pub mod schema;

// Engagement
pub mod engagement;
pub mod optimistic;
pub mod reconciler;

// Storage and subscriptions
pub mod storage;
pub mod subscription;

// Application surface
pub mod auth;
pub mod config;
pub mod engine;
pub mod model;

// Re-export primary types at crate root for convenience
pub use auth::{AuthProvider, StaticAuth};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ContentLimits, CraftConfig};
pub use engagement::{toggle_engagement, EngagementRecord};
pub use engine::{AuthoredComment, CraftEngine, FeedSubscription, PostSubscription};
pub use error::{CraftError, CraftResult, ValidationError};
pub use ids::{ActorId, CommentId, PostId, PushIdGenerator};
pub use model::{Board, Comment, NewComment, NewPost, Post, UserProfile};
pub use optimistic::{Confirmation, EngagementView, OptimisticEngagement, OptimisticState};
pub use path::DataPath;
pub use reconciler::{EngagementReconciler, EngagementTarget, ReconcileOutcome};
pub use storage::{
    DocumentStore, InMemoryDocumentStore, Mutation, StorageError, TransactionCommit, TransactionOutcome,
};
pub use subscription::{ListenerHandle, Snapshot, Subscription, SubscriptionConfig, SubscriptionEvent};

#[cfg(feature = "persistent")]
pub use storage::{PersistentConfig, PersistentDocumentStore};
