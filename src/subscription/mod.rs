//! Change subscriptions on the document store.
//!
//! A subscription is an explicit handle owned by the calling context: it is
//! created by [`DocumentStore::subscribe`](crate::storage::DocumentStore::subscribe),
//! delivers snapshots through a channel, and is released deterministically when
//! dropped. A subscription first yields the current value and afterwards only
//! values that differ from the last one delivered.

/// Registration storage and snapshot dispatch worker.
pub mod dispatcher;
/// Subscription ids, snapshots and events.
pub mod events;
/// Callback listener threads.
pub mod listener;
/// Subscriber stream handle.
pub mod stream;

pub use dispatcher::{SnapshotSource, SubscriptionConfig, SubscriptionHub};
pub use events::{Snapshot, SubscriptionEvent, SubscriptionId};
pub use listener::ListenerHandle;
pub use stream::Subscription;
