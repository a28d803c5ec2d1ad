//! Applies engagement toggles to stored items.
//!
//! The reconciler submits [`toggle_engagement`] as the body of a
//! [`DocumentStore::transact`] call keyed by the item's path. The store re-runs
//! the body against the latest committed node whenever another writer commits
//! first, so concurrent toggles from many actors serialize without a global
//! lock and no update is lost.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::engagement::{toggle_engagement, EngagementRecord};
use crate::error::{CraftError, CraftResult, ValidationError};
use crate::ids::{ActorId, CommentId, PostId};
use crate::path::DataPath;
use crate::schema;
use crate::storage::{DocumentStore, TransactionOutcome};

/// An item that carries an engagement record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngagementTarget {
    /// `posts/{post_id}`
    Post { post_id: PostId },
    /// A comment or a reply at any depth. The first id is the top-level
    /// comment; each following id is a reply to the previous one.
    Comment { post_id: PostId, thread: Vec<CommentId> },
}

impl EngagementTarget {
    #[must_use]
    pub const fn post(post_id: PostId) -> Self {
        Self::Post { post_id }
    }

    /// Target a comment thread.
    ///
    /// # Errors
    /// `EmptyThread` if `thread` is empty.
    pub fn comment(post_id: PostId, thread: Vec<CommentId>) -> Result<Self, ValidationError> {
        if thread.is_empty() {
            return Err(ValidationError::EmptyThread);
        }
        Ok(Self::Comment { post_id, thread })
    }

    /// The post the target belongs to.
    #[must_use]
    pub fn post_id(&self) -> &PostId {
        match self {
            Self::Post { post_id } | Self::Comment { post_id, .. } => post_id,
        }
    }

    /// The node holding the target's engagement fields.
    ///
    /// # Errors
    /// `EmptyThread` for a comment target without ids.
    pub fn path(&self) -> Result<DataPath, ValidationError> {
        match self {
            Self::Post { post_id } => Ok(schema::post(post_id)),
            Self::Comment { post_id, thread } => schema::comment(post_id, thread),
        }
    }
}

/// Result of a settled toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// The record as committed.
    pub record: EngagementRecord,
    /// How many times the toggle ran before it committed.
    pub attempts: u32,
    /// True if the item was rewritten: the membership changed, or a stale
    /// `likes` was repaired. False means nothing was written.
    pub changed: bool,
}

/// Why the transaction body declined to commit.
enum Declined {
    Missing,
    Malformed(ValidationError),
}

/// The stored `likes`, with an absent field read as zero.
fn stored_count(node: &Value) -> u64 {
    node.get(schema::fields::LIKES).and_then(Value::as_u64).unwrap_or(0)
}

/// Runs engagement toggles against a store.
#[derive(Clone)]
pub struct EngagementReconciler {
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for EngagementReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngagementReconciler").finish_non_exhaustive()
    }
}

impl EngagementReconciler {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Set `actor`'s engagement with `target` to `intended`.
    ///
    /// # Errors
    /// - `NotFound` if the item does not exist (nothing is written)
    /// - `Validation(MalformedRecord)` if the stored engagement fields are malformed
    /// - `ReconciliationFailed` if concurrent writers won every attempt
    pub fn apply(&self, target: &EngagementTarget, actor: &ActorId, intended: bool) -> CraftResult<ReconcileOutcome> {
        let path = target.path()?;

        let mut declined: Option<Declined> = None;
        let mut settled: Option<(EngagementRecord, bool)> = None;

        let commit = self
            .store
            .transact(&path, &mut |current: Option<&Value>| {
                declined = None;
                settled = None;

                let Some(node) = current else {
                    declined = Some(Declined::Missing);
                    return TransactionOutcome::Abort;
                };
                let record = match EngagementRecord::from_node(&path, Some(node)) {
                    Ok(record) => record,
                    Err(err) => {
                        declined = Some(Declined::Malformed(err));
                        return TransactionOutcome::Abort;
                    }
                };

                let next = toggle_engagement(&record, actor, intended);
                if next == record && stored_count(node) == record.count() {
                    // Hand back the stored node so the store skips the write.
                    settled = Some((next, false));
                    return TransactionOutcome::Commit(node.clone());
                }
                let updated = next.apply_to_node(node);
                let changed = &updated != node;
                settled = Some((next, changed));
                TransactionOutcome::Commit(updated)
            })
            .map_err(|err| {
                let err = CraftError::from(err);
                if err.is_reconciliation_failed() {
                    warn!(%path, %actor, intended, "Engagement toggle gave up; caller must resync");
                }
                err
            })?;

        if !commit.committed {
            return Err(match declined {
                Some(Declined::Malformed(err)) => err.into(),
                Some(Declined::Missing) | None => CraftError::NotFound { path },
            });
        }

        let (record, changed) = settled.ok_or_else(|| CraftError::internal("transaction committed without a result"))?;
        debug!(%path, %actor, intended, attempts = commit.attempts, count = record.count(), "Engagement reconciled");

        Ok(ReconcileOutcome {
            record,
            attempts: commit.attempts,
            changed,
        })
    }

    /// Read the current engagement record of `target`.
    ///
    /// # Errors
    /// `NotFound` if the item does not exist, `Validation` if it is malformed.
    pub fn read(&self, target: &EngagementTarget) -> CraftResult<EngagementRecord> {
        let path = target.path()?;
        let node = self.store.read(&path)?;
        if node.is_none() {
            return Err(CraftError::NotFound { path });
        }
        Ok(EngagementRecord::from_node(&path, node.as_ref())?)
    }
}
