//! Local-then-confirmed engagement state for interactive callers.
//!
//! A caller that wants instant feedback applies the toggle locally with
//! [`OptimisticEngagement::begin`], runs the reconciler in the background and
//! settles with [`confirm`](OptimisticEngagement::confirm) or
//! [`revert`](OptimisticEngagement::revert). Subscriptions feed authoritative
//! updates through [`observe`](OptimisticEngagement::observe).
//!
//! ```text
//! Idle(confirmed) --begin--> Pending { base, guess } --confirm--> Confirmed(server)
//!                                                    --revert---> Reverted(base)
//! ```
//!
//! What is displayed is always derived from a record's membership; there is no
//! separate "liked" flag to fall out of sync.

use crate::engagement::{toggle_engagement, EngagementRecord};
use crate::ids::ActorId;

/// Where the machine is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimisticState {
    /// Showing the last authoritative record.
    Idle { confirmed: EngagementRecord },
    /// A local toggle is in flight.
    Pending {
        /// Authoritative record before the toggle (updated by `observe`).
        base: EngagementRecord,
        /// What the toggle is expected to produce.
        guess: EngagementRecord,
    },
    /// The server settled the toggle.
    Confirmed { record: EngagementRecord },
    /// The toggle failed and the base was restored.
    Reverted { record: EngagementRecord },
}

/// What the UI shows for one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngagementView {
    pub liked: bool,
    pub count: u64,
}

/// Result of [`OptimisticEngagement::confirm`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    /// The record now displayed.
    pub record: EngagementRecord,
    /// True if the server record differs from the local guess.
    pub disagreed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticEngagement {
    state: OptimisticState,
}

impl Default for OptimisticEngagement {
    fn default() -> Self {
        Self::new(EngagementRecord::empty())
    }
}

impl OptimisticEngagement {
    #[must_use]
    pub const fn new(confirmed: EngagementRecord) -> Self {
        Self {
            state: OptimisticState::Idle { confirmed },
        }
    }

    #[must_use]
    pub const fn state(&self) -> &OptimisticState {
        &self.state
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.state, OptimisticState::Pending { .. })
    }

    /// The record currently shown.
    #[must_use]
    pub fn displayed(&self) -> &EngagementRecord {
        match &self.state {
            OptimisticState::Idle { confirmed } => confirmed,
            OptimisticState::Pending { guess, .. } => guess,
            OptimisticState::Confirmed { record } | OptimisticState::Reverted { record } => record,
        }
    }

    /// Derive what `actor` sees.
    #[must_use]
    pub fn view(&self, actor: &ActorId) -> EngagementView {
        let record = self.displayed();
        EngagementView {
            liked: record.is_engaged(actor),
            count: record.count(),
        }
    }

    /// Apply a toggle locally and return the guess.
    ///
    /// Beginning again while a toggle is pending replaces the guess; the base
    /// stays the last authoritative record.
    pub fn begin(&mut self, actor: &ActorId, intended: bool) -> &EngagementRecord {
        let base = match &self.state {
            OptimisticState::Pending { base, .. } => base.clone(),
            _ => self.displayed().clone(),
        };
        let from = self.displayed().clone();
        let guess = toggle_engagement(&from, actor, intended);
        self.state = OptimisticState::Pending { base, guess };
        self.displayed()
    }

    /// Settle to the authoritative record written by the reconciler.
    pub fn confirm(&mut self, server: EngagementRecord) -> Confirmation {
        let disagreed = match &self.state {
            OptimisticState::Pending { guess, .. } => guess != &server,
            _ => false,
        };
        self.state = OptimisticState::Confirmed { record: server.clone() };
        Confirmation {
            record: server,
            disagreed,
        }
    }

    /// Drop the local guess and show the pre-toggle base again. Does nothing
    /// unless a toggle is pending.
    pub fn revert(&mut self) -> &EngagementRecord {
        if let OptimisticState::Pending { base, .. } = &self.state {
            self.state = OptimisticState::Reverted { record: base.clone() };
        }
        self.displayed()
    }

    /// Apply an authoritative update from a subscription.
    pub fn observe(&mut self, server: EngagementRecord) {
        match &mut self.state {
            OptimisticState::Pending { base, .. } => *base = server,
            _ => self.state = OptimisticState::Idle { confirmed: server },
        }
    }
}
