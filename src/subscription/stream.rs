use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{CraftError, CraftResult};
use crate::path::DataPath;
use crate::storage::StorageError;

use super::dispatcher::ControlMsg;
use super::events::{Snapshot, SubscriptionEvent, SubscriptionId};

/// A subscription to the value at one path.
///
/// The handle is owned by the calling context. Dropping it unregisters the
/// subscription (best-effort, non-blocking).
#[derive(Debug)]
pub struct Subscription {
    subscription_id: SubscriptionId,
    path: DataPath,
    rx: Receiver<SubscriptionEvent>,
    control_tx: Sender<ControlMsg>,
    unregistered: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(
        subscription_id: SubscriptionId,
        path: DataPath,
        rx: Receiver<SubscriptionEvent>,
        control_tx: Sender<ControlMsg>,
    ) -> Self {
        Self {
            subscription_id,
            path,
            rx,
            control_tx,
            unregistered: AtomicBool::new(false),
        }
    }

    /// The subscription id backing this stream.
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// The subscribed path.
    #[must_use]
    pub fn path(&self) -> &DataPath {
        &self.path
    }

    pub(crate) fn control_sender(&self) -> Sender<ControlMsg> {
        self.control_tx.clone()
    }

    /// Best-effort explicit unregistration.
    ///
    /// This is non-blocking and idempotent. Once the dispatcher has removed the
    /// subscription the stream becomes disconnected.
    pub fn unsubscribe(&self) {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return;
        }

        let _ = self.control_tx.try_send(ControlMsg::Unregister {
            subscription_id: self.subscription_id,
        });
    }

    /// Receive the next snapshot (blocking).
    ///
    /// # Errors
    /// `ReadFailed` when the store could not read the path (the subscription
    /// stays live), `Storage(Disconnected)` once the subscription has ended.
    pub fn recv(&self) -> CraftResult<Snapshot> {
        match self.rx.recv() {
            Ok(event) => into_result(event),
            Err(_) => Err(disconnected()),
        }
    }

    /// Receive the next snapshot with a timeout.
    ///
    /// # Errors
    /// As [`recv`](Self::recv), plus `Timeout` if nothing arrived in time.
    pub fn recv_timeout(&self, timeout: Duration) -> CraftResult<Snapshot> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => into_result(event),
            Err(RecvTimeoutError::Timeout) => Err(CraftError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(disconnected()),
        }
    }

    /// Return the next snapshot if one is already buffered.
    pub fn try_recv(&self) -> Option<CraftResult<Snapshot>> {
        match self.rx.try_recv() {
            Ok(event) => Some(into_result(event)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(disconnected())),
        }
    }

    /// Drain everything buffered and return the most recent snapshot, if any.
    /// Read failures seen while draining are skipped.
    pub fn latest(&self) -> Option<Snapshot> {
        let mut latest = None;
        while let Ok(event) = self.rx.try_recv() {
            if let SubscriptionEvent::Changed(snapshot) = event {
                latest = Some(snapshot);
            }
        }
        latest
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Best-effort: do not block on shutdown.
        self.unsubscribe();
    }
}

fn into_result(event: SubscriptionEvent) -> CraftResult<Snapshot> {
    match event {
        SubscriptionEvent::Changed(snapshot) => Ok(snapshot),
        SubscriptionEvent::Failed { path, reason } => Err(CraftError::ReadFailed { path, reason }),
    }
}

fn disconnected() -> CraftError {
    CraftError::Storage(StorageError::Disconnected("subscription stream".to_string()))
}
