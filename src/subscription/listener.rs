//! Callback-style listeners on top of subscription streams.

use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;

use crate::error::CraftError;
use crate::storage::StorageError;

use super::dispatcher::ControlMsg;
use super::events::{Snapshot, SubscriptionId};
use super::stream::Subscription;

/// Handle to a running listener thread.
///
/// Dropping the handle unregisters the subscription; the thread exits once the
/// dispatcher has removed it. Use [`stop`](Self::stop) to also wait for it.
#[derive(Debug)]
pub struct ListenerHandle {
    subscription_id: SubscriptionId,
    control_tx: Sender<ControlMsg>,
    join: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// Unregister and wait for the listener thread to finish.
    ///
    /// Must not be called from inside one of the listener's own callbacks.
    pub fn stop(mut self) {
        self.unregister();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    fn unregister(&self) {
        let _ = self.control_tx.try_send(ControlMsg::Unregister {
            subscription_id: self.subscription_id,
        });
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.unregister();
        }
    }
}

impl Subscription {
    /// Move this subscription onto a dedicated thread that calls `on_change` for
    /// every snapshot and `on_error` for every read failure. Read failures do
    /// not stop the listener.
    ///
    /// # Errors
    /// `Io` if the listener thread cannot be spawned.
    pub fn listen<F, E>(self, mut on_change: F, mut on_error: E) -> Result<ListenerHandle, StorageError>
    where
        F: FnMut(Snapshot) + Send + 'static,
        E: FnMut(CraftError) + Send + 'static,
    {
        let subscription_id = self.subscription_id();
        let control_tx = self.control_sender();

        let join = thread::Builder::new()
            .name(format!("craftable-listener-{}", self.path()))
            .spawn(move || loop {
                match self.recv() {
                    Ok(snapshot) => on_change(snapshot),
                    Err(err @ CraftError::ReadFailed { .. }) => on_error(err),
                    Err(_) => break,
                }
            })?;

        Ok(ListenerHandle {
            subscription_id,
            control_tx,
            join: Some(join),
        })
    }
}
