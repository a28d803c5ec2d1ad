//! Subscription dispatcher worker.
//!
//! This module owns subscription registrations and delivers snapshots to
//! per-subscription streams. Commits only enqueue a wakeup on a bounded
//! channel and never block the committing caller; the worker then re-reads each
//! subscribed path and delivers it if it changed since the last delivery.
//! Wakeups coalesce, so a subscriber always converges on the latest value even
//! if intermediate values are skipped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::path::DataPath;
use crate::storage::StorageError;

use super::events::{Snapshot, SubscriptionEvent, SubscriptionId};
use super::stream::Subscription;

/// Read access the dispatcher needs from a store.
pub trait SnapshotSource: Send + Sync {
    /// Current value at `path` and the store revision it was read at.
    fn snapshot(&self, path: &DataPath) -> Result<(Option<Value>, u64), StorageError>;
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Max queued control messages (register/unregister).
    pub control_queue_capacity: usize,
    /// Per-subscription stream buffer capacity.
    pub stream_capacity: usize,
    /// How often undelivered snapshots are retried, in milliseconds.
    pub redelivery_interval_ms: u64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            control_queue_capacity: 1024,
            stream_capacity: 256,
            redelivery_interval_ms: 50,
        }
    }
}

#[derive(Debug)]
pub(crate) enum ControlMsg {
    Register {
        subscription_id: SubscriptionId,
        path: DataPath,
        stream_tx: Sender<SubscriptionEvent>,
        reply: Sender<()>,
    },
    Unregister {
        subscription_id: SubscriptionId,
    },
}

#[derive(Debug)]
struct SubscriptionEntry {
    path: DataPath,
    tx: Sender<SubscriptionEvent>,
    /// Last value delivered; `None` until the first delivery.
    delivered: Option<Option<Value>>,
    /// A change (or failure) is waiting for buffer space.
    pending: bool,
    /// The last read failed and the failure was already reported.
    failing: bool,
}

/// Owns subscription registrations and dispatches snapshots.
///
/// This system runs a dedicated worker thread. Stores call [`notify`](Self::notify)
/// after every commit using a non-blocking `try_send`.
#[derive(Debug)]
pub struct SubscriptionHub {
    cfg: SubscriptionConfig,
    control_tx: Sender<ControlMsg>,
    wake_tx: Sender<()>,
    dropped_events: Arc<AtomicU64>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionHub {
    /// Start the dispatcher worker reading from `source`.
    pub fn new(cfg: SubscriptionConfig, source: Arc<dyn SnapshotSource>) -> Self {
        let (control_tx, control_rx) = bounded::<ControlMsg>(cfg.control_queue_capacity.max(1));
        // One pending wakeup already covers every commit made before it is consumed.
        let (wake_tx, wake_rx) = bounded::<()>(1);

        let dropped_events = Arc::new(AtomicU64::new(0));
        let thread_dropped = Arc::clone(&dropped_events);
        let tick = Duration::from_millis(cfg.redelivery_interval_ms.max(1));

        let join = thread::Builder::new()
            .name("craftable-subscriptions".to_string())
            .spawn(move || worker_loop(source, tick, thread_dropped, control_rx, wake_rx))
            .expect("failed to spawn craftable subscription dispatcher");

        Self {
            cfg,
            control_tx,
            wake_tx,
            dropped_events,
            join: Mutex::new(Some(join)),
        }
    }

    /// Register a subscription. The stream receives the current value first.
    ///
    /// # Errors
    /// `Disconnected` if the worker has stopped.
    pub fn register(&self, path: &DataPath) -> Result<Subscription, StorageError> {
        let subscription_id = SubscriptionId::new();
        let (stream_tx, stream_rx) = bounded::<SubscriptionEvent>(self.cfg.stream_capacity.max(1));
        let (reply_tx, reply_rx) = bounded::<()>(1);

        self.control_tx
            .send(ControlMsg::Register {
                subscription_id,
                path: path.clone(),
                stream_tx,
                reply: reply_tx,
            })
            .map_err(|_| StorageError::Disconnected("subscription control".to_string()))?;

        // Wait for the worker to take the initial snapshot.
        reply_rx
            .recv()
            .map_err(|_| StorageError::Disconnected("subscription control".to_string()))?;

        debug!(%path, ?subscription_id, "Subscription registered");
        Ok(Subscription::new(
            subscription_id,
            path.clone(),
            stream_rx,
            self.control_tx.clone(),
        ))
    }

    /// Signal that a commit happened. Never blocks.
    pub fn notify(&self) {
        match self.wake_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                warn!("Subscription dispatcher is gone; change notice dropped");
            }
        }
    }

    /// Number of deliveries deferred because a subscriber's buffer was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

impl Drop for SubscriptionHub {
    fn drop(&mut self) {
        // Close the wake channel so the worker terminates. Live `Subscription`s
        // hold clones of `control_tx`, so the worker watches `wake_rx` to exit.
        let (dummy_wake_tx, _) = bounded::<()>(1);
        drop(std::mem::replace(&mut self.wake_tx, dummy_wake_tx));

        if let Ok(mut guard) = self.join.lock() {
            // Detach: the worker exits on its own once the wake channel closes.
            drop(guard.take());
        }
    }
}

/// Deliver the current value at the entry's path if it changed. Returns false
/// once the subscriber has gone away.
fn deliver(source: &dyn SnapshotSource, entry: &mut SubscriptionEntry, dropped: &AtomicU64) -> bool {
    let (event, value) = match source.snapshot(&entry.path) {
        Ok((value, revision)) => {
            if entry.delivered.as_ref() == Some(&value) {
                entry.pending = false;
                entry.failing = false;
                return true;
            }
            let event = SubscriptionEvent::Changed(Snapshot {
                path: entry.path.clone(),
                value: value.clone(),
                revision,
            });
            (event, Some(value))
        }
        Err(err) => {
            if entry.failing {
                // Already reported; keep retrying quietly.
                entry.pending = true;
                return true;
            }
            let event = SubscriptionEvent::Failed {
                path: entry.path.clone(),
                reason: err.to_string(),
            };
            (event, None)
        }
    };

    match entry.tx.try_send(event) {
        Ok(()) => {
            match value {
                Some(v) => {
                    entry.delivered = Some(v);
                    entry.failing = false;
                    entry.pending = false;
                }
                None => {
                    entry.failing = true;
                    entry.pending = true;
                }
            }
            true
        }
        Err(TrySendError::Full(_)) => {
            // Never block the dispatcher: retry on the next tick.
            dropped.fetch_add(1, Ordering::Relaxed);
            entry.pending = true;
            true
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}

fn worker_loop(
    source: Arc<dyn SnapshotSource>,
    tick: Duration,
    dropped: Arc<AtomicU64>,
    control_rx: Receiver<ControlMsg>,
    wake_rx: Receiver<()>,
) {
    let mut subs: HashMap<SubscriptionId, SubscriptionEntry> = HashMap::new();

    loop {
        select! {
            recv(control_rx) -> msg => {
                match msg {
                    Ok(ControlMsg::Register { subscription_id, path, stream_tx, reply }) => {
                        let mut entry = SubscriptionEntry {
                            path,
                            tx: stream_tx,
                            delivered: None,
                            pending: false,
                            failing: false,
                        };
                        if deliver(source.as_ref(), &mut entry, &dropped) {
                            subs.insert(subscription_id, entry);
                        }
                        let _ = reply.send(());
                    }
                    Ok(ControlMsg::Unregister { subscription_id }) => {
                        if subs.remove(&subscription_id).is_some() {
                            debug!(?subscription_id, "Subscription removed");
                        }
                    }
                    Err(_) => break,
                }
            }
            recv(wake_rx) -> msg => {
                if msg.is_err() {
                    // The store is gone; dropping the senders disconnects every stream.
                    break;
                }
                subs.retain(|_, entry| deliver(source.as_ref(), entry, &dropped));
            }
            default(tick) => {
                subs.retain(|_, entry| !entry.pending || deliver(source.as_ref(), entry, &dropped));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::RwLock;

    use serde_json::json;

    #[derive(Default)]
    struct FakeSource {
        value: RwLock<(Option<Value>, u64)>,
        broken: RwLock<bool>,
    }

    impl FakeSource {
        fn set(&self, value: Option<Value>) {
            let mut guard = self.value.write().unwrap();
            guard.0 = value;
            guard.1 += 1;
        }
    }

    impl SnapshotSource for FakeSource {
        fn snapshot(&self, _path: &DataPath) -> Result<(Option<Value>, u64), StorageError> {
            if *self.broken.read().unwrap() {
                return Err(StorageError::BackendError("source offline".to_string()));
            }
            Ok(self.value.read().unwrap().clone())
        }
    }

    fn path() -> DataPath {
        DataPath::parse("posts/p1").unwrap()
    }

    #[test]
    fn test_initial_value_then_changes() {
        let source = Arc::new(FakeSource::default());
        source.set(Some(json!({"likes": 0})));
        let hub = SubscriptionHub::new(SubscriptionConfig::default(), source.clone());

        let sub = hub.register(&path()).unwrap();
        let first = sub.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.value, Some(json!({"likes": 0})));

        source.set(Some(json!({"likes": 1})));
        hub.notify();
        let second = sub.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(second.value, Some(json!({"likes": 1})));
        assert!(second.revision > first.revision);
    }

    #[test]
    fn test_unchanged_value_is_not_redelivered() {
        let source = Arc::new(FakeSource::default());
        source.set(Some(json!(1)));
        let hub = SubscriptionHub::new(SubscriptionConfig::default(), source.clone());
        let sub = hub.register(&path()).unwrap();
        sub.recv_timeout(Duration::from_secs(1)).unwrap();

        hub.notify();
        assert!(sub.recv_timeout(Duration::from_millis(150)).is_err());
    }

    #[test]
    fn test_read_failure_reported_once_then_recovers() {
        let source = Arc::new(FakeSource::default());
        source.set(Some(json!("a")));
        let hub = SubscriptionHub::new(SubscriptionConfig::default(), source.clone());
        let sub = hub.register(&path()).unwrap();
        sub.recv_timeout(Duration::from_secs(1)).unwrap();

        *source.broken.write().unwrap() = true;
        hub.notify();
        let err = sub.recv_timeout(Duration::from_secs(1)).unwrap_err();
        assert!(err.is_read_failed());

        // Failures are not repeated while the source stays broken.
        hub.notify();
        assert!(sub.recv_timeout(Duration::from_millis(150)).is_err());

        *source.broken.write().unwrap() = false;
        source.set(Some(json!("b")));
        hub.notify();
        let next = sub.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(next.value, Some(json!("b")));
    }

    #[test]
    fn test_full_stream_converges_to_latest() {
        let source = Arc::new(FakeSource::default());
        source.set(Some(json!(0)));
        let cfg = SubscriptionConfig {
            stream_capacity: 1,
            ..SubscriptionConfig::default()
        };
        let hub = SubscriptionHub::new(cfg, source.clone());
        let sub = hub.register(&path()).unwrap();

        // Buffer holds the initial value; later changes cannot be delivered yet.
        for i in 1..=5 {
            source.set(Some(json!(i)));
            hub.notify();
        }
        std::thread::sleep(Duration::from_millis(100));

        let mut last = None;
        while let Ok(snapshot) = sub.recv_timeout(Duration::from_millis(300)) {
            last = snapshot.value;
        }
        assert_eq!(last, Some(json!(5)));
    }

    #[test]
    fn test_dropping_hub_disconnects_streams() {
        let source = Arc::new(FakeSource::default());
        let hub = SubscriptionHub::new(SubscriptionConfig::default(), source);
        let sub = hub.register(&path()).unwrap();
        let initial = sub.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(!initial.exists());

        drop(hub);
        let err = sub.recv_timeout(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, crate::error::CraftError::Storage(StorageError::Disconnected(_))));
    }
}
