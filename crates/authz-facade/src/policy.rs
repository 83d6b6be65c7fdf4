use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Monotonic marker of the active policy set, bumped on every replacement.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PolicySetVersion(pub u64);

impl PolicySetVersion {
    pub const INITIAL: PolicySetVersion = PolicySetVersion(1);

    pub fn next(self) -> Self {
        PolicySetVersion(self.0.saturating_add(1))
    }
}

impl fmt::Display for PolicySetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub trait PolicySetListener: Send + Sync {
    fn on_policy_set_changed(&self);
}

/// Notification point for policy-set replacements.
///
/// Listeners are held weakly so a dropped facade unsubscribes itself.
/// Async consumers can follow the revision channel instead.
pub struct PolicyNotifier {
    listeners: Mutex<Vec<Weak<dyn PolicySetListener>>>,
    revision: AtomicU64,
    revisions: watch::Sender<u64>,
}

impl Default for PolicyNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyNotifier {
    pub fn new() -> Self {
        let (revisions, _rx) = watch::channel(0);
        Self {
            listeners: Mutex::new(Vec::new()),
            revision: AtomicU64::new(0),
            revisions,
        }
    }

    pub fn subscribe<L>(&self, listener: &Arc<L>)
    where
        L: PolicySetListener + 'static,
    {
        let weak: Weak<L> = Arc::downgrade(listener);
        let weak: Weak<dyn PolicySetListener> = weak;
        self.listeners.lock().push(weak);
    }

    pub fn subscribe_revisions(&self) -> watch::Receiver<u64> {
        self.revisions.subscribe()
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Number of listeners still alive.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|listener| listener.strong_count() > 0)
            .count()
    }

    /// Announces a replaced policy set and returns the new revision.
    pub fn notify_replaced(&self) -> u64 {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;

        let live: Vec<Arc<dyn PolicySetListener>> = {
            let mut listeners = self.listeners.lock();
            let before = listeners.len();
            listeners.retain(|listener| listener.strong_count() > 0);
            let dropped = before - listeners.len();
            if dropped > 0 {
                warn!(target: "authz::cache", dropped, "pruned policy listeners that went away");
            }
            listeners.iter().filter_map(Weak::upgrade).collect()
        };

        for listener in &live {
            listener.on_policy_set_changed();
        }
        self.revisions.send_replace(revision);
        debug!(target: "authz::cache", revision, listeners = live.len(), "policy set replaced");
        revision
    }
}

/// Calls `listener` once per observed revision change until the sender
/// goes away. Revisions published faster than the task runs collapse into
/// a single call.
pub async fn follow_revisions(
    listener: Arc<dyn PolicySetListener>,
    mut revisions: watch::Receiver<u64>,
) {
    while revisions.changed().await.is_ok() {
        let revision = *revisions.borrow_and_update();
        debug!(target: "authz::cache", revision, "observed policy revision");
        listener.on_policy_set_changed();
    }
}
