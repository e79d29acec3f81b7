//! Work-queue contract between change notifications and the reconciler.
//!
//! In production the kube-runtime `Controller` plays this role. The
//! [`LocalDispatcher`] here is a small in-process implementation with the
//! same guarantees, used to drive the reconciler deterministically.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use adaptive_backoff::prelude::{
    Backoff as _, BackoffBuilder, ExponentialBackoff, ExponentialBackoffBuilder,
};
use async_trait::async_trait;
use tracing::debug;

use crate::constants::defaults;
use crate::error::{OperatorError, Result};
use crate::reconcile::{Reconciler, Verdict};

/// Identity of a datacenter in the queue.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Schedule `key` to be reconciled after `delay`.
    fn enqueue(&self, key: ObjectKey, delay: Duration);

    /// Reconcile `key` now. Calls for the same key never overlap.
    async fn invoke(&self, key: &ObjectKey) -> Verdict;
}

/// Exponential backoff with a ceiling, doubling per consecutive failure.
pub struct Backoff {
    inner: ExponentialBackoff,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(defaults::REQUEUE_BACKOFF_BASE_MS),
            Duration::from_secs(defaults::REQUEUE_BACKOFF_MAX_SECS),
        )
        .expect("default backoff bounds are valid")
    }
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Result<Self> {
        let inner = ExponentialBackoffBuilder::default()
            .factor(2.0)
            .min(base)
            .max(max)
            .build()
            .map_err(|_| {
                OperatorError::Config(format!("invalid backoff bounds {base:?}..{max:?}"))
            })?;
        Ok(Self { inner })
    }

    /// Delay before the next retry.
    pub fn next_delay(&mut self) -> Duration {
        self.inner.wait()
    }

    pub fn reset(&mut self) {
        self.inner.reset();
    }
}

/// Per-object backoff state.
///
/// Entries are removed on success. Objects that disappear while failing never
/// succeed again, so entries idle for longer than `idle_after` are evicted
/// whenever a new delay is handed out.
pub struct BackoffMap {
    entries: Mutex<HashMap<ObjectKey, (Backoff, Instant)>>,
    idle_after: Duration,
}

impl Default for BackoffMap {
    fn default() -> Self {
        Self::new(Duration::from_secs(2 * defaults::REQUEUE_BACKOFF_MAX_SECS))
    }
}

impl BackoffMap {
    pub fn new(idle_after: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            idle_after,
        }
    }

    /// Record a failure of `key` and return how long to wait before retrying.
    pub fn next_delay(&self, key: &ObjectKey) -> Duration {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        Self::evict_idle(&mut entries, now, self.idle_after);
        let (backoff, last_failure) = entries
            .entry(key.clone())
            .or_insert_with(|| (Backoff::default(), now));
        *last_failure = now;
        backoff.next_delay()
    }

    /// Forget `key` after a successful pass.
    pub fn reset(&self, key: &ObjectKey) {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(key);
    }

    /// Drop entries whose last failure is older than the idle limit at `now`.
    pub fn prune(&self, now: Instant) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        Self::evict_idle(&mut entries, now, self.idle_after);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_idle(
        entries: &mut HashMap<ObjectKey, (Backoff, Instant)>,
        now: Instant,
        idle_after: Duration,
    ) {
        entries.retain(|key, (_, last_failure)| {
            let keep = now.saturating_duration_since(*last_failure) <= idle_after;
            if !keep {
                debug!(key = %key, "Evicting idle backoff entry");
            }
            keep
        });
    }
}

/// In-memory dispatcher: per-key serialisation plus a delay queue.
pub struct LocalDispatcher {
    reconciler: Reconciler,
    locks: Mutex<HashMap<ObjectKey, Arc<tokio::sync::Mutex<()>>>>,
    backoff: BackoffMap,
    queue: Mutex<Vec<(ObjectKey, Duration)>>,
    requeue_after: Duration,
}

impl LocalDispatcher {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler,
            locks: Mutex::new(HashMap::new()),
            backoff: BackoffMap::default(),
            queue: Mutex::new(Vec::new()),
            requeue_after: Duration::from_secs(defaults::REQUEUE_CONVERGING_SECS),
        }
    }

    /// Take every queued entry, in the order it was queued.
    pub fn drain(&self) -> Vec<(ObjectKey, Duration)> {
        let mut queue = self.queue.lock().unwrap_or_else(|p| p.into_inner());
        std::mem::take(&mut *queue)
    }

    /// Number of keys currently holding a lock or backoff entry.
    pub fn tracked_keys(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(|p| p.into_inner()).len();
        locks.max(self.backoff.len())
    }

    fn key_lock(&self, key: &ObjectKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.entry(key.clone()).or_default().clone()
    }

    /// Drop the lock for `key` unless another invocation is waiting on it.
    fn release_lock(&self, key: &ObjectKey, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        // One reference in the map, one held by the caller.
        let ours = locks.get(key).is_some_and(|held| Arc::ptr_eq(held, lock));
        if ours && Arc::strong_count(lock) <= 2 {
            locks.remove(key);
        }
    }
}

#[async_trait]
impl Dispatcher for LocalDispatcher {
    fn enqueue(&self, key: ObjectKey, delay: Duration) {
        debug!(key = %key, ?delay, "Queued");
        self.queue
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((key, delay));
    }

    async fn invoke(&self, key: &ObjectKey) -> Verdict {
        let lock = self.key_lock(key);
        let guard = lock.lock().await;

        let result = self.reconciler.reconcile(&key.namespace, &key.name).await;
        let verdict = Verdict::from(&result);
        match verdict {
            Verdict::Done => self.backoff.reset(key),
            Verdict::RequeueNow => {
                self.backoff.reset(key);
                self.enqueue(key.clone(), self.requeue_after);
            }
            Verdict::RequeueAfterError => {
                let delay = self.backoff.next_delay(key);
                self.enqueue(key.clone(), delay);
            }
        }

        drop(guard);
        self.release_lock(key, &lock);
        verdict
    }
}
