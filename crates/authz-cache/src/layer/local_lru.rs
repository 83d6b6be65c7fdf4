use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::config::CacheConfig;
use crate::errors::CacheConfigError;
use crate::key::CacheKey;

/// Bounded key -> value store with LRU eviction, lazy TTL expiry and
/// policy-version stamping.
///
/// Every operation takes one short lock; callers must never hold it across
/// a slow computation, which the API makes impossible by only handing out
/// cloned values.
pub struct LocalLru<V> {
    inner: Arc<Mutex<LruCache<CacheKey, CacheEntry<V>>>>,
    // bumped by `invalidate_all`, only while `inner` is locked
    generation: Arc<AtomicU64>,
    capacity: NonZeroUsize,
    ttl: Duration,
    policy_aware: bool,
}

impl<V> Clone for LocalLru<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            generation: Arc::clone(&self.generation),
            capacity: self.capacity,
            ttl: self.ttl,
            policy_aware: self.policy_aware,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    Stored { evicted: Option<CacheKey> },
    /// The store was invalidated after the caller captured its generation.
    Invalidated,
}

struct CacheEntry<V> {
    value: V,
    expires_at: Option<Instant>,
    version: u64,
}

impl<V> CacheEntry<V> {
    fn is_visible(&self, now: Instant, current_version: u64, policy_aware: bool) -> bool {
        if policy_aware && self.version != current_version {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }
}

impl<V: Clone> LocalLru<V> {
    pub fn new(capacity: NonZeroUsize, ttl: Duration, policy_aware: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
            generation: Arc::new(AtomicU64::new(0)),
            capacity,
            ttl,
            policy_aware,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheConfigError> {
        Ok(Self::new(config.capacity()?, config.ttl, config.policy_aware))
    }

    /// Returns the stored value if it is still visible under
    /// `current_version`. An expired or stale entry is dropped on the spot.
    pub fn get(&self, key: &CacheKey, current_version: u64) -> Option<V> {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let visible = guard
            .peek(key)
            .map(|entry| entry.is_visible(now, current_version, self.policy_aware))?;
        if !visible {
            guard.pop(key);
            return None;
        }
        guard.get(key).map(|entry| entry.value.clone())
    }

    /// Inserts or replaces `key`. When a new key arrives at capacity the
    /// least recently used entry is evicted first and its key returned.
    pub fn put(&self, key: CacheKey, value: V, version: u64) -> Option<CacheKey> {
        let entry = self.entry(value, version);
        let mut guard = self.inner.lock();
        Self::insert(&mut guard, self.capacity, key, entry)
    }

    /// Current invalidation generation. Capture it before computing a value
    /// and hand it to [`LocalLru::put_if_generation`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Like [`LocalLru::put`], but refuses the insert when `invalidate_all`
    /// ran after `generation` was captured.
    pub fn put_if_generation(
        &self,
        key: CacheKey,
        value: V,
        version: u64,
        generation: u64,
    ) -> PutOutcome {
        let entry = self.entry(value, version);
        let mut guard = self.inner.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            return PutOutcome::Invalidated;
        }
        PutOutcome::Stored {
            evicted: Self::insert(&mut guard, self.capacity, key, entry),
        }
    }

    fn entry(&self, value: V, version: u64) -> CacheEntry<V> {
        let expires_at = if self.ttl.is_zero() {
            None
        } else {
            Instant::now().checked_add(self.ttl)
        };
        CacheEntry {
            value,
            expires_at,
            version,
        }
    }

    fn insert(
        guard: &mut LruCache<CacheKey, CacheEntry<V>>,
        capacity: NonZeroUsize,
        key: CacheKey,
        entry: CacheEntry<V>,
    ) -> Option<CacheKey> {
        let evicted = if !guard.contains(&key) && guard.len() >= capacity.get() {
            guard.pop_lru().map(|(evicted, _)| evicted)
        } else {
            None
        };
        guard.put(key, entry);
        debug_assert!(guard.len() <= capacity.get());
        evicted
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        self.inner.lock().pop(key).is_some()
    }

    /// Drops every entry and starts a new generation, so values computed
    /// before the call cannot be stored afterwards. Returns how many were held.
    pub fn invalidate_all(&self) -> usize {
        let mut guard = self.inner.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        let dropped = guard.len();
        guard.clear();
        dropped
    }

    /// Sweeps entries that a `get` would treat as absent.
    pub fn purge_expired(&self, current_version: u64) -> usize {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let stale: Vec<CacheKey> = guard
            .iter()
            .filter(|(_, entry)| !entry.is_visible(now, current_version, self.policy_aware))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            guard.pop(key);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}
