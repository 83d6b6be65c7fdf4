use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lock-free counters shared by every clone.
#[derive(Clone, Default)]
pub struct SimpleStats {
    inner: Arc<Inner>,
}

// Smoothing factor of the lookup-time moving average.
const LOOKUP_ALPHA: f64 = 0.1;
// Sentinel NaN pattern: no lookup recorded yet.
const LOOKUP_UNSET: u64 = u64::MAX;

struct Inner {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    loads: AtomicU64,
    load_errors: AtomicU64,
    coalesced: AtomicU64,
    // f64 bits of the average lookup time in milliseconds
    avg_lookup_ms: AtomicU64,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            load_errors: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            avg_lookup_ms: AtomicU64::new(LOOKUP_UNSET),
        }
    }
}

impl SimpleStats {
    pub fn record_hit(&self) {
        self.inner.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.inner.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.inner.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load(&self) {
        self.inner.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_error(&self) {
        self.inner.load_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.inner.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    /// Folds one store lookup into an exponential moving average. The first
    /// sample seeds the average.
    pub fn record_lookup(&self, elapsed: Duration) {
        let sample = elapsed.as_secs_f64() * 1000.0;
        let _ = self
            .inner
            .avg_lookup_ms
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                let next = if bits == LOOKUP_UNSET {
                    sample
                } else {
                    LOOKUP_ALPHA * sample + (1.0 - LOOKUP_ALPHA) * f64::from_bits(bits)
                };
                Some(next.to_bits())
            });
    }

    /// Point-in-time view. Counters are loaded one by one, so a snapshot
    /// taken under traffic may straddle an increment.
    pub fn snapshot(&self, cache_size: usize) -> CacheStats {
        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);
        let total_requests = hits + misses;
        CacheStats {
            total_requests,
            hits,
            misses,
            evictions: self.inner.evictions.load(Ordering::Relaxed),
            loads: self.inner.loads.load(Ordering::Relaxed),
            load_errors: self.inner.load_errors.load(Ordering::Relaxed),
            coalesced: self.inner.coalesced.load(Ordering::Relaxed),
            cache_size,
            hit_rate: ratio(hits, total_requests),
            miss_rate: ratio(misses, total_requests),
            avg_lookup_time_ms: self.avg_lookup_ms(),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.inner.hits,
            &self.inner.misses,
            &self.inner.evictions,
            &self.inner.loads,
            &self.inner.load_errors,
            &self.inner.coalesced,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.inner
            .avg_lookup_ms
            .store(LOOKUP_UNSET, Ordering::Relaxed);
    }

    fn avg_lookup_ms(&self) -> f64 {
        match self.inner.avg_lookup_ms.load(Ordering::Relaxed) {
            LOOKUP_UNSET => 0.0,
            bits => f64::from_bits(bits),
        }
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Evaluations actually run on behalf of the cache.
    pub loads: u64,
    pub load_errors: u64,
    /// Callers served by someone else's in-flight evaluation.
    pub coalesced: u64,
    pub cache_size: usize,
    pub hit_rate: f64,
    pub miss_rate: f64,
    /// Moving average of store lookup latency; 0 before the first lookup.
    #[serde(default)]
    pub avg_lookup_time_ms: f64,
}

impl CacheStats {
    pub fn tuning_hints(&self) -> Vec<String> {
        let mut hints = Vec::new();
        if self.total_requests > 0 && self.hit_rate < 0.7 {
            hints.push(format!(
                "hit rate is {:.0}%, below 70%; consider a larger max_size",
                self.hit_rate * 100.0
            ));
        }
        if self.evictions as f64 > self.hits as f64 * 0.1 {
            hints.push(format!(
                "{} evictions against {} hits; consider a larger max_size or a shorter ttl",
                self.evictions, self.hits
            ));
        }
        hints
    }
}
