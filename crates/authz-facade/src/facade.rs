use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use authz_cache::{CacheConfig, CacheKey, CacheStats, Flight, LocalLru, PutOutcome, SimpleStats};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::canonical::derive_key;
use crate::engine::PolicyEvaluator;
use crate::errors::AuthzError;
use crate::model::{AuthorizationRequest, Decision};
use crate::policy::{PolicySetListener, PolicySetVersion};

// Keys of a policy-unaware cache are derived against a fixed version so
// entries outlive policy replacements.
const UNVERSIONED: PolicySetVersion = PolicySetVersion(0);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    pub warmed: usize,
    pub failed: usize,
}

/// Read-through decision cache in front of a [`PolicyEvaluator`].
///
/// One instance owns its store, counters and policy version. Concurrent
/// misses on the same request share a single engine call.
pub struct CachedEngine {
    engine: Arc<dyn PolicyEvaluator>,
    config: CacheConfig,
    store: LocalLru<Decision>,
    flight: Flight<Decision, AuthzError>,
    stats: SimpleStats,
    version: AtomicU64,
}

impl CachedEngine {
    pub fn new<E>(engine: E, config: CacheConfig) -> Result<Self, AuthzError>
    where
        E: PolicyEvaluator + 'static,
    {
        Self::with_shared_engine(Arc::new(engine), config)
    }

    pub fn with_shared_engine(
        engine: Arc<dyn PolicyEvaluator>,
        config: CacheConfig,
    ) -> Result<Self, AuthzError> {
        let store = LocalLru::from_config(&config)?;
        debug!(
            target: "authz::cache",
            enabled = config.enabled,
            max_size = config.max_size,
            ttl_secs = config.ttl.as_secs_f64(),
            policy_aware = config.policy_aware,
            "decision cache ready"
        );
        Ok(Self {
            engine,
            config,
            store,
            flight: Flight::new(),
            stats: SimpleStats::default(),
            version: AtomicU64::new(PolicySetVersion::INITIAL.0),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn policy_version(&self) -> PolicySetVersion {
        PolicySetVersion(self.version.load(Ordering::SeqCst))
    }

    pub fn is_authorized(&self, request: &AuthorizationRequest) -> Result<bool, AuthzError> {
        self.authorize(request).map(|decision| decision.allowed)
    }

    pub fn authorize(&self, request: &AuthorizationRequest) -> Result<Decision, AuthzError> {
        let version = self.key_version();
        let key = derive_key(request, version)?;

        if !self.config.enabled {
            self.stats.record_miss();
            return self.evaluate(request);
        }

        let started = Instant::now();
        let cached = self.store.get(&key, self.policy_version().0);
        self.stats.record_lookup(started.elapsed());
        if let Some(decision) = cached {
            self.stats.record_hit();
            debug!(target: "authz::cache", key = %key, "decision cache hit");
            return Ok(decision);
        }

        self.stats.record_miss();
        debug!(target: "authz::cache", key = %key, "decision cache miss");
        let outcome = self
            .flight
            .run(&key, || self.load(&key, request, version));
        if !outcome.led {
            self.stats.record_coalesced();
        }
        outcome.result
    }

    pub fn cache_stats(&self) -> CacheStats {
        let size = if self.config.enabled { self.store.len() } else { 0 };
        self.stats.snapshot(size)
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Drops every cached decision at once, whatever `policy_aware` says.
    pub fn invalidate_cache(&self) -> usize {
        let removed = self.store.invalidate_all();
        info!(target: "authz::cache", removed, "decision cache invalidated");
        removed
    }

    /// Sweeps expired entries and, when policy-aware, entries from older
    /// policy versions. Swept entries are not counted as evictions.
    pub fn purge_stale(&self) -> usize {
        let removed = self.store.purge_expired(self.policy_version().0);
        if removed > 0 {
            debug!(target: "authz::cache", removed, "purged stale decisions");
        }
        removed
    }

    pub fn warm<'a, I>(&self, requests: I) -> WarmReport
    where
        I: IntoIterator<Item = &'a AuthorizationRequest>,
    {
        let mut report = WarmReport::default();
        for request in requests {
            match self.authorize(request) {
                Ok(_) => report.warmed += 1,
                Err(err) => {
                    warn!(
                        target: "authz::cache",
                        principal = request.principal(),
                        action = request.action(),
                        resource = request.resource(),
                        error = %err,
                        "cache warm-up request failed"
                    );
                    report.failed += 1;
                }
            }
        }
        info!(target: "authz::cache", warmed = report.warmed, failed = report.failed, "cache warmed");
        report
    }

    fn key_version(&self) -> PolicySetVersion {
        if self.config.policy_aware {
            self.policy_version()
        } else {
            UNVERSIONED
        }
    }

    // Runs as the flight leader. The decision is stored before followers
    // are released so a caller arriving afterwards hits the store. A
    // decision computed across an `invalidate_cache` is returned but not
    // stored.
    fn load(
        &self,
        key: &CacheKey,
        request: &AuthorizationRequest,
        version: PolicySetVersion,
    ) -> Result<Decision, AuthzError> {
        let generation = self.store.generation();
        if let Some(decision) = self.store.get(key, version.0) {
            self.stats.record_coalesced();
            return Ok(decision);
        }
        let decision = self.evaluate(request)?;
        match self
            .store
            .put_if_generation(key.clone(), decision.clone(), version.0, generation)
        {
            PutOutcome::Stored {
                evicted: Some(evicted),
            } => {
                self.stats.record_eviction();
                debug!(target: "authz::cache", evicted = %evicted, "evicted least recently used decision");
            }
            PutOutcome::Stored { evicted: None } => {}
            PutOutcome::Invalidated => {
                debug!(target: "authz::cache", key = %key, "cache invalidated during evaluation; decision not stored");
            }
        }
        Ok(decision)
    }

    fn evaluate(&self, request: &AuthorizationRequest) -> Result<Decision, AuthzError> {
        self.stats.record_load();
        self.engine.evaluate(request).map_err(|failure| {
            self.stats.record_load_error();
            debug!(target: "authz::cache", error = %failure, "policy evaluation failed");
            AuthzError::Evaluation(failure)
        })
    }
}

impl PolicySetListener for CachedEngine {
    fn on_policy_set_changed(&self) {
        let previous = self.version.fetch_add(1, Ordering::SeqCst);
        info!(
            target: "authz::cache",
            from = previous,
            to = previous.saturating_add(1),
            "policy set changed"
        );
    }
}
