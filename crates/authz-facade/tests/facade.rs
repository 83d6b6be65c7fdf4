mod support;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use authz_facade::prelude::*;
use authz_facade::CacheConfigError;
use support::{request, ScriptedEngine};

fn cached(config: CacheConfig) -> (Arc<ScriptedEngine>, CachedEngine) {
    let engine = Arc::new(ScriptedEngine::default());
    let facade = CachedEngine::with_shared_engine(engine.clone(), config).unwrap();
    (engine, facade)
}

#[test]
fn hit_returns_the_evaluated_decision() {
    let (engine, facade) = cached(CacheConfig::caching());
    let req = request("alice", "d1");

    let first = facade.authorize(&req).unwrap();
    let second = facade.authorize(&req).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, Decision::allow(["policy0"]));
    assert!(facade.is_authorized(&req).unwrap());
    assert_eq!(engine.calls(), 1);

    let stats = facade.cache_stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.cache_size, 1);
}

#[test]
fn deny_is_a_cacheable_outcome() {
    let (engine, facade) = cached(CacheConfig::caching());
    let req = request("bob", "d1");
    assert!(!facade.is_authorized(&req).unwrap());
    assert!(!facade.is_authorized(&req).unwrap());
    assert_eq!(engine.calls(), 1);
}

#[test]
fn least_recently_used_decision_is_evicted() {
    let (engine, facade) = cached(CacheConfig::caching().with_max_size(2));
    let (a, b, c) = (request("alice", "a"), request("alice", "b"), request("alice", "c"));

    for req in [&a, &b, &c] {
        facade.authorize(req).unwrap();
    }
    let stats = facade.cache_stats();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.cache_size, 2);

    // a was evicted; reloading it pushes out b, the oldest of {b, c}
    facade.authorize(&a).unwrap();
    assert_eq!(engine.calls(), 4);
    facade.authorize(&c).unwrap();
    assert_eq!(engine.calls(), 4);
    assert_eq!(facade.cache_stats().evictions, 2);
}

#[test]
fn expired_decision_is_reevaluated_and_repopulated() {
    let (engine, facade) =
        cached(CacheConfig::caching().with_ttl(Duration::from_millis(10)));
    let req = request("alice", "d1");

    facade.authorize(&req).unwrap();
    thread::sleep(Duration::from_millis(20));
    facade.authorize(&req).unwrap();

    assert_eq!(engine.calls(), 2);
    let stats = facade.cache_stats();
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.cache_size, 1);
}

#[test]
fn policy_change_makes_cached_decisions_stale() {
    let (engine, facade) = cached(CacheConfig::caching());
    let req = request("alice", "d1");
    assert_eq!(facade.policy_version(), PolicySetVersion(1));

    facade.authorize(&req).unwrap();
    facade.on_policy_set_changed();
    assert_eq!(facade.policy_version(), PolicySetVersion(2));
    facade.authorize(&req).unwrap();

    assert_eq!(engine.calls(), 2);
    assert_eq!(facade.cache_stats().hits, 0);
}

#[test]
fn policy_unaware_cache_survives_policy_changes() {
    let (engine, facade) = cached(CacheConfig::caching().with_policy_aware(false));
    let req = request("alice", "d1");

    facade.authorize(&req).unwrap();
    facade.on_policy_set_changed();
    facade.authorize(&req).unwrap();

    assert_eq!(engine.calls(), 1);
    assert_eq!(facade.cache_stats().hits, 1);
}

#[test]
fn notifier_reaches_a_subscribed_facade() {
    let engine = Arc::new(ScriptedEngine::default());
    let facade =
        Arc::new(CachedEngine::with_shared_engine(engine.clone(), CacheConfig::caching()).unwrap());
    let notifier = PolicyNotifier::new();
    notifier.subscribe(&facade);

    let req = request("alice", "d1");
    facade.authorize(&req).unwrap();
    notifier.notify_replaced();
    facade.authorize(&req).unwrap();

    assert_eq!(engine.calls(), 2);
    assert_eq!(facade.policy_version(), PolicySetVersion(2));
}

#[test]
fn hit_rate_is_hits_over_requests() {
    let (_engine, facade) = cached(CacheConfig::caching());
    for resource in ["a", "b", "c"] {
        facade.authorize(&request("alice", resource)).unwrap();
    }
    for _ in 0..5 {
        facade.authorize(&request("alice", "a")).unwrap();
    }

    let stats = facade.cache_stats();
    assert_eq!(stats.total_requests, 8);
    assert_eq!(stats.hits, 5);
    assert_eq!(stats.misses, 3);
    assert!((stats.hit_rate - 5.0 / 8.0).abs() < f64::EPSILON);
    assert!((stats.miss_rate - 3.0 / 8.0).abs() < f64::EPSILON);
}

#[test]
fn fresh_facade_reports_zero_rates() {
    let (_engine, facade) = cached(CacheConfig::caching());
    let stats = facade.cache_stats();
    assert_eq!(stats.total_requests, 0);
    assert_eq!(stats.hit_rate, 0.0);
}

#[test]
fn disabled_cache_passes_every_call_through() {
    let (engine, facade) = cached(CacheConfig::default());
    let req = request("alice", "d1");
    for _ in 0..5 {
        assert!(facade.is_authorized(&req).unwrap());
    }

    assert_eq!(engine.calls(), 5);
    let stats = facade.cache_stats();
    assert_eq!(stats.total_requests, 5);
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.cache_size, 0);
}

#[test]
fn malformed_identifiers_never_reach_the_engine() {
    let (engine, facade) = cached(CacheConfig::caching());
    let bad = AuthorizationRequest::new("alice", r#"Action::"read""#, r#"Doc::"d1""#);

    match facade.authorize(&bad) {
        Err(AuthzError::InvalidRequest { field, .. }) => assert_eq!(field, "principal"),
        other => panic!("expected invalid request, got {other:?}"),
    }
    assert_eq!(engine.calls(), 0);
    assert_eq!(facade.cache_stats().total_requests, 0);
}

#[test]
fn engine_failures_are_surfaced_and_not_cached() {
    let (engine, facade) = cached(CacheConfig::caching());
    let req = request("alice", "broken-1");

    for _ in 0..2 {
        let err = facade.authorize(&req).unwrap_err();
        assert!(matches!(err, AuthzError::Evaluation(_)));
        assert_eq!(err.diagnostics().len(), 2);
    }

    assert_eq!(engine.calls(), 2);
    let stats = facade.cache_stats();
    assert_eq!(stats.load_errors, 2);
    assert_eq!(stats.cache_size, 0);
}

#[test]
fn explicit_invalidation_empties_the_store() {
    let (engine, facade) = cached(CacheConfig::caching().with_policy_aware(false));
    for resource in ["a", "b", "c"] {
        facade.authorize(&request("alice", resource)).unwrap();
    }

    assert_eq!(facade.invalidate_cache(), 3);
    assert_eq!(facade.cache_stats().cache_size, 0);
    facade.authorize(&request("alice", "a")).unwrap();
    assert_eq!(engine.calls(), 4);
}

#[test]
fn purge_drops_decisions_from_older_policy_versions() {
    let (_engine, facade) = cached(CacheConfig::caching());
    facade.authorize(&request("alice", "a")).unwrap();
    facade.authorize(&request("alice", "b")).unwrap();
    facade.on_policy_set_changed();
    facade.authorize(&request("alice", "c")).unwrap();

    assert_eq!(facade.purge_stale(), 2);
    let stats = facade.cache_stats();
    assert_eq!(stats.cache_size, 1);
    assert_eq!(stats.evictions, 0);
}

#[test]
fn warm_up_counts_failures_without_propagating() {
    let (engine, facade) = cached(CacheConfig::caching());
    let requests = vec![
        request("alice", "a"),
        request("bob", "a"),
        request("alice", "broken"),
        AuthorizationRequest::new("", r#"Action::"read""#, r#"Doc::"a""#),
    ];

    let report = facade.warm(&requests);
    assert_eq!(report, WarmReport { warmed: 2, failed: 2 });

    facade.authorize(&requests[0]).unwrap();
    assert_eq!(engine.calls(), 3);
    assert_eq!(facade.cache_stats().hits, 1);
}

#[test]
fn reset_zeroes_counters_but_keeps_entries() {
    let (_engine, facade) = cached(CacheConfig::caching());
    let req = request("alice", "a");
    facade.authorize(&req).unwrap();
    facade.authorize(&req).unwrap();

    facade.reset_stats();
    let stats = facade.cache_stats();
    assert_eq!(stats.total_requests, 0);
    assert_eq!(stats.cache_size, 1);
}

#[test]
fn zero_capacity_is_rejected_at_construction() {
    let engine = ScriptedEngine::default();
    let result = CachedEngine::new(engine, CacheConfig::caching().with_max_size(0));
    assert!(matches!(
        result,
        Err(AuthzError::Config(CacheConfigError::InvalidCapacity(0)))
    ));
}

#[test]
fn closures_act_as_engines() {
    let facade = CachedEngine::new(
        |req: &AuthorizationRequest| -> Result<Decision, EngineFailure> {
            Ok(Decision {
                allowed: req.context().get("admin").is_some(),
                ..Decision::default()
            })
        },
        CacheConfig::caching(),
    )
    .unwrap();

    let plain = request("carol", "d1");
    let admin = request("carol", "d1").with_context(Context::new().with("admin", true));
    assert!(!facade.is_authorized(&plain).unwrap());
    assert!(facade.is_authorized(&admin).unwrap());
}
