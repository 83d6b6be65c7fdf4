//! Authorization decisions cached in front of an external policy engine.
//!
//! [`CachedEngine`] derives a fingerprint for each request, serves repeats
//! from a bounded LRU store and lets only one caller per fingerprint reach
//! the engine at a time. In policy-aware mode every policy-set replacement
//! bumps a version baked into the fingerprint, so older decisions are never
//! served again.

pub mod async_api;
pub mod canonical;
#[cfg(feature = "cedar")]
pub mod cedar;
pub mod engine;
pub mod errors;
pub mod facade;
pub mod model;
pub mod policy;
pub mod prelude;

pub use async_api::{AsyncCachedEngine, BatchReport};
pub use authz_cache::{load_config, CacheConfig, CacheConfigError, CacheStats};
pub use canonical::derive_key;
#[cfg(feature = "cedar")]
pub use cedar::CedarEvaluator;
pub use engine::PolicyEvaluator;
pub use errors::{AuthzError, EngineFailure};
pub use facade::{CachedEngine, WarmReport};
pub use model::{AttrValue, AuthorizationRequest, Context, Decision, EntityStoreRef, EntityUid};
pub use policy::{follow_revisions, PolicyNotifier, PolicySetListener, PolicySetVersion};
