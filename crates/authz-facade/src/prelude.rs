pub use crate::async_api::{AsyncCachedEngine, BatchReport};
pub use crate::engine::PolicyEvaluator;
pub use crate::errors::{AuthzError, EngineFailure};
pub use crate::facade::{CachedEngine, WarmReport};
pub use crate::model::{AttrValue, AuthorizationRequest, Context, Decision, EntityStoreRef};
pub use crate::policy::{PolicyNotifier, PolicySetListener, PolicySetVersion};
pub use authz_cache::{CacheConfig, CacheStats};
