use crate::errors::EngineFailure;
use crate::model::{AuthorizationRequest, Decision};

/// The external policy engine behind the cache.
///
/// Implementations may be slow and are the only source of authorization
/// outcomes. The facade never calls `evaluate` while holding a store lock.
pub trait PolicyEvaluator: Send + Sync {
    fn evaluate(&self, request: &AuthorizationRequest) -> Result<Decision, EngineFailure>;
}

impl<F> PolicyEvaluator for F
where
    F: Fn(&AuthorizationRequest) -> Result<Decision, EngineFailure> + Send + Sync,
{
    fn evaluate(&self, request: &AuthorizationRequest) -> Result<Decision, EngineFailure> {
        self(request)
    }
}
