use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::debug;

use crate::errors::{AuthzError, EngineFailure};
use crate::facade::CachedEngine;
use crate::model::{AuthorizationRequest, Decision};

/// Async entry point over [`CachedEngine`]. Every call runs the synchronous
/// core on the blocking pool; there is no separate cache on this path.
///
/// With a timeout set, a caller stops waiting once it elapses. The blocking
/// evaluation keeps running and still populates the cache.
#[derive(Clone)]
pub struct AsyncCachedEngine {
    inner: Arc<CachedEngine>,
    timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    /// One entry per request, in input order.
    pub results: Vec<Result<Decision, AuthzError>>,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl AsyncCachedEngine {
    pub fn new(inner: Arc<CachedEngine>) -> Self {
        Self {
            inner,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn engine(&self) -> &Arc<CachedEngine> {
        &self.inner
    }

    pub async fn authorize(&self, request: AuthorizationRequest) -> Result<Decision, AuthzError> {
        let engine = Arc::clone(&self.inner);
        let task = tokio::task::spawn_blocking(move || engine.authorize(&request));
        let joined = match self.timeout {
            // dropping the handle detaches the blocking task without stopping it
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| timed_out(limit))?,
            None => task.await,
        };
        joined.map_err(aborted)?
    }

    pub async fn is_authorized(&self, request: AuthorizationRequest) -> Result<bool, AuthzError> {
        self.authorize(request).await.map(|decision| decision.allowed)
    }

    /// Evaluates `requests` with at most `max_concurrency` in flight.
    /// A limit of zero is treated as one. The per-request timeout applies to
    /// each entry, not to the batch.
    pub async fn authorize_batch(
        &self,
        requests: Vec<AuthorizationRequest>,
        max_concurrency: usize,
    ) -> BatchReport {
        let started = Instant::now();
        let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));

        let tasks = requests.into_iter().map(|request| {
            let permits = Arc::clone(&permits);
            let this = self.clone();
            async move {
                let _permit = permits.acquire_owned().await.map_err(|_| {
                    AuthzError::Evaluation(EngineFailure::new("batch limiter closed"))
                })?;
                this.authorize(request).await
            }
        });
        let results = join_all(tasks).await;

        let succeeded = results.iter().filter(|result| result.is_ok()).count();
        let failed = results.len() - succeeded;
        let elapsed = started.elapsed();
        debug!(
            target: "authz::cache",
            total = results.len(),
            succeeded,
            failed,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "batch authorization finished"
        );
        BatchReport {
            results,
            succeeded,
            failed,
            elapsed,
        }
    }
}

fn timed_out(limit: Duration) -> AuthzError {
    AuthzError::Evaluation(EngineFailure::new(format!(
        "evaluation timed out after {}ms",
        u64::try_from(limit.as_millis()).unwrap_or(u64::MAX)
    )))
}

fn aborted(err: JoinError) -> AuthzError {
    let reason = if err.is_panic() {
        "evaluation task panicked"
    } else {
        "evaluation task cancelled"
    };
    AuthzError::Evaluation(EngineFailure::new(reason))
}
