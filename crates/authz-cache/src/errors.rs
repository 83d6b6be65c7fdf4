use thiserror::Error;

/// Rejected cache configuration. Only ever raised while building a cache,
/// never from a lookup or store operation.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CacheConfigError {
    #[error("max_size must be positive, got {0}")]
    InvalidCapacity(i64),
    #[error("ttl must be a finite, non-negative number of seconds, got {0}")]
    InvalidTtl(f64),
    #[error("io error: {0}")]
    Io(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}
