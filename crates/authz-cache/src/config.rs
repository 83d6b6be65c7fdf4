use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::CacheConfigError;

pub const DEFAULT_MAX_SIZE: usize = 1000;
pub const DEFAULT_TTL_SECONDS: f64 = 300.0;

/// Immutable once handed to a cache; reconfiguring means building a new one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CacheConfigFile", into = "CacheConfigFile")]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_size: usize,
    /// Zero disables time-based expiry; LRU bounds still apply.
    pub ttl: Duration,
    /// Treat entries stamped with an older policy-set version as absent.
    pub policy_aware: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_size: DEFAULT_MAX_SIZE,
            ttl: Duration::from_secs_f64(DEFAULT_TTL_SECONDS),
            policy_aware: true,
        }
    }
}

impl CacheConfig {
    /// Defaults with caching switched on.
    pub fn caching() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Builds a config from untyped numbers, as they arrive from files,
    /// env vars or foreign callers.
    pub fn from_parts(
        enabled: bool,
        max_size: i64,
        ttl_seconds: f64,
        policy_aware: bool,
    ) -> Result<Self, CacheConfigError> {
        if max_size <= 0 {
            return Err(CacheConfigError::InvalidCapacity(max_size));
        }
        let max_size =
            usize::try_from(max_size).map_err(|_| CacheConfigError::InvalidCapacity(max_size))?;
        if !ttl_seconds.is_finite() || ttl_seconds < 0.0 {
            return Err(CacheConfigError::InvalidTtl(ttl_seconds));
        }
        let mut ttl = Duration::try_from_secs_f64(ttl_seconds)
            .map_err(|_| CacheConfigError::InvalidTtl(ttl_seconds))?;
        // a positive TTL below 1ns still expires
        if ttl.is_zero() && ttl_seconds > 0.0 {
            ttl = Duration::from_nanos(1);
        }
        Ok(Self {
            enabled,
            max_size,
            ttl,
            policy_aware,
        })
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_policy_aware(mut self, policy_aware: bool) -> Self {
        self.policy_aware = policy_aware;
        self
    }

    pub fn capacity(&self) -> Result<NonZeroUsize, CacheConfigError> {
        NonZeroUsize::new(self.max_size).ok_or(CacheConfigError::InvalidCapacity(0))
    }

    pub fn validate(&self) -> Result<(), CacheConfigError> {
        self.capacity().map(|_| ())
    }

    pub fn expires(&self) -> bool {
        !self.ttl.is_zero()
    }
}

/// Wire shape of [`CacheConfig`]; TTL travels as float seconds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheConfigFile {
    pub enabled: bool,
    pub max_size: i64,
    pub ttl_seconds: f64,
    pub policy_aware: bool,
}

impl Default for CacheConfigFile {
    fn default() -> Self {
        CacheConfig::default().into()
    }
}

impl TryFrom<CacheConfigFile> for CacheConfig {
    type Error = CacheConfigError;

    fn try_from(file: CacheConfigFile) -> Result<Self, Self::Error> {
        CacheConfig::from_parts(
            file.enabled,
            file.max_size,
            file.ttl_seconds,
            file.policy_aware,
        )
    }
}

impl From<CacheConfig> for CacheConfigFile {
    fn from(config: CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_size: i64::try_from(config.max_size).unwrap_or(i64::MAX),
            ttl_seconds: config.ttl.as_secs_f64(),
            policy_aware: config.policy_aware,
        }
    }
}
