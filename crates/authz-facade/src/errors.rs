use std::fmt;

use authz_cache::CacheConfigError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Diagnostics reported by the external engine when it could not produce a
/// decision at all. A deny is a decision, not a failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineFailure {
    pub diagnostics: Vec<String>,
}

impl EngineFailure {
    pub fn new(diagnostic: impl Into<String>) -> Self {
        Self {
            diagnostics: vec![diagnostic.into()],
        }
    }

    pub fn with_diagnostics(diagnostics: Vec<String>) -> Self {
        Self { diagnostics }
    }
}

impl fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.diagnostics.is_empty() {
            f.write_str("engine failed without diagnostics")
        } else {
            f.write_str(&self.diagnostics.join("; "))
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum AuthzError {
    #[error("invalid request: {field} `{value}`: {reason}")]
    InvalidRequest {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("evaluation failed: {0}")]
    Evaluation(EngineFailure),
    #[error("cache config error: {0}")]
    Config(#[from] CacheConfigError),
}

impl AuthzError {
    pub(crate) fn invalid(field: &'static str, value: &str, reason: impl Into<String>) -> Self {
        AuthzError::InvalidRequest {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn diagnostics(&self) -> &[String] {
        match self {
            AuthzError::Evaluation(failure) => &failure.diagnostics,
            _ => &[],
        }
    }
}

impl From<EngineFailure> for AuthzError {
    fn from(value: EngineFailure) -> Self {
        AuthzError::Evaluation(value)
    }
}
