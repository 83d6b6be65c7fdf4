#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use authz_facade::prelude::*;

/// Allows `User::"alice"`, denies everyone else and fails on resources
/// whose id starts with `broken`.
#[derive(Default)]
pub struct ScriptedEngine {
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedEngine {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PolicyEvaluator for ScriptedEngine {
    fn evaluate(&self, request: &AuthorizationRequest) -> Result<Decision, EngineFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if request.resource().starts_with(r#"Doc::"broken"#) {
            return Err(EngineFailure::with_diagnostics(vec![
                "unsupported construct".to_string(),
                "policy0 failed to evaluate".to_string(),
            ]));
        }
        if request.principal() == r#"User::"alice""# {
            Ok(Decision::allow(["policy0"]))
        } else {
            Ok(Decision::deny())
        }
    }
}

pub fn request(principal: &str, resource: &str) -> AuthorizationRequest {
    AuthorizationRequest::new(
        format!(r#"User::"{principal}""#),
        r#"Action::"read""#,
        format!(r#"Doc::"{resource}""#),
    )
}
