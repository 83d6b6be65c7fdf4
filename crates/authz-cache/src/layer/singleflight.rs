use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::key::CacheKey;

/// Per-key duplicate suppression for blocking computations.
///
/// The first caller for a key runs the computation; callers arriving while
/// it runs wait and receive a clone of the same result, success or failure.
/// Nothing is remembered once the leader finishes.
pub struct Flight<T, E> {
    calls: Arc<Mutex<HashMap<CacheKey, Arc<Call<T, E>>>>>,
}

impl<T, E> Default for Flight<T, E> {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T, E> Clone for Flight<T, E> {
    fn clone(&self) -> Self {
        Self {
            calls: Arc::clone(&self.calls),
        }
    }
}

#[derive(Debug)]
pub struct FlightOutcome<T, E> {
    pub result: Result<T, E>,
    /// True for the caller that actually ran the computation.
    pub led: bool,
}

struct Call<T, E> {
    state: Mutex<CallState<T, E>>,
    done: Condvar,
}

enum CallState<T, E> {
    Pending,
    Done(Result<T, E>),
    // leader unwound without publishing
    Abandoned,
}

enum Role<T, E> {
    Leader(Arc<Call<T, E>>),
    Follower(Arc<Call<T, E>>),
}

impl<T: Clone, E: Clone> Call<T, E> {
    fn new() -> Self {
        Self {
            state: Mutex::new(CallState::Pending),
            done: Condvar::new(),
        }
    }

    fn wait(&self) -> Option<Result<T, E>> {
        let mut state = self.state.lock();
        while matches!(*state, CallState::Pending) {
            self.done.wait(&mut state);
        }
        match &*state {
            CallState::Done(result) => Some(result.clone()),
            _ => None,
        }
    }

    fn finish(&self, next: CallState<T, E>) {
        *self.state.lock() = next;
        self.done.notify_all();
    }
}

impl<T: Clone, E: Clone> Flight<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_exclusive<F>(&self, key: &CacheKey, compute: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.run(key, compute).result
    }

    pub fn run<F>(&self, key: &CacheKey, compute: F) -> FlightOutcome<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let call = loop {
            match self.join(key) {
                Role::Leader(call) => break call,
                Role::Follower(call) => {
                    if let Some(result) = call.wait() {
                        tracing::debug!(target: "authz::cache", key = %key, "joined in-flight evaluation");
                        return FlightOutcome { result, led: false };
                    }
                    // previous leader panicked; contend for leadership again
                }
            }
        };

        let mut guard = LeaderGuard {
            flight: self,
            key,
            call: &call,
            published: false,
        };
        let result = compute();
        guard.publish(result.clone());
        FlightOutcome { result, led: true }
    }

    /// Number of keys with a computation currently running.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    fn join(&self, key: &CacheKey) -> Role<T, E> {
        let mut calls = self.calls.lock();
        if let Some(call) = calls.get(key) {
            return Role::Follower(Arc::clone(call));
        }
        let call = Arc::new(Call::new());
        calls.insert(key.clone(), Arc::clone(&call));
        Role::Leader(call)
    }

    fn release(&self, key: &CacheKey, call: &Arc<Call<T, E>>) {
        let mut calls = self.calls.lock();
        if calls
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, call))
        {
            calls.remove(key);
        }
    }
}

struct LeaderGuard<'a, T: Clone, E: Clone> {
    flight: &'a Flight<T, E>,
    key: &'a CacheKey,
    call: &'a Arc<Call<T, E>>,
    published: bool,
}

impl<T: Clone, E: Clone> LeaderGuard<'_, T, E> {
    fn publish(&mut self, result: Result<T, E>) {
        self.flight.release(self.key, self.call);
        self.call.finish(CallState::Done(result));
        self.published = true;
    }
}

impl<T: Clone, E: Clone> Drop for LeaderGuard<'_, T, E> {
    fn drop(&mut self) {
        if !self.published {
            self.flight.release(self.key, self.call);
            self.call.finish(CallState::Abandoned);
        }
    }
}
