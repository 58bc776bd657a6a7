//! Callback executor and clock abstractions.
//!
//! The submitter never spawns threads or sleeps itself: continuations run
//! on an injected [`CallbackExecutor`] and deadlines are read from an
//! injected [`Clock`]. Production wiring uses Tokio; tests substitute
//! deterministic implementations.

use std::time::{Duration, Instant};

/// A continuation scheduled onto the executor.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Serial callback executor: the submitter's I/O context.
///
/// Dependency-resolver continuations, reply continuations, and timed
/// retries are all posted here. Implementations must run callbacks outside
/// the caller's stack unless they are explicitly documented as inline
/// (deterministic test executors run inline; callers therefore never hold
/// locks across `post`).
pub trait CallbackExecutor: Send + Sync + 'static {
    /// Schedule a callback to run as soon as possible.
    ///
    /// The tag names the operation for diagnostics.
    fn post(&self, tag: &'static str, callback: Callback);

    /// Schedule a callback to run after the given delay.
    fn execute_after(&self, delay: Duration, callback: Callback);
}

/// Monotonic time source for deadlines.
///
/// Returns time elapsed since an arbitrary origin; only differences are
/// meaningful.
pub trait Clock: Send + Sync + 'static {
    /// Current monotonic time.
    fn now(&self) -> Duration;
}

/// Production executor backed by a Tokio runtime handle.
#[derive(Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

impl TokioExecutor {
    /// Create an executor bound to the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime context.
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }

    /// Create an executor bound to an explicit runtime handle.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

impl CallbackExecutor for TokioExecutor {
    fn post(&self, tag: &'static str, callback: Callback) {
        tracing::trace!(tag, "posting callback");
        self.handle.spawn(async move {
            callback();
        });
    }

    fn execute_after(&self, delay: Duration, callback: Callback) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
    }
}

/// Production clock anchored to process start.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock anchored at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}
