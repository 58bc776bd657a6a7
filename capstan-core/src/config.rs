//! Submitter configuration.

use std::time::Duration;

/// Tunables for the actor task submitter.
///
/// Injected at construction; the submitter reads no global state.
#[derive(Clone, Debug)]
pub struct SubmitterConfig {
    /// How long a task whose push failed waits for authoritative death
    /// information before being failed with its provisional error.
    ///
    /// Zero disables parking entirely: ambiguous transport failures fail
    /// as soon as the task manager declines to retry.
    pub wait_for_death_info_timeout: Duration,

    /// Number of inflight calls to one actor above which a warning is
    /// emitted. Doubles after each emission so a persistently deep queue
    /// warns at a bounded rate.
    pub initial_queueing_warn_threshold: usize,

    /// Delay before retrying a cancellation when the actor has no
    /// connected client yet.
    pub cancel_retry_when_unconnected: Duration,

    /// Delay before retrying a cancellation after the executor reported
    /// the attempt did not succeed.
    pub cancel_retry_when_failed: Duration,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            wait_for_death_info_timeout: Duration::from_secs(1),
            initial_queueing_warn_threshold: 5000,
            cancel_retry_when_unconnected: Duration::from_secs(1),
            cancel_retry_when_failed: Duration::from_secs(2),
        }
    }
}

impl SubmitterConfig {
    /// Disable the death-info grace period.
    pub fn without_death_info_grace_period(mut self) -> Self {
        self.wait_for_death_info_timeout = Duration::ZERO;
        self
    }

    /// Set the death-info grace period.
    pub fn with_death_info_grace_period(mut self, timeout: Duration) -> Self {
        self.wait_for_death_info_timeout = timeout;
        self
    }
}
