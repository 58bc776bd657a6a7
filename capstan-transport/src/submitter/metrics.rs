//! Submitter-wide counters.

/// Monotone counters describing submitter activity.
///
/// Snapshot semantics: [`crate::ActorTaskSubmitter::metrics`] returns a
/// copy taken under the metrics lock.
#[derive(Debug, Clone, Default)]
pub struct SubmitterMetrics {
    /// Tasks accepted into a submit queue.
    pub tasks_queued: u64,
    /// Push requests handed to a worker client.
    pub tasks_pushed: u64,
    /// Tasks completed at the task manager, including completions that
    /// carry an application error.
    pub tasks_completed: u64,
    /// Tasks failed terminally: failed outright, or refused a retry by
    /// the task manager.
    pub tasks_failed: u64,
    /// Tasks parked awaiting authoritative death information.
    pub tasks_parked: u64,
    /// Replies discarded because their inflight entry was gone
    /// (late or duplicate replies after a reconnect).
    pub duplicate_replies_ignored: u64,
    /// Inflight callbacks failed synthetically on connect or disconnect.
    pub inflight_failed_on_restart: u64,
    /// Cancellation requests sent to worker clients.
    pub cancel_rpcs_sent: u64,
}

impl SubmitterMetrics {
    pub(crate) fn record_task_queued(&mut self) {
        self.tasks_queued += 1;
    }

    pub(crate) fn record_task_pushed(&mut self) {
        self.tasks_pushed += 1;
    }

    pub(crate) fn record_task_completed(&mut self) {
        self.tasks_completed += 1;
    }

    pub(crate) fn record_task_failed(&mut self) {
        self.tasks_failed += 1;
    }

    pub(crate) fn record_task_parked(&mut self) {
        self.tasks_parked += 1;
    }

    pub(crate) fn record_duplicate_reply(&mut self) {
        self.duplicate_replies_ignored += 1;
    }

    pub(crate) fn record_inflight_failed(&mut self, count: usize) {
        self.inflight_failed_on_restart += count as u64;
    }

    pub(crate) fn record_cancel_rpc(&mut self) {
        self.cancel_rpcs_sent += 1;
    }
}
