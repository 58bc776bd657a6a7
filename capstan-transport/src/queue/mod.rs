//! Per-actor submit queues.
//!
//! A submit queue holds tasks between submission and dispatch, keyed by
//! the sequence number assigned at submission time. Slots track whether
//! their dependencies have resolved and whether the task was cancelled
//! while queued; the dispatcher pops slots that are ready to send and
//! skips cancelled ones.
//!
//! Two flavors exist, selected per actor at registration time:
//!
//! - [`SequentialSubmitQueue`] yields tasks in strictly ascending
//!   sequence-number order, and only once the lowest-numbered slot has
//!   resolved. The receiving worker replays the same order.
//! - [`OutOfOrderSubmitQueue`] yields any slot whose dependencies have
//!   resolved, and tells the worker to skip its own ordering queue.

mod out_of_order;
mod sequential;

pub use out_of_order::OutOfOrderSubmitQueue;
pub use sequential::SequentialSubmitQueue;

use capstan_core::{TaskId, TaskSpec};

/// One queued task plus its per-slot flags.
#[derive(Debug, Clone)]
pub(crate) struct SubmitSlot {
    pub(crate) spec: TaskSpec,
    pub(crate) dependencies_resolved: bool,
    pub(crate) canceled: bool,
}

impl SubmitSlot {
    pub(crate) fn new(spec: TaskSpec) -> Self {
        Self {
            spec,
            dependencies_resolved: false,
            canceled: false,
        }
    }
}

/// Ordered task buffer between submission and dispatch.
///
/// Sequence numbers are unique per actor and assigned before dependency
/// resolution, so resolver completions arriving out of order cannot
/// reorder an in-order actor's dispatch.
pub trait ActorSubmitQueue: Send {
    /// Insert a task under its sequence number.
    fn emplace(&mut self, sequence_number: u64, spec: TaskSpec);

    /// Whether a slot exists at the sequence number.
    fn contains(&self, sequence_number: u64) -> bool;

    /// Whether the slot's dependencies have resolved. False for absent
    /// slots.
    fn dependencies_resolved(&self, sequence_number: u64) -> bool;

    /// Mark the slot's dependencies resolved.
    fn mark_dependency_resolved(&mut self, sequence_number: u64);

    /// Drop the slot because its dependencies failed to resolve.
    fn mark_dependency_failed(&mut self, sequence_number: u64);

    /// Mark the slot cancelled; the dispatcher will discard it.
    fn mark_task_canceled(&mut self, sequence_number: u64);

    /// Pop the next dispatchable task, if any, together with the
    /// `skip_queue` flag to send with it.
    fn pop_next_task_to_send(&mut self) -> Option<(TaskSpec, bool)>;

    /// Whether no slots remain.
    fn is_empty(&self) -> bool;

    /// Number of slots currently held.
    fn len(&self) -> usize;

    /// Drop every slot, returning the task ids of those not already
    /// cancelled (cancelled tasks were failed when they were cancelled).
    fn clear_all_tasks(&mut self) -> Vec<TaskId>;
}
