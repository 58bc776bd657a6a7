//! Per-actor client queue state.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use capstan_core::{ActorDeathCause, ErrorInfo, RpcStatus, TaskAttempt, TaskSpec, WorkerId};

use crate::interfaces::{PushTaskCallback, WorkerClient};
use crate::queue::{ActorSubmitQueue, OutOfOrderSubmitQueue, SequentialSubmitQueue};

/// Lifecycle state of an actor as seen by this submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorLifecycleState {
    /// Registered but never yet connected.
    PendingCreation,
    /// Connected; tasks flow.
    Alive,
    /// Between connections; tasks queue (or fail, per configuration).
    Restarting,
    /// Permanently dead, unless owned and restartable.
    Dead,
}

/// A task whose push failed and which is waiting, bounded by a deadline,
/// for authoritative death information to arrive.
pub(crate) struct ParkedTask {
    /// Monotonic deadline after which the provisional error is used.
    pub(crate) deadline: Duration,
    /// The task that failed.
    pub(crate) spec: TaskSpec,
    /// The transport status observed at failure time.
    pub(crate) status: RpcStatus,
    /// The provisional error to use if no death information arrives.
    pub(crate) error_info: ErrorInfo,
    /// Stamped by the sweeper: whether the actor's node was drained.
    pub(crate) actor_preempted: bool,
}

/// Everything this submitter tracks for one actor.
///
/// Lives in the registry from first registration until submitter shutdown;
/// entries persist through death so late lifecycle events and replies
/// still find their state.
pub(crate) struct ClientQueue {
    /// Current lifecycle state.
    pub(crate) state: ActorLifecycleState,
    /// Whether this worker owns the actor handle. Owners may restart a
    /// dead actor for lineage reconstruction and must report the handle
    /// going out of scope.
    pub(crate) owned: bool,
    /// Whether the actor can still be restarted after death.
    pub(crate) is_restartable: bool,
    /// Latched when the handle was reported out of scope; suppresses
    /// dispatch until the authoritative death message arrives.
    pub(crate) pending_out_of_scope_death: bool,
    /// When true, tasks submitted while the actor is restarting fail
    /// immediately instead of waiting for the reconnect.
    pub(crate) fail_if_actor_unreachable: bool,
    /// Admission-control ceiling; zero or negative means unlimited.
    pub(crate) max_pending_calls: i32,
    /// Tasks submitted and not yet completed or failed.
    pub(crate) cur_pending_calls: i64,
    /// Largest restart epoch observed from the actor directory. Stale
    /// lifecycle events carry a smaller epoch and are discarded.
    pub(crate) num_restarts: u64,
    /// Owner-initiated restarts, counted separately.
    pub(crate) num_restarts_due_to_lineage_reconstructions: u64,
    /// Identity of the worker currently hosting the actor.
    pub(crate) worker_id: Option<WorkerId>,
    /// Transport client; present only while the actor is alive.
    pub(crate) rpc_client: Option<Arc<dyn WorkerClient>>,
    /// Tasks accepted but not yet pushed, ordered by sequence number.
    pub(crate) submit_queue: Box<dyn ActorSubmitQueue>,
    /// Reply continuations for pushes whose reply has not been consumed,
    /// keyed by (task, attempt).
    pub(crate) inflight_task_callbacks: HashMap<TaskAttempt, PushTaskCallback>,
    /// Tasks parked awaiting authoritative death information, in
    /// deadline order.
    pub(crate) wait_for_death_info_tasks: VecDeque<ParkedTask>,
    /// Why the actor died, once known.
    pub(crate) death_cause: Option<ActorDeathCause>,
    /// Latched when the actor's node was drained.
    pub(crate) preempted: bool,
}

impl ClientQueue {
    pub(crate) fn new(
        execute_out_of_order: bool,
        max_pending_calls: i32,
        fail_if_actor_unreachable: bool,
        owned: bool,
    ) -> Self {
        let submit_queue: Box<dyn ActorSubmitQueue> = if execute_out_of_order {
            Box::new(OutOfOrderSubmitQueue::new())
        } else {
            Box::new(SequentialSubmitQueue::new())
        };
        Self {
            state: ActorLifecycleState::PendingCreation,
            owned,
            is_restartable: false,
            pending_out_of_scope_death: false,
            fail_if_actor_unreachable,
            max_pending_calls,
            cur_pending_calls: 0,
            num_restarts: 0,
            num_restarts_due_to_lineage_reconstructions: 0,
            worker_id: None,
            rpc_client: None,
            submit_queue,
            inflight_task_callbacks: HashMap::new(),
            wait_for_death_info_tasks: VecDeque::new(),
            death_cause: None,
            preempted: false,
        }
    }

    /// The caller's backpressure signal: at or above the admission
    /// ceiling.
    pub(crate) fn pending_tasks_full(&self) -> bool {
        self.max_pending_calls > 0 && self.cur_pending_calls >= i64::from(self.max_pending_calls)
    }

    /// One-line summary for diagnostics.
    pub(crate) fn debug_string(&self) -> String {
        format!(
            "state={:?} owned={} restartable={} epoch={} pending_calls={} queued={} inflight={} parked={} preempted={}",
            self.state,
            self.owned,
            self.is_restartable,
            self.num_restarts,
            self.cur_pending_calls,
            self.submit_queue.len(),
            self.inflight_task_callbacks.len(),
            self.wait_for_death_info_tasks.len(),
            self.preempted,
        )
    }
}
