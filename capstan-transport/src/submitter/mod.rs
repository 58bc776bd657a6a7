//! The actor task submitter.
//!
//! One instance lives in each worker process. It owns the client-queue
//! registry and everything per-actor inside it, guarded by a single
//! registry-wide mutex. Public operations may be called from any thread;
//! continuations (resolver completions, RPC replies, timers) arrive on the
//! injected callback executor.
//!
//! # Locking discipline
//!
//! Every mutation of registry state happens under the mutex, and the mutex
//! is never held across a call into a collaborator that can re-enter the
//! submitter (task manager, dependency resolver, actor creator, client
//! reply paths). Paths that need both extract the affected data into
//! locals, drop the lock, then invoke the callbacks. The client pool's
//! connect/disconnect are plain registry maintenance and are the only
//! collaborator calls made under the lock.

mod cancel;
mod client_queue;
mod dispatch;
mod lifecycle;
mod metrics;
mod submit;

pub use client_queue::ActorLifecycleState;
pub use metrics::SubmitterMetrics;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use capstan_core::{ActorId, CallbackExecutor, Clock, SubmitterConfig, TaskId, WorkerAddress};

use crate::error::{SubmitterError, SubmitterResult};
use crate::interfaces::{
    ActorCreator, DependencyResolver, ReferenceCounter, TaskManager, WorkerClientPool,
};
use client_queue::ClientQueue;

/// Callback invoked when an actor's inflight count crosses the (doubling)
/// excess-queueing warning threshold.
pub type ExcessQueueingWarning = Box<dyn Fn(ActorId, usize) + Send + Sync + 'static>;

/// Registry state guarded by the submitter's single mutex.
pub(crate) struct SubmitterState {
    /// One client queue per known actor.
    pub(crate) client_queues: HashMap<ActorId, ClientQueue>,
    /// Generators awaiting resubmission on their next successful reply.
    pub(crate) generators_to_resubmit: HashSet<TaskId>,
    /// Inflight-count threshold for the next excess-queueing warning.
    pub(crate) next_queueing_warn_threshold: usize,
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<SubmitterState>,
    pub(crate) task_manager: Arc<dyn TaskManager>,
    pub(crate) resolver: Arc<dyn DependencyResolver>,
    pub(crate) actor_creator: Arc<dyn ActorCreator>,
    pub(crate) client_pool: Arc<dyn WorkerClientPool>,
    pub(crate) reference_counter: Arc<dyn ReferenceCounter>,
    pub(crate) executor: Arc<dyn CallbackExecutor>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: SubmitterConfig,
    pub(crate) warn_excess_queueing: ExcessQueueingWarning,
    pub(crate) metrics: Mutex<SubmitterMetrics>,
}

/// Submits tasks to remote stateful actors, absorbing actor lifecycle
/// (alive, restarting, dead) without exposing it to callers.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ActorTaskSubmitter {
    pub(crate) shared: Arc<Shared>,
}

impl ActorTaskSubmitter {
    /// Create a submitter wired to its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_manager: Arc<dyn TaskManager>,
        resolver: Arc<dyn DependencyResolver>,
        actor_creator: Arc<dyn ActorCreator>,
        client_pool: Arc<dyn WorkerClientPool>,
        reference_counter: Arc<dyn ReferenceCounter>,
        executor: Arc<dyn CallbackExecutor>,
        clock: Arc<dyn Clock>,
        config: SubmitterConfig,
    ) -> Self {
        Self::with_excess_queueing_warning(
            task_manager,
            resolver,
            actor_creator,
            client_pool,
            reference_counter,
            executor,
            clock,
            config,
            Box::new(|actor_id, num_queued| {
                tracing::warn!(
                    actor_id = %actor_id,
                    num_queued,
                    "excess queueing of tasks to actor"
                );
            }),
        )
    }

    /// Create a submitter with a custom excess-queueing warning sink.
    #[allow(clippy::too_many_arguments)]
    pub fn with_excess_queueing_warning(
        task_manager: Arc<dyn TaskManager>,
        resolver: Arc<dyn DependencyResolver>,
        actor_creator: Arc<dyn ActorCreator>,
        client_pool: Arc<dyn WorkerClientPool>,
        reference_counter: Arc<dyn ReferenceCounter>,
        executor: Arc<dyn CallbackExecutor>,
        clock: Arc<dyn Clock>,
        config: SubmitterConfig,
        warn_excess_queueing: ExcessQueueingWarning,
    ) -> Self {
        let next_queueing_warn_threshold = config.initial_queueing_warn_threshold;
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SubmitterState {
                    client_queues: HashMap::new(),
                    generators_to_resubmit: HashSet::new(),
                    next_queueing_warn_threshold,
                }),
                task_manager,
                resolver,
                actor_creator,
                client_pool,
                reference_counter,
                executor,
                clock,
                config,
                warn_excess_queueing,
                metrics: Mutex::new(SubmitterMetrics::default()),
            }),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, SubmitterState> {
        self.shared.state.lock()
    }

    /// Register an actor, creating its client queue if absent.
    ///
    /// Idempotent: repeat registrations are no-ops and later arguments are
    /// ignored. When this worker owns the handle and the queue was newly
    /// created, an out-of-scope callback is subscribed against the
    /// reference counter so the actor directory learns when the handle is
    /// dropped.
    pub fn add_actor_queue_if_not_exists(
        &self,
        actor_id: ActorId,
        max_pending_calls: i32,
        execute_out_of_order: bool,
        fail_if_actor_unreachable: bool,
        owned: bool,
    ) {
        let inserted = {
            let mut state = self.state();
            // Repeat registration is normal: this worker may hold several
            // references to the same actor.
            if state.client_queues.contains_key(&actor_id) {
                false
            } else {
                tracing::info!(
                    actor_id = %actor_id,
                    max_pending_calls,
                    execute_out_of_order,
                    "registering actor"
                );
                state.client_queues.insert(
                    actor_id,
                    ClientQueue::new(
                        execute_out_of_order,
                        max_pending_calls,
                        fail_if_actor_unreachable,
                        owned,
                    ),
                );
                true
            }
        };
        if owned && inserted {
            // The owner must tell the directory when the handle is gone so
            // the actor can be torn down.
            self.subscribe_out_of_scope(actor_id, 0);
        }
    }

    /// The actor's lifecycle state, if it is registered.
    pub fn local_state(&self, actor_id: ActorId) -> Option<ActorLifecycleState> {
        self.state()
            .client_queues
            .get(&actor_id)
            .map(|queue| queue.state)
    }

    /// Whether the actor currently has a connected client.
    pub fn is_actor_alive(&self, actor_id: ActorId) -> bool {
        self.state()
            .client_queues
            .get(&actor_id)
            .is_some_and(|queue| queue.rpc_client.is_some())
    }

    /// The address of the actor's connected worker, if any.
    pub fn actor_address(&self, actor_id: ActorId) -> Option<WorkerAddress> {
        self.state()
            .client_queues
            .get(&actor_id)
            .and_then(|queue| queue.rpc_client.as_ref())
            .map(|client| client.addr())
    }

    /// The caller's backpressure signal: true when the actor is at or
    /// above its admission ceiling. The submitter itself never blocks on
    /// this threshold.
    pub fn pending_tasks_full(&self, actor_id: ActorId) -> SubmitterResult<bool> {
        let state = self.state();
        let queue = state
            .client_queues
            .get(&actor_id)
            .ok_or(SubmitterError::UnknownActor { actor_id })?;
        Ok(queue.pending_tasks_full())
    }

    /// Number of submitted-but-unfinished tasks for the actor.
    pub fn num_pending_tasks(&self, actor_id: ActorId) -> SubmitterResult<usize> {
        let state = self.state();
        let queue = state
            .client_queues
            .get(&actor_id)
            .ok_or(SubmitterError::UnknownActor { actor_id })?;
        Ok(queue.cur_pending_calls.max(0) as usize)
    }

    /// Whether the actor has ever been registered.
    pub fn actor_exists(&self, actor_id: ActorId) -> bool {
        self.state().client_queues.contains_key(&actor_id)
    }

    /// One-line diagnostic summary of the actor's client queue.
    pub fn debug_string(&self, actor_id: ActorId) -> SubmitterResult<String> {
        let state = self.state();
        let queue = state
            .client_queues
            .get(&actor_id)
            .ok_or(SubmitterError::UnknownActor { actor_id })?;
        Ok(format!("actor {} {}", actor_id, queue.debug_string()))
    }

    /// Latch that the actor's node was drained.
    ///
    /// Parked tasks that time out on a preempted actor fail with an
    /// authoritative actor-death error instead of their provisional one.
    pub fn mark_preempted(&self, actor_id: ActorId) {
        let mut state = self.state();
        if let Some(queue) = state.client_queues.get_mut(&actor_id) {
            tracing::info!(actor_id = %actor_id, "actor marked preempted");
            queue.preempted = true;
        }
    }

    /// Snapshot of the submitter's activity counters.
    pub fn metrics(&self) -> SubmitterMetrics {
        self.shared.metrics.lock().clone()
    }
}
