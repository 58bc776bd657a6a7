//! Collaborator interfaces consumed by the submitter.
//!
//! The submitter sits between four long-lived collaborators (the task
//! bookkeeping manager, the dependency resolver, the actor creator, and
//! the worker client pool) plus the reference counter it subscribes to
//! for out-of-scope notifications. Each is injected as a trait object.
//!
//! Every callback here may legitimately re-enter the submitter, so the
//! submitter never invokes any of these methods while holding its registry
//! lock (the client pool's connect/disconnect are the one exception: they
//! are registry maintenance, not callback sources).

use std::sync::Arc;

use capstan_core::{
    ActorId, ErrorInfo, NodeId, ObjectId, RpcStatus, TaskErrorKind, TaskId, TaskSpec,
    WorkerAddress, WorkerId,
};

use crate::wire::{
    CancelTaskReply, CancelTaskRequest, CreateActorReply, PushTaskReply, PushTaskRequest,
};

/// Continuation receiving a bare status.
pub type StatusCallback = Box<dyn FnOnce(RpcStatus) + Send + 'static>;

/// Continuation receiving a push-task reply.
pub type PushTaskCallback = Box<dyn FnOnce(RpcStatus, PushTaskReply) + Send + 'static>;

/// Continuation receiving a cancel-task reply.
pub type CancelTaskCallback = Box<dyn FnOnce(RpcStatus, CancelTaskReply) + Send + 'static>;

/// Continuation receiving a create-actor reply.
pub type CreateActorCallback = Box<dyn FnOnce(RpcStatus, CreateActorReply) + Send + 'static>;

/// Resolves a task's object dependencies asynchronously.
pub trait DependencyResolver: Send + Sync {
    /// Begin resolving the task's dependencies; the callback fires once
    /// with the outcome. Callbacks may fire out of submission order.
    fn resolve_dependencies(&self, task_spec: TaskSpec, callback: StatusCallback);

    /// Abandon an in-progress resolution. A no-op if resolution already
    /// completed or was never requested.
    fn cancel_resolution(&self, task_id: TaskId);
}

/// Records task status, retries, and final outcomes.
///
/// The submitter reports every task transition here and consults it for
/// retry decisions; it never decides a task's fate on its own.
pub trait TaskManager: Send + Sync {
    /// The task's dependencies finished resolving (successfully or not).
    fn mark_dependencies_resolved(&self, task_id: TaskId);

    /// The task was cancelled by the caller.
    fn mark_task_canceled(&self, task_id: TaskId);

    /// The task was handed to a worker and awaits execution there.
    fn mark_task_waiting_for_execution(&self, task_id: TaskId, node_id: NodeId, worker_id: WorkerId);

    /// The task produced a reply; record its completion.
    fn complete_pending_task(
        &self,
        task_id: TaskId,
        reply: PushTaskReply,
        worker_address: WorkerAddress,
        is_application_error: bool,
    );

    /// Fail the task terminally.
    fn fail_pending_task(
        &self,
        task_id: TaskId,
        error_kind: TaskErrorKind,
        status: Option<RpcStatus>,
        error_info: Option<ErrorInfo>,
    );

    /// Fail the task, or schedule a retry if budget remains. Returns true
    /// when the task will be retried.
    #[allow(clippy::too_many_arguments)]
    fn fail_or_retry_pending_task(
        &self,
        task_id: TaskId,
        error_kind: TaskErrorKind,
        status: Option<RpcStatus>,
        error_info: Option<ErrorInfo>,
        mark_task_object_failed: bool,
        fail_immediately: bool,
    ) -> bool;

    /// Whether the task is still pending (not completed or failed).
    fn is_task_pending(&self, task_id: TaskId) -> bool;

    /// The spec of a still-tracked task, if any.
    fn task_spec(&self, task_id: TaskId) -> Option<TaskSpec>;

    /// Mark a streaming-generator task failed and resubmit it to recover
    /// its lost objects.
    fn mark_generator_failed_and_resubmit(&self, task_id: TaskId);
}

/// Issues creation and restart requests to the global actor directory.
pub trait ActorCreator: Send + Sync {
    /// Create the actor described by the (creation) task spec.
    fn create_actor(&self, task_spec: TaskSpec, callback: CreateActorCallback);

    /// Ask the directory to restart a dead-but-restartable actor so its
    /// lost objects can be reconstructed.
    fn restart_actor_for_lineage_reconstruction(
        &self,
        actor_id: ActorId,
        num_restarts_due_to_lineage_reconstruction: u64,
        callback: StatusCallback,
    );

    /// Report that the owner's handle to the actor went out of scope, so
    /// the directory can tear the actor down.
    fn report_actor_out_of_scope(
        &self,
        actor_id: ActorId,
        num_restarts_due_to_lineage_reconstruction: u64,
        callback: StatusCallback,
    );
}

/// Transport client bound to one worker.
pub trait WorkerClient: Send + Sync {
    /// Push a task to the worker. The callback fires exactly once with
    /// the transport status and (possibly default) reply.
    fn push_actor_task(
        &self,
        request: PushTaskRequest,
        skip_queue: bool,
        callback: PushTaskCallback,
    );

    /// Ask the worker to cancel a task.
    fn cancel_task(&self, request: CancelTaskRequest, callback: CancelTaskCallback);

    /// The address this client is connected to.
    fn addr(&self) -> WorkerAddress;
}

/// Produces and caches per-worker transport clients.
pub trait WorkerClientPool: Send + Sync {
    /// Get the cached client for the address, connecting if necessary.
    fn get_or_connect(&self, address: &WorkerAddress) -> Arc<dyn WorkerClient>;

    /// Drop the cached client for a worker.
    fn disconnect(&self, worker_id: &WorkerId);
}

/// Observes object lifetimes on behalf of the submitter.
pub trait ReferenceCounter: Send + Sync {
    /// Subscribe a callback to fire when the object goes out of scope or
    /// is freed. Returns false, without storing the callback, if the
    /// object is already out of scope; the caller then invokes the
    /// callback itself.
    fn add_object_out_of_scope_or_freed_callback(
        &self,
        object_id: ObjectId,
        callback: Box<dyn FnOnce(ObjectId) + Send + 'static>,
    ) -> bool;
}
