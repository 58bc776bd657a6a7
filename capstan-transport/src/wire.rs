//! Request and reply types populated by the submitter.
//!
//! Only the fields the submitter reads or writes are modeled; framing and
//! codec choice belong to the transport that carries them.

use serde::{Deserialize, Serialize};

use capstan_core::{ActorDeathCause, TaskId, TaskSpec, WorkerAddress, WorkerId};

/// Request pushing one task to an actor's worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushTaskRequest {
    /// The task to execute.
    pub task_spec: TaskSpec,
    /// The worker this request is meant for. A worker that no longer has
    /// this identity (the actor restarted elsewhere) must reject the
    /// request.
    pub intended_worker_id: WorkerId,
    /// The submission ordering key; the receiving worker executes
    /// in-order actors by this number.
    pub sequence_number: u64,
}

/// Reply to a [`PushTaskRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushTaskReply {
    /// The task raised an error the caller may retry.
    pub is_retryable_error: bool,
    /// The task completed but its result is an application-level error.
    pub is_application_error: bool,
    /// The execution error rendered as a string, when one was raised.
    pub task_execution_error: String,
}

/// Request cancelling a task previously pushed to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelTaskRequest {
    /// The task to cancel.
    pub intended_task_id: TaskId,
    /// The worker that submitted the task.
    pub caller_worker_id: WorkerId,
    /// Whether to kill the executing worker. Always false for actor
    /// tasks.
    pub force_kill: bool,
    /// Whether to cancel tasks the target task itself submitted.
    pub recursive: bool,
}

/// Reply to a [`CancelTaskRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelTaskReply {
    /// Whether the executor managed to act on the cancellation. False
    /// asks the submitter to retry.
    pub attempt_succeeded: bool,
}

/// Reply from the actor directory to a creation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateActorReply {
    /// Where the actor was placed, when creation got that far.
    pub actor_address: Option<WorkerAddress>,
    /// Why the actor died, when creation was cancelled by a death.
    pub death_cause: Option<ActorDeathCause>,
}
