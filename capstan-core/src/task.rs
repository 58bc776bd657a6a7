//! Task specifications.

use serde::{Deserialize, Serialize};

use crate::types::{ActorId, ObjectId, TaskAttempt, TaskId, WorkerId};

/// What kind of work a task specification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    /// A method invocation on an existing actor.
    ActorCall,
    /// The creation of a new actor (runs the constructor).
    ActorCreation,
}

/// Specification of one task, owned by value wherever it travels.
///
/// Continuations capture the spec they describe, so the type is a plain
/// clonable value: no interior mutability, no shared state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Identity of this task.
    pub task_id: TaskId,
    /// The actor the task targets (for creation tasks, the actor being
    /// created).
    pub actor_id: ActorId,
    /// Which attempt of the task this is; retries increment it.
    pub attempt_number: u32,
    /// Per-actor submission ordering key, assigned before dependency
    /// resolution.
    pub sequence_number: u64,
    /// Identity of the worker submitting the task.
    pub caller_worker_id: WorkerId,
    /// The method to invoke.
    pub method: String,
    /// Objects the task depends on; all must resolve before dispatch.
    pub dependencies: Vec<ObjectId>,
    /// Whether this is an actor call or an actor creation.
    pub kind: TaskKind,
}

impl TaskSpec {
    /// Whether this spec describes an actor method call.
    pub fn is_actor_task(&self) -> bool {
        self.kind == TaskKind::ActorCall
    }

    /// Whether this spec describes an actor creation.
    pub fn is_actor_creation_task(&self) -> bool {
        self.kind == TaskKind::ActorCreation
    }

    /// The attempt key identifying this delivery of the task.
    pub fn task_attempt(&self) -> TaskAttempt {
        TaskAttempt::new(self.task_id, self.attempt_number)
    }
}
