//! Error types for submitter operations.

use capstan_core::{ActorId, TaskId};

/// Errors returned by the submitter's public operations.
///
/// These cover misuse of the API surface only. Task-level failures never
/// surface here; they are reported to the task manager, per the error
/// design of the submitter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitterError {
    /// The actor was never registered with the submitter.
    #[error("unknown actor: {actor_id}")]
    UnknownActor {
        /// The unregistered actor.
        actor_id: ActorId,
    },

    /// An actor-call operation received a non-actor-call spec.
    #[error("task {task_id} is not an actor call")]
    NotAnActorTask {
        /// The offending task.
        task_id: TaskId,
    },

    /// A creation operation received a non-creation spec.
    #[error("task {task_id} is not an actor creation task")]
    NotACreationTask {
        /// The offending task.
        task_id: TaskId,
    },
}

/// Result alias for submitter operations.
pub type SubmitterResult<T> = Result<T, SubmitterError>;
