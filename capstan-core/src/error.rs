//! Error taxonomy for failed tasks and dead actors.
//!
//! Task failures never cross the submitter's public boundary as `Err`
//! values; they are delivered to the task bookkeeping manager as an
//! [`ErrorInfo`] describing what went wrong and, for actor deaths, why the
//! actor died. The death cause determines both the message shown to users
//! and whether retries should be short-circuited.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ActorId;

/// Classification of a task failure, as reported to the task manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskErrorKind {
    /// One of the task's dependencies could not be resolved.
    DependencyResolutionFailed,
    /// The actor creation task failed or was cancelled.
    ActorCreationFailed,
    /// The actor died; the failure is authoritative.
    ActorDied,
    /// The actor could not be reached; the failure may be transient.
    ActorUnavailable,
    /// The task was cancelled before it executed.
    TaskCancelled,
    /// The task ran and raised a retryable execution error.
    TaskExecutionException,
}

impl std::fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskErrorKind::DependencyResolutionFailed => "dependency resolution failed",
            TaskErrorKind::ActorCreationFailed => "actor creation failed",
            TaskErrorKind::ActorDied => "actor died",
            TaskErrorKind::ActorUnavailable => "actor unavailable",
            TaskErrorKind::TaskCancelled => "task cancelled",
            TaskErrorKind::TaskExecutionException => "task execution exception",
        };
        write!(f, "{}", name)
    }
}

/// Why an actor died, as reported by the actor directory.
///
/// Stored on the client queue once the actor transitions to dead, and used
/// to derive the error attached to every task that can no longer run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ActorDeathCause {
    /// The actor's constructor failed.
    #[error("actor creation failed: {message}")]
    CreationFailed {
        /// The constructor error, rendered as a string.
        message: String,
    },
    /// The worker process hosting the actor died.
    #[error("the worker hosting the actor died: {message}")]
    WorkerDied {
        /// Detail about the worker failure.
        message: String,
    },
    /// The node hosting the actor died.
    #[error("the node hosting the actor died: {message}")]
    NodeDied {
        /// Detail about the node failure.
        message: String,
    },
    /// The actor was killed because its process ran out of memory.
    #[error("the actor was killed by the out-of-memory killer: {message}")]
    OutOfMemory {
        /// Detail about the memory pressure.
        message: String,
        /// When true, tasks must fail without consuming retry budget.
        fail_immediately: bool,
    },
    /// Every handle to the actor went out of scope and it was torn down.
    #[error("the actor handle went out of scope")]
    OutOfScope,
}

/// Structured context attached to an actor-death error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorDiedContext {
    /// The actor that died.
    pub actor_id: ActorId,
    /// Why it died.
    pub cause: ActorDeathCause,
}

/// A task failure as delivered to the task manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// What class of failure this is.
    pub kind: TaskErrorKind,
    /// Human-readable detail.
    pub message: String,
    /// Present when the failure is an actor death.
    pub actor_died: Option<ActorDiedContext>,
}

impl ErrorInfo {
    /// Create an error with no actor-death context.
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            actor_died: None,
        }
    }

    /// Derive the error for tasks that can no longer run because their
    /// actor died with the given cause.
    ///
    /// A missing cause still produces an authoritative actor-death error;
    /// the directory may report a death before it knows why.
    pub fn from_death_cause(actor_id: ActorId, cause: Option<&ActorDeathCause>) -> Self {
        let (message, cause) = match cause {
            Some(cause) => (cause.to_string(), cause.clone()),
            None => (
                "the actor died with no reported cause".to_string(),
                ActorDeathCause::WorkerDied {
                    message: "unknown".to_string(),
                },
            ),
        };
        Self {
            kind: TaskErrorKind::ActorDied,
            message,
            actor_died: Some(ActorDiedContext { actor_id, cause }),
        }
    }

    /// The authoritative error for an actor whose node was drained.
    ///
    /// Used when a parked task times out on a preempted actor: the death
    /// notification may never arrive, but the death itself is certain.
    pub fn preempted(actor_id: ActorId) -> Self {
        Self {
            kind: TaskErrorKind::ActorDied,
            message: "actor died by preemption".to_string(),
            actor_died: Some(ActorDiedContext {
                actor_id,
                cause: ActorDeathCause::NodeDied {
                    message: "the node was inferred to be dead due to draining".to_string(),
                },
            }),
        }
    }

    /// Whether this failure must bypass retries entirely.
    ///
    /// True only for out-of-memory deaths flagged as unrecoverable.
    pub fn fail_immediately(&self) -> bool {
        matches!(
            &self.actor_died,
            Some(ActorDiedContext {
                cause: ActorDeathCause::OutOfMemory {
                    fail_immediately: true,
                    ..
                },
                ..
            })
        )
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
