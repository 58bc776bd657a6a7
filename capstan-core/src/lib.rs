//! # Capstan Core
//!
//! Core types for the capstan actor task submitter.
//!
//! This crate holds everything the submitter and its collaborators agree
//! on without pulling in the submission machinery itself:
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`Uid`] and the id newtypes | Identities for actors, tasks, workers, nodes, objects |
//! | [`WorkerAddress`] | Socket + identities of a worker hosting an actor |
//! | [`RpcStatus`] | Transport-level outcome of an RPC |
//! | [`TaskErrorKind`] / [`ErrorInfo`] / [`ActorDeathCause`] | Failure taxonomy delivered to the task manager |
//! | [`CallbackExecutor`] / [`Clock`] | Injected scheduling and time |
//! | [`SubmitterConfig`] | Injected tunables |
//! | [`TaskSpec`] | The unit of submitted work |

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

/// Worker addressing.
pub mod address;

/// Submitter configuration.
pub mod config;

/// Task failure and actor death taxonomy.
pub mod error;

/// Callback executor and clock abstractions.
pub mod executor;

/// Transport-level RPC status.
pub mod status;

/// Task specifications.
pub mod task;

/// Identifier types.
pub mod types;

pub use address::WorkerAddress;
pub use config::SubmitterConfig;
pub use error::{ActorDeathCause, ActorDiedContext, ErrorInfo, TaskErrorKind};
pub use executor::{Callback, CallbackExecutor, Clock, MonotonicClock, TokioExecutor};
pub use status::RpcStatus;
pub use task::{TaskKind, TaskSpec};
pub use types::{ActorId, NodeId, ObjectId, TaskAttempt, TaskId, Uid, WorkerId};
