//! # Capstan Transport
//!
//! Client-side actor task submitter: turns an asynchronous stream of
//! "run this method on that actor" requests into an ordered and
//! flow-controlled sequence of remote calls, absorbing the actor
//! lifecycle (alive, restarting, dead) without exposing it to callers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    Caller threads                    │
//! │   submit_task / connect_actor / cancel_task / ...    │
//! ├──────────────────────────────────────────────────────┤
//! │   ActorTaskSubmitter (one registry-wide mutex)       │
//! │   • ClientQueue per actor: state, client, queues     │
//! │   • Submit queues: sequential or out-of-order        │
//! │   • Inflight replies keyed by (task, attempt)        │
//! │   • Grace-period queue for ambiguous failures        │
//! ├──────────────────────────────────────────────────────┤
//! │   Collaborators (injected, callback-shaped)          │
//! │   task manager · dependency resolver · actor         │
//! │   creator · worker client pool · reference counter   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`ActorTaskSubmitter`] | Registry, dispatch, reply handling, cancellation |
//! | [`queue`] | Per-actor submit queues, both ordering flavors |
//! | [`interfaces`] | Traits for the injected collaborators |
//! | [`wire`] | Request/reply types the submitter populates |
//!
//! ## Quick Start
//!
//! ```ignore
//! use capstan_transport::ActorTaskSubmitter;
//!
//! let submitter = ActorTaskSubmitter::new(
//!     task_manager, resolver, actor_creator, client_pool,
//!     reference_counter, executor, clock, config,
//! );
//! submitter.add_actor_queue_if_not_exists(actor_id, 100, false, false, true);
//! submitter.connect_actor(actor_id, address, 0)?;
//! submitter.submit_task(task_spec)?;
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

/// Error types for submitter operations.
pub mod error;

/// Collaborator interfaces consumed by the submitter.
pub mod interfaces;

/// Per-actor submit queues.
pub mod queue;

/// The submitter itself.
pub mod submitter;

/// Request and reply types.
pub mod wire;

pub use error::{SubmitterError, SubmitterResult};
pub use interfaces::{
    ActorCreator, CancelTaskCallback, CreateActorCallback, DependencyResolver, PushTaskCallback,
    ReferenceCounter, StatusCallback, TaskManager, WorkerClient, WorkerClientPool,
};
pub use queue::{ActorSubmitQueue, OutOfOrderSubmitQueue, SequentialSubmitQueue};
pub use submitter::{
    ActorLifecycleState, ActorTaskSubmitter, ExcessQueueingWarning, SubmitterMetrics,
};
pub use wire::{
    CancelTaskReply, CancelTaskRequest, CreateActorReply, PushTaskReply, PushTaskRequest,
};
