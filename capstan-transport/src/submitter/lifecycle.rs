//! Actor lifecycle transitions: connect, disconnect, lineage restart,
//! and out-of-scope subscription.

use std::collections::VecDeque;

use capstan_core::{ActorDeathCause, ActorId, ErrorInfo, ObjectId, RpcStatus, WorkerAddress};

use crate::error::{SubmitterError, SubmitterResult};
use crate::interfaces::PushTaskCallback;
use crate::wire::PushTaskReply;

use super::ActorTaskSubmitter;
use super::client_queue::{ActorLifecycleState, ClientQueue, ParkedTask};

/// Deferred collaborator call prepared under the registry lock and run
/// after it is released.
pub(crate) type DeferredAction = Box<dyn FnOnce() + Send + 'static>;

impl ActorTaskSubmitter {
    /// Connect the actor to the worker at `address`.
    ///
    /// The only path that brings an actor to alive. Stale-safe: events
    /// carrying an older restart epoch, a socket identical to the current
    /// client's, or arriving after death are discarded. Replacing an
    /// existing client detaches its inflight callbacks and fails them with
    /// a synthetic transport error, as if the network had severed, so the
    /// normal reply path repairs those tasks.
    pub fn connect_actor(
        &self,
        actor_id: ActorId,
        address: WorkerAddress,
        num_restarts: u64,
    ) -> SubmitterResult<()> {
        tracing::debug!(
            actor_id = %actor_id,
            worker_id = %address.worker_id,
            num_restarts,
            "connecting to actor"
        );

        let mut detached: Vec<PushTaskCallback> = Vec::new();
        let actions;
        {
            let mut state = self.state();
            let queue = state
                .client_queues
                .get_mut(&actor_id)
                .ok_or(SubmitterError::UnknownActor { actor_id })?;

            if num_restarts < queue.num_restarts {
                // An old incarnation; the actor has restarted since.
                tracing::info!(actor_id = %actor_id, "skipping stale actor connection");
                return Ok(());
            }
            if let Some(client) = &queue.rpc_client {
                if client.addr().same_endpoint(&address) {
                    tracing::debug!(actor_id = %actor_id, "actor already connected to this worker");
                    return Ok(());
                }
            }
            if queue.state == ActorLifecycleState::Dead {
                // The actor died since this event was emitted.
                return Ok(());
            }

            queue.num_restarts = num_restarts;
            if queue.rpc_client.is_some() {
                // Evict the client of the previous incarnation.
                self.disconnect_rpc_client_locked(queue);
                detached = queue
                    .inflight_task_callbacks
                    .drain()
                    .map(|(_, callback)| callback)
                    .collect();
            }

            queue.state = ActorLifecycleState::Alive;
            queue.worker_id = Some(address.worker_id);
            queue.rpc_client = Some(self.shared.client_pool.get_or_connect(&address));

            actions = self.drain_dispatchable_locked(&mut state, actor_id);
        }

        self.run_dispatch_actions(actions);
        self.fail_inflight_tasks_on_restart(detached);
        Ok(())
    }

    /// Record that the actor disconnected: restarting when `dead` is
    /// false, permanently dead otherwise.
    ///
    /// Stale-safe on the restart epoch for restart events. Death clears
    /// the submit queue and grace-period queue and fails every extracted
    /// task with the death cause, unless the actor is owned and
    /// restartable with queued work, in which case lineage reconstruction
    /// is initiated instead.
    pub fn disconnect_actor(
        &self,
        actor_id: ActorId,
        num_restarts: u64,
        dead: bool,
        death_cause: Option<ActorDeathCause>,
        is_restartable: bool,
    ) -> SubmitterResult<()> {
        tracing::debug!(
            actor_id = %actor_id,
            num_restarts,
            dead,
            death_cause = ?death_cause,
            "disconnecting from actor"
        );

        let mut detached: Vec<PushTaskCallback> = Vec::new();
        let mut parked: VecDeque<ParkedTask> = VecDeque::new();
        let mut task_ids_to_fail = Vec::new();
        let mut restart_action: Option<DeferredAction> = None;
        {
            let mut state = self.state();
            let queue = state
                .client_queues
                .get_mut(&actor_id)
                .ok_or(SubmitterError::UnknownActor { actor_id })?;

            if !dead {
                debug_assert!(num_restarts > 0, "restart events carry a positive epoch");
                if num_restarts <= queue.num_restarts {
                    // Already restarted past this event.
                    tracing::info!(actor_id = %actor_id, "skipping stale actor disconnection");
                    return Ok(());
                }
            }

            // Either the actor is permanently dead or a new client will be
            // installed once it restarts.
            self.disconnect_rpc_client_locked(queue);
            detached = queue
                .inflight_task_callbacks
                .drain()
                .map(|(_, callback)| callback)
                .collect();

            if dead {
                queue.state = ActorLifecycleState::Dead;
                queue.death_cause = death_cause.clone();
                queue.pending_out_of_scope_death = false;
                queue.is_restartable = is_restartable;

                if queue.is_restartable && queue.owned {
                    // Out of scope implies no inflight work remained.
                    debug_assert!(queue.wait_for_death_info_tasks.is_empty());
                    debug_assert!(detached.is_empty());
                    if !queue.submit_queue.is_empty() {
                        // Queued work needs the actor back.
                        restart_action = Some(self.prepare_restart_locked(queue, actor_id));
                    }
                } else {
                    tracing::info!(
                        actor_id = %actor_id,
                        "failing pending tasks because the actor is dead"
                    );
                    task_ids_to_fail = queue.submit_queue.clear_all_tasks();
                    parked = std::mem::take(&mut queue.wait_for_death_info_tasks);
                }
            } else if queue.state != ActorLifecycleState::Dead {
                queue.state = ActorLifecycleState::Restarting;
                queue.num_restarts = num_restarts;
            }
        }

        if let Some(restart) = restart_action {
            restart();
        }

        if !task_ids_to_fail.is_empty() || !parked.is_empty() {
            let status = RpcStatus::io_error("cancelling all pending tasks of dead actor");
            let error_info = ErrorInfo::from_death_cause(actor_id, death_cause.as_ref());
            let fail_immediately = error_info.fail_immediately();

            for task_id in task_ids_to_fail {
                self.shared.task_manager.mark_task_canceled(task_id);
                // The task may still be resolving dependencies.
                self.shared.resolver.cancel_resolution(task_id);
                let retried = self.shared.task_manager.fail_or_retry_pending_task(
                    task_id,
                    error_info.kind,
                    Some(status.clone()),
                    Some(error_info.clone()),
                    true,
                    fail_immediately,
                );
                if !retried {
                    self.shared.metrics.lock().record_task_failed();
                }
            }
            if !parked.is_empty() {
                tracing::debug!(
                    actor_id = %actor_id,
                    count = parked.len(),
                    "failing tasks waiting for death info"
                );
                for task in parked {
                    self.shared.task_manager.fail_pending_task(
                        task.spec.task_id,
                        error_info.kind,
                        Some(task.status),
                        Some(error_info.clone()),
                    );
                    self.shared.metrics.lock().record_task_failed();
                }
            }
        }

        self.fail_inflight_tasks_on_restart(detached);
        Ok(())
    }

    /// Transition a dead-but-restartable owned actor to restarting and
    /// prepare the directory restart call.
    ///
    /// State changes happen here, under the caller's lock; the returned
    /// action performs the actor-creator call and must run after the lock
    /// is released.
    pub(crate) fn prepare_restart_locked(
        &self,
        queue: &mut ClientQueue,
        actor_id: ActorId,
    ) -> DeferredAction {
        debug_assert!(queue.owned, "only the owner can restart a dead actor");
        debug_assert!(queue.is_restartable, "actor is no longer restartable");
        tracing::info!(actor_id = %actor_id, "restarting actor for lineage reconstruction");
        queue.state = ActorLifecycleState::Restarting;
        queue.num_restarts_due_to_lineage_reconstructions += 1;
        let num_restarts = queue.num_restarts_due_to_lineage_reconstructions;

        let submitter = self.clone();
        Box::new(move || {
            let on_restarted = submitter.clone();
            submitter
                .shared
                .actor_creator
                .restart_actor_for_lineage_reconstruction(
                    actor_id,
                    num_restarts,
                    Box::new(move |status| {
                        if status.is_ok() {
                            // Watch for the handle going out of scope again.
                            on_restarted.subscribe_out_of_scope(actor_id, num_restarts);
                        } else {
                            tracing::error!(
                                actor_id = %actor_id,
                                %status,
                                "failed to reconstruct actor"
                            );
                        }
                    }),
                );
        })
    }

    /// Subscribe to the actor handle going out of scope, so the directory
    /// learns when the actor is no longer referenced.
    ///
    /// If the handle is already out of scope the callback runs inline.
    /// The callback is re-entrancy-safe: it latches
    /// `pending_out_of_scope_death` (unless the actor already died) and
    /// reports to the directory outside the lock.
    pub(crate) fn subscribe_out_of_scope(
        &self,
        actor_id: ActorId,
        num_restarts_due_to_lineage_reconstruction: u64,
    ) {
        let handle_object = ObjectId::for_actor_handle(actor_id);
        let subscribed = self
            .shared
            .reference_counter
            .add_object_out_of_scope_or_freed_callback(
                handle_object,
                self.out_of_scope_callback(actor_id, num_restarts_due_to_lineage_reconstruction),
            );
        if !subscribed {
            tracing::debug!(actor_id = %actor_id, "actor handle already out of scope");
            let callback =
                self.out_of_scope_callback(actor_id, num_restarts_due_to_lineage_reconstruction);
            callback(handle_object);
        }
    }

    fn out_of_scope_callback(
        &self,
        actor_id: ActorId,
        num_restarts_due_to_lineage_reconstruction: u64,
    ) -> Box<dyn FnOnce(ObjectId) + Send + 'static> {
        let submitter = self.clone();
        Box::new(move |_object_id| {
            {
                let mut state = submitter.state();
                if let Some(queue) = state.client_queues.get_mut(&actor_id) {
                    if queue.state != ActorLifecycleState::Dead {
                        queue.pending_out_of_scope_death = true;
                    }
                }
            }
            submitter.shared.actor_creator.report_actor_out_of_scope(
                actor_id,
                num_restarts_due_to_lineage_reconstruction,
                Box::new(move |status| {
                    if !status.is_ok() {
                        tracing::error!(
                            actor_id = %actor_id,
                            %status,
                            "failed to report actor out of scope; the actor will not be killed"
                        );
                    }
                }),
            );
        })
    }

    /// Evict the actor's transport client from the pool.
    pub(crate) fn disconnect_rpc_client_locked(&self, queue: &mut ClientQueue) {
        queue.rpc_client = None;
        if let Some(worker_id) = queue.worker_id.take() {
            self.shared.client_pool.disconnect(&worker_id);
        }
    }

    /// Invoke detached inflight callbacks with a synthetic transport
    /// failure, as if the network had severed, so the normal reply path
    /// retries or parks each task. Must be called with the lock released.
    pub(crate) fn fail_inflight_tasks_on_restart(&self, callbacks: Vec<PushTaskCallback>) {
        if callbacks.is_empty() {
            return;
        }
        self.shared
            .metrics
            .lock()
            .record_inflight_failed(callbacks.len());
        for callback in callbacks {
            callback(
                RpcStatus::io_error("the actor was restarted"),
                PushTaskReply::default(),
            );
        }
    }
}
