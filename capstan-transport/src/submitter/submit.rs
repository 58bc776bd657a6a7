//! Task submission: actor calls and actor creation.

use capstan_core::{ActorDiedContext, ActorId, ErrorInfo, RpcStatus, TaskErrorKind, TaskId, TaskSpec};

use crate::error::{SubmitterError, SubmitterResult};
use crate::wire::{CreateActorReply, PushTaskReply};

use super::ActorTaskSubmitter;
use super::client_queue::ActorLifecycleState;
use super::lifecycle::DeferredAction;

impl ActorTaskSubmitter {
    /// Submit one actor call.
    ///
    /// The task is queued under its pre-assigned sequence number and its
    /// dependency resolution is requested on the executor; it dispatches
    /// once its dependencies resolve and the actor is connected, in the
    /// order its actor's submit-queue flavor defines. Submitting to a
    /// dead-but-restartable owned actor first initiates lineage
    /// reconstruction; submitting to any other dead actor fails the task
    /// with the stored death cause. Either way the outcome arrives through
    /// the task manager, never as an error here.
    pub fn submit_task(&self, task_spec: TaskSpec) -> SubmitterResult<()> {
        let task_id = task_spec.task_id;
        let actor_id = task_spec.actor_id;
        tracing::debug!(task_id = %task_id, actor_id = %actor_id, "submitting task");
        if !task_spec.is_actor_task() {
            return Err(SubmitterError::NotAnActorTask { task_id });
        }

        let mut task_queued = false;
        let mut restart_action: Option<DeferredAction> = None;
        {
            let mut state = self.state();
            let queue = state
                .client_queues
                .get_mut(&actor_id)
                .ok_or(SubmitterError::UnknownActor { actor_id })?;

            if queue.state == ActorLifecycleState::Dead
                && queue.is_restartable
                && queue.owned
            {
                restart_action = Some(self.prepare_restart_locked(queue, actor_id));
            }
            if queue.state != ActorLifecycleState::Dead {
                // The send order is fixed before dependency resolution,
                // which may complete out of order; otherwise backpressure
                // against an in-order actor could deadlock. The receiving
                // worker executes by this sequence number.
                queue
                    .submit_queue
                    .emplace(task_spec.sequence_number, task_spec.clone());
                queue.cur_pending_calls += 1;
                task_queued = true;
            }
        }
        if let Some(restart) = restart_action {
            restart();
        }

        if task_queued {
            self.shared.metrics.lock().record_task_queued();
            // Resolution is requested off the submission stack because
            // the resolver may invoke the callback on the caller's stack.
            let submitter = self.clone();
            self.shared.executor.post(
                "ActorTaskSubmitter::submit_task",
                Box::new(move || {
                    let send_pos = task_spec.sequence_number;
                    let on_resolved = submitter.clone();
                    submitter.shared.resolver.resolve_dependencies(
                        task_spec,
                        Box::new(move |status| {
                            on_resolved.on_dependencies_resolved(
                                actor_id, task_id, send_pos, status,
                            );
                        }),
                    );
                }),
            );
        } else {
            // The actor is dead and cannot be restarted by this worker.
            self.shared.task_manager.mark_task_canceled(task_id);
            let error_info = {
                let state = self.state();
                let death_cause = state
                    .client_queues
                    .get(&actor_id)
                    .and_then(|queue| queue.death_cause.clone());
                ErrorInfo::from_death_cause(actor_id, death_cause.as_ref())
            };
            let status = RpcStatus::io_error("cancelling task of dead actor");
            let fail_immediately = error_info.fail_immediately();
            let retried = self.shared.task_manager.fail_or_retry_pending_task(
                task_id,
                error_info.kind,
                Some(status),
                Some(error_info),
                true,
                fail_immediately,
            );
            if !retried {
                self.shared.metrics.lock().record_task_failed();
            }
        }

        Ok(())
    }

    /// Continuation of [`Self::submit_task`] once the resolver reports.
    fn on_dependencies_resolved(
        &self,
        actor_id: ActorId,
        task_id: TaskId,
        send_pos: u64,
        status: RpcStatus,
    ) {
        self.shared.task_manager.mark_dependencies_resolved(task_id);

        let mut fail_task = false;
        let actions = {
            let mut state = self.state();
            let mut resolved = false;
            if let Some(queue) = state.client_queues.get_mut(&actor_id) {
                // Only dispatch if the task is still queued; it may have
                // been dequeued by a disconnection, a cancellation, or a
                // dead-actor clean-up since resolution was requested.
                if queue.submit_queue.contains(send_pos) {
                    if status.is_ok() {
                        queue.submit_queue.mark_dependency_resolved(send_pos);
                        resolved = true;
                    } else {
                        fail_task = true;
                        queue.submit_queue.mark_dependency_failed(send_pos);
                    }
                }
            }
            if resolved {
                self.drain_dispatchable_locked(&mut state, actor_id)
            } else {
                Vec::new()
            }
        };
        self.run_dispatch_actions(actions);

        if fail_task {
            tracing::warn!(task_id = %task_id, %status, "resolving task dependencies failed");
            let retried = self.shared.task_manager.fail_or_retry_pending_task(
                task_id,
                TaskErrorKind::DependencyResolutionFailed,
                Some(status),
                None,
                true,
                false,
            );
            if !retried {
                self.shared.metrics.lock().record_task_failed();
            }
        }
    }

    /// Submit an actor creation task.
    ///
    /// Creation dependencies are resolved first; the creation request then
    /// goes to the actor directory. The submitter keeps no queue for the
    /// creation RPC. Constructor failures are final here, since creation
    /// retries are the directory's responsibility, and transport errors
    /// and scheduling cancellations are likewise surfaced without retry.
    pub fn submit_actor_creation_task(&self, task_spec: TaskSpec) -> SubmitterResult<()> {
        let task_id = task_spec.task_id;
        let actor_id = task_spec.actor_id;
        if !task_spec.is_actor_creation_task() {
            return Err(SubmitterError::NotACreationTask { task_id });
        }
        tracing::debug!(actor_id = %actor_id, task_id = %task_id, "submitting actor creation task");

        let submitter = self.clone();
        self.shared.resolver.resolve_dependencies(
            task_spec.clone(),
            Box::new(move |status| {
                submitter.shared.task_manager.mark_dependencies_resolved(task_id);
                if !status.is_ok() {
                    tracing::warn!(
                        actor_id = %actor_id,
                        task_id = %task_id,
                        %status,
                        "resolving actor creation dependencies failed"
                    );
                    let retried = submitter.shared.task_manager.fail_or_retry_pending_task(
                        task_id,
                        TaskErrorKind::DependencyResolutionFailed,
                        Some(status),
                        None,
                        true,
                        false,
                    );
                    if !retried {
                        submitter.shared.metrics.lock().record_task_failed();
                    }
                    return;
                }
                tracing::debug!(actor_id = %actor_id, task_id = %task_id, "creating actor via the directory");
                let on_created = submitter.clone();
                submitter.shared.actor_creator.create_actor(
                    task_spec,
                    Box::new(move |status, reply| {
                        on_created.on_create_actor_reply(actor_id, task_id, status, reply);
                    }),
                );
            }),
        );
        Ok(())
    }

    /// Continuation of [`Self::submit_actor_creation_task`] once the
    /// directory replies.
    fn on_create_actor_reply(
        &self,
        actor_id: ActorId,
        task_id: TaskId,
        status: RpcStatus,
        reply: CreateActorReply,
    ) {
        if status.is_ok() || status.is_creation_task_error() {
            let mut push_reply = PushTaskReply::default();
            let is_application_error = status.is_creation_task_error();
            if is_application_error {
                // The constructor itself failed; this is not retried.
                tracing::info!(
                    actor_id = %actor_id,
                    task_id = %task_id,
                    "actor creation failed in the constructor and will not be retried"
                );
                push_reply.task_execution_error = status.to_string();
            } else {
                tracing::debug!(actor_id = %actor_id, task_id = %task_id, "created actor");
            }
            self.shared.task_manager.complete_pending_task(
                task_id,
                push_reply,
                reply.actor_address.unwrap_or_default(),
                is_application_error,
            );
            self.shared.metrics.lock().record_task_completed();
        } else {
            let mut error_info = None;
            if status.is_scheduling_cancelled() {
                tracing::debug!(actor_id = %actor_id, task_id = %task_id, "actor creation cancelled");
                self.shared.task_manager.mark_task_canceled(task_id);
                if let Some(cause) = reply.death_cause {
                    error_info = Some(ErrorInfo {
                        kind: TaskErrorKind::ActorCreationFailed,
                        message: cause.to_string(),
                        actor_died: Some(ActorDiedContext { actor_id, cause }),
                    });
                }
            } else {
                tracing::info!(
                    actor_id = %actor_id,
                    task_id = %task_id,
                    %status,
                    "failed to create actor"
                );
            }
            // Creation retries happen in the directory and transient
            // transport errors in its client; neither is retried here.
            self.shared.task_manager.fail_pending_task(
                task_id,
                TaskErrorKind::ActorCreationFailed,
                Some(status),
                error_info,
            );
            self.shared.metrics.lock().record_task_failed();
        }
    }
}
