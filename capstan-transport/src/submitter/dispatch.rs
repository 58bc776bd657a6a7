//! Dispatch and reply handling: draining ready tasks into the client,
//! tracking inflight replies, and sweeping the death-info grace period.

use std::sync::Arc;

use capstan_core::{
    ActorId, ErrorInfo, RpcStatus, TaskAttempt, TaskErrorKind, TaskSpec, WorkerAddress,
};

use crate::interfaces::{PushTaskCallback, WorkerClient};
use crate::wire::{PushTaskReply, PushTaskRequest};

use super::{ActorTaskSubmitter, SubmitterState};
use super::client_queue::{ActorLifecycleState, ParkedTask};

/// Work extracted from the registry under the lock, to be performed after
/// releasing it.
pub(crate) enum DispatchAction {
    /// Push one task to the actor's worker.
    Push {
        client: Arc<dyn WorkerClient>,
        request: PushTaskRequest,
        skip_queue: bool,
        spec: TaskSpec,
        addr: WorkerAddress,
    },
    /// Fail one task through a fake "restarting" reply on the executor.
    ForceFail { spec: TaskSpec },
    /// Emit the excess-queueing warning.
    Warn { actor_id: ActorId, num_queued: usize },
}

impl ActorTaskSubmitter {
    /// Pop every dispatchable task and turn it into a [`DispatchAction`].
    ///
    /// Holds no interest in absent actors: lifecycle events may race the
    /// caller, so a missing queue simply yields nothing.
    pub(crate) fn drain_dispatchable_locked(
        &self,
        state: &mut SubmitterState,
        actor_id: ActorId,
    ) -> Vec<DispatchAction> {
        let mut actions = Vec::new();
        let Some(queue) = state.client_queues.get_mut(&actor_id) else {
            return actions;
        };

        if queue.pending_out_of_scope_death {
            // Hold dispatch until the authoritative death message decides
            // between failing the queue and restarting the actor.
            return actions;
        }

        let Some(client) = queue.rpc_client.clone() else {
            if queue.state == ActorLifecycleState::Restarting && queue.fail_if_actor_unreachable {
                // Configured to fail fast instead of waiting out the
                // restart; route each task through the normal reply path.
                while let Some((spec, _)) = queue.submit_queue.pop_next_task_to_send() {
                    actions.push(DispatchAction::ForceFail { spec });
                }
            }
            return actions;
        };
        let Some(worker_id) = queue.worker_id else {
            debug_assert!(false, "connected queue must have a worker id");
            return actions;
        };

        let addr = client.addr();
        while let Some((spec, skip_queue)) = queue.submit_queue.pop_next_task_to_send() {
            let task_attempt = spec.task_attempt();
            let num_queued = queue.inflight_task_callbacks.len();
            tracing::debug!(
                task_id = %spec.task_id,
                actor_id = %actor_id,
                seq = spec.sequence_number,
                num_queued,
                "pushing task to actor"
            );
            if num_queued >= state.next_queueing_warn_threshold {
                actions.push(DispatchAction::Warn {
                    actor_id,
                    num_queued,
                });
                state.next_queueing_warn_threshold *= 2;
            }

            let request = PushTaskRequest {
                task_spec: spec.clone(),
                intended_worker_id: worker_id,
                sequence_number: spec.sequence_number,
            };

            let submitter = self.clone();
            let reply_spec = spec.clone();
            let reply_addr = addr.clone();
            queue.inflight_task_callbacks.insert(
                task_attempt,
                Box::new(move |status, reply| {
                    submitter.handle_push_task_reply(status, reply, reply_addr, reply_spec);
                }),
            );

            actions.push(DispatchAction::Push {
                client: client.clone(),
                request,
                skip_queue,
                spec,
                addr: addr.clone(),
            });
        }
        actions
    }

    /// Perform extracted dispatch work. Must be called with the lock
    /// released: this path calls the task manager and the worker client.
    pub(crate) fn run_dispatch_actions(&self, actions: Vec<DispatchAction>) {
        for action in actions {
            match action {
                DispatchAction::Push {
                    client,
                    request,
                    skip_queue,
                    spec,
                    addr,
                } => {
                    self.shared.task_manager.mark_task_waiting_for_execution(
                        spec.task_id,
                        addr.node_id,
                        addr.worker_id,
                    );
                    self.shared.metrics.lock().record_task_pushed();
                    let wrapper = self.reply_wrapper(spec.actor_id, spec.task_attempt());
                    client.push_actor_task(request, skip_queue, wrapper);
                }
                DispatchAction::ForceFail { spec } => {
                    let submitter = self.clone();
                    self.shared.executor.post(
                        "ActorTaskSubmitter::send_pending_tasks_force_fail",
                        Box::new(move || {
                            submitter.handle_push_task_reply(
                                RpcStatus::io_error("the actor is restarting"),
                                PushTaskReply::default(),
                                WorkerAddress::default(),
                                spec,
                            );
                        }),
                    );
                }
                DispatchAction::Warn {
                    actor_id,
                    num_queued,
                } => (self.shared.warn_excess_queueing)(actor_id, num_queued),
            }
        }
    }

    /// The callback handed to the worker client for one push.
    ///
    /// Consumes the inflight entry on first delivery; a reply whose entry
    /// is gone is a duplicate or arrived after a reconnect already
    /// synthesized its failure, and is discarded.
    fn reply_wrapper(&self, actor_id: ActorId, task_attempt: TaskAttempt) -> PushTaskCallback {
        let submitter = self.clone();
        Box::new(move |status, reply| {
            let callback = {
                let mut state = submitter.state();
                let Some(queue) = state.client_queues.get_mut(&actor_id) else {
                    return;
                };
                queue.inflight_task_callbacks.remove(&task_attempt)
            };
            match callback {
                Some(callback) => callback(status, reply),
                None => {
                    tracing::debug!(
                        task_id = %task_attempt.task_id,
                        attempt = task_attempt.attempt_number,
                        "task already marked failed; ignoring reply"
                    );
                    submitter.shared.metrics.lock().record_duplicate_reply();
                }
            }
        })
    }

    /// Classify one push reply and route the task onward.
    pub(crate) fn handle_push_task_reply(
        &self,
        status: RpcStatus,
        reply: PushTaskReply,
        addr: WorkerAddress,
        task_spec: TaskSpec,
    ) {
        let task_id = task_spec.task_id;
        let actor_id = task_spec.actor_id;

        // A generator registered for resubmission consumes its
        // registration on the next reply, and resubmits if that reply is
        // valid.
        let resubmit_generator = {
            let mut state = self.state();
            let registered = state.generators_to_resubmit.remove(&task_id);
            let resubmit = registered && status.is_ok();
            if resubmit {
                if let Some(queue) = state.client_queues.get_mut(&actor_id) {
                    queue.cur_pending_calls -= 1;
                }
            }
            resubmit
        };
        if resubmit_generator {
            self.shared
                .task_manager
                .mark_generator_failed_and_resubmit(task_id);
            return;
        }

        let is_retryable_exception = status.is_ok() && reply.is_retryable_error;

        if status.is_ok() && !is_retryable_exception {
            // The worker replied; the result may still carry an
            // application error, which the task manager records.
            let is_application_error = reply.is_application_error;
            self.shared
                .task_manager
                .complete_pending_task(task_id, reply, addr, is_application_error);
            self.shared.metrics.lock().record_task_completed();
        } else if status.is_scheduling_cancelled() {
            tracing::debug!(task_id = %task_id, actor_id = %actor_id, "push cancelled by the scheduler");
            let error_info = ErrorInfo::new(
                TaskErrorKind::TaskCancelled,
                format!(
                    "task {} was cancelled from actor {} before it executed",
                    task_id, actor_id
                ),
            );
            self.shared.task_manager.fail_pending_task(
                task_id,
                TaskErrorKind::TaskCancelled,
                None,
                Some(error_info),
            );
            self.shared.metrics.lock().record_task_failed();
        } else {
            let mut is_actor_dead = false;
            let mut fail_immediately = false;
            let error_info = if status.is_ok() {
                debug_assert!(is_retryable_exception);
                ErrorInfo::new(
                    TaskErrorKind::TaskExecutionException,
                    reply.task_execution_error.clone(),
                )
            } else {
                // Transport failure. If the actor is known dead the
                // failure is authoritative; otherwise it is provisional.
                let state = self.state();
                match state.client_queues.get(&actor_id) {
                    Some(queue) if queue.state == ActorLifecycleState::Dead => {
                        is_actor_dead = true;
                        let info = ErrorInfo::from_death_cause(actor_id, queue.death_cause.as_ref());
                        fail_immediately = info.fail_immediately();
                        info
                    }
                    _ => ErrorInfo::new(
                        TaskErrorKind::ActorUnavailable,
                        format!("the actor is temporarily unavailable: {}", status),
                    ),
                }
            };

            // A retry attempt may still be resolving dependencies.
            self.shared.resolver.cancel_resolution(task_id);

            let will_retry = self.shared.task_manager.fail_or_retry_pending_task(
                task_id,
                error_info.kind,
                Some(status.clone()),
                Some(error_info.clone()),
                is_actor_dead,
                fail_immediately,
            );
            if is_actor_dead && !will_retry {
                self.shared.metrics.lock().record_task_failed();
            }

            if !is_actor_dead && !will_retry {
                if status.is_ok() {
                    // Out of retries on a user exception: complete with
                    // the failure the worker reported.
                    let is_application_error = reply.is_application_error;
                    self.shared.task_manager.complete_pending_task(
                        task_id,
                        reply,
                        addr,
                        is_application_error,
                    );
                    self.shared.metrics.lock().record_task_completed();
                } else if !self.shared.config.wait_for_death_info_timeout.is_zero() {
                    // The actor still looks alive; park the task and wait
                    // a bounded time for the authoritative death reason.
                    let deadline =
                        self.shared.clock.now() + self.shared.config.wait_for_death_info_timeout;
                    {
                        let mut state = self.state();
                        if let Some(queue) = state.client_queues.get_mut(&actor_id) {
                            queue.wait_for_death_info_tasks.push_back(ParkedTask {
                                deadline,
                                spec: task_spec.clone(),
                                status: status.clone(),
                                error_info,
                                actor_preempted: false,
                            });
                            tracing::info!(
                                task_id = %task_id,
                                wait_queue_size = queue.wait_for_death_info_tasks.len(),
                                "push failed with a transport error; task parked awaiting death info"
                            );
                        }
                    }
                    self.shared.metrics.lock().record_task_parked();
                } else {
                    self.shared.task_manager.fail_pending_task(
                        task_id,
                        error_info.kind,
                        Some(status.clone()),
                        Some(error_info),
                    );
                    self.shared.metrics.lock().record_task_failed();
                }
            }
        }

        let mut state = self.state();
        if let Some(queue) = state.client_queues.get_mut(&actor_id) {
            queue.cur_pending_calls -= 1;
        }
    }

    /// Sweep the grace-period queues, failing every parked task whose
    /// deadline has passed.
    ///
    /// Invoked periodically from the executor; the cadence is the
    /// caller's choice. Entries are enqueued in deadline order, so each
    /// walk stops at the first unexpired entry.
    pub fn check_timeout_tasks(&self) {
        let now = self.shared.clock.now();
        let mut expired = Vec::new();
        {
            let mut state = self.state();
            for queue in state.client_queues.values_mut() {
                loop {
                    match queue.wait_for_death_info_tasks.front() {
                        Some(front) if front.deadline < now => {}
                        _ => break,
                    }
                    if let Some(mut task) = queue.wait_for_death_info_tasks.pop_front() {
                        // Preempted actors are certainly dead even if the
                        // death notification never arrives.
                        task.actor_preempted = queue.preempted;
                        expired.push(task);
                    }
                }
            }
        }
        for task in expired {
            self.fail_parked_task(task);
        }
    }

    fn fail_parked_task(&self, task: ParkedTask) {
        let error_info = if task.actor_preempted {
            ErrorInfo::preempted(task.spec.actor_id)
        } else {
            task.error_info
        };
        self.shared.task_manager.fail_pending_task(
            task.spec.task_id,
            error_info.kind,
            Some(task.status),
            Some(error_info),
        );
        self.shared.metrics.lock().record_task_failed();
    }
}
