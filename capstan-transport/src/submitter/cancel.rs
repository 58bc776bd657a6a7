//! Cancellation and generator resubmission.

use std::time::Duration;

use capstan_core::{ErrorInfo, TaskErrorKind, TaskSpec};

use crate::error::{SubmitterError, SubmitterResult};
use crate::wire::CancelTaskRequest;

use super::ActorTaskSubmitter;
use super::client_queue::ActorLifecycleState;

impl ActorTaskSubmitter {
    /// Cancel a task, best-effort and asynchronous.
    ///
    /// A task still in the submit queue never reaches the wire: its
    /// dependency resolution is abandoned, its slot is marked cancelled so
    /// the dispatcher discards it, and it is failed with a cancellation
    /// error synchronously. A task already sent gets a cancel request to
    /// the executing worker, retried until the task finishes or the
    /// executor succeeds. Force-kill is never used for actor tasks.
    pub fn cancel_task(&self, task_spec: TaskSpec, recursive: bool) -> SubmitterResult<()> {
        let actor_id = task_spec.actor_id;
        let task_id = task_spec.task_id;
        let send_pos = task_spec.sequence_number;
        tracing::info!(
            task_id = %task_id,
            actor_id = %actor_id,
            recursive,
            "cancelling actor task"
        );

        // A task is in one of: resolving dependencies, queued, sent, or
        // finished.
        self.shared.task_manager.mark_task_canceled(task_id);
        if !self.shared.task_manager.is_task_pending(task_id) {
            tracing::debug!(task_id = %task_id, "task already finished or cancelled");
            return Ok(());
        }

        let task_queued;
        let mut cancel_resolution = false;
        {
            let mut state = self.state();
            // Cancellation dominates a pending generator resubmission.
            state.generators_to_resubmit.remove(&task_id);

            let queue = state
                .client_queues
                .get_mut(&actor_id)
                .ok_or(SubmitterError::UnknownActor { actor_id })?;
            if queue.state == ActorLifecycleState::Dead {
                tracing::debug!(task_id = %task_id, "actor already dead; ignoring cancel");
                return Ok(());
            }
            task_queued = queue.submit_queue.contains(send_pos);
            if task_queued {
                cancel_resolution = !queue.submit_queue.dependencies_resolved(send_pos);
                queue.submit_queue.mark_task_canceled(send_pos);
            }
        }

        if task_queued {
            if cancel_resolution {
                tracing::debug!(task_id = %task_id, "abandoning dependency resolution of cancelled task");
                self.shared.resolver.cancel_resolution(task_id);
            }
            let error_info = ErrorInfo::new(
                TaskErrorKind::TaskCancelled,
                format!(
                    "task {} was cancelled from actor {} before it executed",
                    task_id, actor_id
                ),
            );
            let retried = self.shared.task_manager.fail_or_retry_pending_task(
                task_id,
                TaskErrorKind::TaskCancelled,
                None,
                Some(error_info),
                true,
                false,
            );
            if !retried {
                self.shared.metrics.lock().record_task_failed();
            }
            return Ok(());
        }

        // Already sent and not finished. A cancel request is not ordered
        // with respect to the push, so keep retrying until the task
        // finishes or the executor reports success.
        let client = {
            let state = self.state();
            let queue = state
                .client_queues
                .get(&actor_id)
                .ok_or(SubmitterError::UnknownActor { actor_id })?;
            queue.rpc_client.clone()
        };
        let Some(client) = client else {
            // No client means the actor is not created yet; try again
            // shortly.
            self.retry_cancel_task(
                task_spec,
                recursive,
                self.shared.config.cancel_retry_when_unconnected,
            );
            return Ok(());
        };

        tracing::debug!(task_id = %task_id, "task already sent; sending a cancel request");
        let request = CancelTaskRequest {
            intended_task_id: task_id,
            caller_worker_id: task_spec.caller_worker_id,
            force_kill: false,
            recursive,
        };
        self.shared.metrics.lock().record_cancel_rpc();
        let submitter = self.clone();
        client.cancel_task(
            request,
            Box::new(move |status, reply| {
                tracing::debug!(task_id = %task_id, %status, "cancel request reply received");
                if submitter.shared.task_manager.task_spec(task_id).is_none() {
                    tracing::debug!(task_id = %task_id, "task finished; stopping cancel retries");
                    return;
                }
                if !reply.attempt_succeeded {
                    submitter.retry_cancel_task(
                        task_spec,
                        recursive,
                        submitter.shared.config.cancel_retry_when_failed,
                    );
                }
            }),
        );
        Ok(())
    }

    fn retry_cancel_task(&self, task_spec: TaskSpec, recursive: bool, delay: Duration) {
        tracing::debug!(
            task_id = %task_spec.task_id,
            delay_ms = delay.as_millis() as u64,
            "cancellation will be retried"
        );
        let submitter = self.clone();
        self.shared.executor.execute_after(
            delay,
            Box::new(move || {
                let _ = submitter.cancel_task(task_spec, recursive);
            }),
        );
    }

    /// Register a streaming-generator task for resubmission.
    ///
    /// The next successful reply to the task consumes the registration and
    /// asks the task manager to mark the generator failed and resubmit it.
    /// Cancellation dominates: [`Self::cancel_task`] removes the
    /// registration, so a generator cancelled after queueing is never
    /// resubmitted.
    pub fn queue_generator_for_resubmit(&self, task_spec: &TaskSpec) -> bool {
        self.state().generators_to_resubmit.insert(task_spec.task_id);
        true
    }
}
