//! Mock collaborators and a test harness for driving the submitter
//! deterministically: an inline executor, a manual clock, and recording
//! mocks for every injected interface.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use capstan_core::{
    ActorId, Callback, CallbackExecutor, Clock, ErrorInfo, NodeId, ObjectId, RpcStatus,
    SubmitterConfig, TaskErrorKind, TaskId, TaskKind, TaskSpec, Uid, WorkerAddress, WorkerId,
};
use capstan_transport::{
    ActorCreator, ActorTaskSubmitter, CancelTaskCallback, CancelTaskReply, CancelTaskRequest,
    CreateActorCallback, DependencyResolver, ExcessQueueingWarning, PushTaskCallback,
    PushTaskReply, PushTaskRequest, ReferenceCounter, StatusCallback, TaskManager, WorkerClient,
    WorkerClientPool,
};

// =============================================================================
// Identities and specs
// =============================================================================

pub fn actor_id(n: u64) -> ActorId {
    ActorId::new(Uid::new(0xAC, n))
}

pub fn caller_worker_id() -> WorkerId {
    WorkerId::new(Uid::new(0xCA, 1))
}

pub fn task_spec(actor: ActorId, seq: u64) -> TaskSpec {
    TaskSpec {
        task_id: TaskId::new(Uid::new(0x7A, seq + 1)),
        actor_id: actor,
        attempt_number: 0,
        sequence_number: seq,
        caller_worker_id: caller_worker_id(),
        method: "run".to_string(),
        dependencies: vec![ObjectId::new(Uid::new(0x0B, seq))],
        kind: TaskKind::ActorCall,
    }
}

pub fn creation_spec(actor: ActorId) -> TaskSpec {
    TaskSpec {
        task_id: TaskId::new(Uid::new(0xC0, 1)),
        actor_id: actor,
        attempt_number: 0,
        sequence_number: 0,
        caller_worker_id: caller_worker_id(),
        method: "__init__".to_string(),
        dependencies: vec![],
        kind: TaskKind::ActorCreation,
    }
}

pub fn worker_address(port: u16, worker: u64) -> WorkerAddress {
    WorkerAddress::new(
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        port,
        WorkerId::new(Uid::new(0xEE, worker)),
        NodeId::new(Uid::new(0x0D, 1)),
    )
}

// =============================================================================
// Clock and executor
// =============================================================================

/// Clock advanced by hand.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}

/// Executor that runs posted callbacks inline and collects delayed ones
/// for the test to release.
#[derive(Clone, Default)]
pub struct InlineExecutor {
    delayed: Arc<Mutex<Vec<(Duration, Callback)>>>,
}

impl InlineExecutor {
    /// Delays of the callbacks currently waiting.
    pub fn pending_delays(&self) -> Vec<Duration> {
        self.delayed.lock().iter().map(|(delay, _)| *delay).collect()
    }

    /// Run every delayed callback, returning how many ran.
    pub fn run_delayed(&self) -> usize {
        let drained: Vec<_> = self.delayed.lock().drain(..).collect();
        let count = drained.len();
        for (_, callback) in drained {
            callback();
        }
        count
    }
}

impl CallbackExecutor for InlineExecutor {
    fn post(&self, _tag: &'static str, callback: Callback) {
        callback();
    }

    fn execute_after(&self, delay: Duration, callback: Callback) {
        self.delayed.lock().push((delay, callback));
    }
}

// =============================================================================
// Task manager
// =============================================================================

/// Everything the submitter told the task manager, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskManagerEvent {
    DependenciesResolved(TaskId),
    Canceled(TaskId),
    WaitingForExecution(TaskId, NodeId, WorkerId),
    Completed {
        task_id: TaskId,
        is_application_error: bool,
    },
    Failed {
        task_id: TaskId,
        kind: TaskErrorKind,
        error_info: Option<ErrorInfo>,
    },
    FailOrRetry {
        task_id: TaskId,
        kind: TaskErrorKind,
        error_info: Option<ErrorInfo>,
        mark_task_object_failed: bool,
        fail_immediately: bool,
        retried: bool,
    },
    GeneratorResubmit(TaskId),
}

#[derive(Default)]
struct TaskManagerInner {
    events: Vec<TaskManagerEvent>,
    will_retry: bool,
    finished: HashSet<TaskId>,
    specs: HashMap<TaskId, TaskSpec>,
}

/// Recording task manager; optionally re-enters the submitter on every
/// call to prove no lock is held across collaborator calls.
#[derive(Default)]
pub struct MockTaskManager {
    inner: Mutex<TaskManagerInner>,
    reentry_probe: Mutex<Option<(ActorTaskSubmitter, ActorId)>>,
    probe_calls: Mutex<usize>,
}

impl MockTaskManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_will_retry(&self, will_retry: bool) {
        self.inner.lock().will_retry = will_retry;
    }

    pub fn set_finished(&self, task_id: TaskId) {
        self.inner.lock().finished.insert(task_id);
    }

    pub fn insert_task_spec(&self, spec: TaskSpec) {
        self.inner.lock().specs.insert(spec.task_id, spec);
    }

    pub fn remove_task_spec(&self, task_id: TaskId) {
        self.inner.lock().specs.remove(&task_id);
    }

    /// Re-enter the submitter on every collaborator call. If the submitter
    /// invoked us while holding its registry lock, the probe deadlocks and
    /// the test hangs instead of passing.
    pub fn enable_reentry_probe(&self, submitter: ActorTaskSubmitter, actor: ActorId) {
        *self.reentry_probe.lock() = Some((submitter, actor));
    }

    pub fn probe_calls(&self) -> usize {
        *self.probe_calls.lock()
    }

    pub fn events(&self) -> Vec<TaskManagerEvent> {
        self.inner.lock().events.clone()
    }

    pub fn completed_tasks(&self) -> Vec<TaskId> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TaskManagerEvent::Completed { task_id, .. } => Some(task_id),
                _ => None,
            })
            .collect()
    }

    pub fn failed_events(&self) -> Vec<TaskManagerEvent> {
        self.events()
            .into_iter()
            .filter(|event| {
                matches!(
                    event,
                    TaskManagerEvent::Failed { .. } | TaskManagerEvent::FailOrRetry { .. }
                )
            })
            .collect()
    }

    fn record(&self, event: TaskManagerEvent) {
        self.inner.lock().events.push(event);
        let probe = self.reentry_probe.lock();
        if let Some((submitter, actor)) = probe.as_ref() {
            // Deadlocks here mean the submitter called us under its lock.
            let _ = submitter.actor_exists(*actor);
            *self.probe_calls.lock() += 1;
        }
    }
}

impl TaskManager for MockTaskManager {
    fn mark_dependencies_resolved(&self, task_id: TaskId) {
        self.record(TaskManagerEvent::DependenciesResolved(task_id));
    }

    fn mark_task_canceled(&self, task_id: TaskId) {
        self.record(TaskManagerEvent::Canceled(task_id));
    }

    fn mark_task_waiting_for_execution(
        &self,
        task_id: TaskId,
        node_id: NodeId,
        worker_id: WorkerId,
    ) {
        self.record(TaskManagerEvent::WaitingForExecution(
            task_id, node_id, worker_id,
        ));
    }

    fn complete_pending_task(
        &self,
        task_id: TaskId,
        _reply: PushTaskReply,
        _worker_address: WorkerAddress,
        is_application_error: bool,
    ) {
        self.record(TaskManagerEvent::Completed {
            task_id,
            is_application_error,
        });
    }

    fn fail_pending_task(
        &self,
        task_id: TaskId,
        error_kind: TaskErrorKind,
        _status: Option<RpcStatus>,
        error_info: Option<ErrorInfo>,
    ) {
        self.record(TaskManagerEvent::Failed {
            task_id,
            kind: error_kind,
            error_info,
        });
    }

    fn fail_or_retry_pending_task(
        &self,
        task_id: TaskId,
        error_kind: TaskErrorKind,
        _status: Option<RpcStatus>,
        error_info: Option<ErrorInfo>,
        mark_task_object_failed: bool,
        fail_immediately: bool,
    ) -> bool {
        let retried = self.inner.lock().will_retry;
        self.record(TaskManagerEvent::FailOrRetry {
            task_id,
            kind: error_kind,
            error_info,
            mark_task_object_failed,
            fail_immediately,
            retried,
        });
        retried
    }

    fn is_task_pending(&self, task_id: TaskId) -> bool {
        !self.inner.lock().finished.contains(&task_id)
    }

    fn task_spec(&self, task_id: TaskId) -> Option<TaskSpec> {
        self.inner.lock().specs.get(&task_id).cloned()
    }

    fn mark_generator_failed_and_resubmit(&self, task_id: TaskId) {
        self.record(TaskManagerEvent::GeneratorResubmit(task_id));
    }
}

// =============================================================================
// Dependency resolver
// =============================================================================

#[derive(Default)]
struct ResolverInner {
    pending: HashMap<TaskId, StatusCallback>,
    canceled: Vec<TaskId>,
}

/// Resolver that holds callbacks until the test releases them.
#[derive(Default)]
pub struct MockResolver {
    inner: Mutex<ResolverInner>,
}

impl MockResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Complete resolution for a task.
    pub fn resolve(&self, task_id: TaskId, status: RpcStatus) {
        let callback = self.inner.lock().pending.remove(&task_id);
        let callback = callback.unwrap_or_else(|| panic!("no pending resolution for {task_id}"));
        callback(status);
    }

    pub fn has_pending(&self, task_id: TaskId) -> bool {
        self.inner.lock().pending.contains_key(&task_id)
    }

    pub fn canceled(&self) -> Vec<TaskId> {
        self.inner.lock().canceled.clone()
    }
}

impl DependencyResolver for MockResolver {
    fn resolve_dependencies(&self, task_spec: TaskSpec, callback: StatusCallback) {
        self.inner.lock().pending.insert(task_spec.task_id, callback);
    }

    fn cancel_resolution(&self, task_id: TaskId) {
        let mut inner = self.inner.lock();
        inner.pending.remove(&task_id);
        inner.canceled.push(task_id);
    }
}

// =============================================================================
// Actor creator
// =============================================================================

#[derive(Default)]
struct CreatorInner {
    create_requests: Vec<(TaskSpec, CreateActorCallback)>,
    restart_requests: Vec<(ActorId, u64, StatusCallback)>,
    out_of_scope_reports: Vec<(ActorId, u64)>,
}

/// Recording actor creator. Out-of-scope reports acknowledge
/// immediately; create and restart callbacks wait for the test.
#[derive(Default)]
pub struct MockActorCreator {
    inner: Mutex<CreatorInner>,
}

impl MockActorCreator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn num_create_requests(&self) -> usize {
        self.inner.lock().create_requests.len()
    }

    /// Pop the oldest create request and answer it.
    pub fn reply_create(&self, status: RpcStatus, reply: capstan_transport::CreateActorReply) {
        let (_, callback) = {
            let mut inner = self.inner.lock();
            assert!(!inner.create_requests.is_empty(), "no create request");
            inner.create_requests.remove(0)
        };
        callback(status, reply);
    }

    pub fn restart_requests(&self) -> Vec<(ActorId, u64)> {
        self.inner
            .lock()
            .restart_requests
            .iter()
            .map(|(actor, n, _)| (*actor, *n))
            .collect()
    }

    /// Pop the oldest restart request and answer it.
    pub fn reply_restart(&self, status: RpcStatus) {
        let (_, _, callback) = {
            let mut inner = self.inner.lock();
            assert!(!inner.restart_requests.is_empty(), "no restart request");
            inner.restart_requests.remove(0)
        };
        callback(status);
    }

    pub fn out_of_scope_reports(&self) -> Vec<(ActorId, u64)> {
        self.inner.lock().out_of_scope_reports.clone()
    }
}

impl ActorCreator for MockActorCreator {
    fn create_actor(&self, task_spec: TaskSpec, callback: CreateActorCallback) {
        self.inner.lock().create_requests.push((task_spec, callback));
    }

    fn restart_actor_for_lineage_reconstruction(
        &self,
        actor_id: ActorId,
        num_restarts_due_to_lineage_reconstruction: u64,
        callback: StatusCallback,
    ) {
        self.inner.lock().restart_requests.push((
            actor_id,
            num_restarts_due_to_lineage_reconstruction,
            callback,
        ));
    }

    fn report_actor_out_of_scope(
        &self,
        actor_id: ActorId,
        num_restarts_due_to_lineage_reconstruction: u64,
        callback: StatusCallback,
    ) {
        self.inner
            .lock()
            .out_of_scope_reports
            .push((actor_id, num_restarts_due_to_lineage_reconstruction));
        callback(RpcStatus::Ok);
    }
}

// =============================================================================
// Worker client and pool
// =============================================================================

struct PushRecord {
    request: PushTaskRequest,
    skip_queue: bool,
    callback: Option<PushTaskCallback>,
}

struct CancelRecord {
    request: CancelTaskRequest,
    callback: Option<CancelTaskCallback>,
}

/// Worker client that records pushes and cancels for the test to answer.
pub struct MockWorkerClient {
    addr: WorkerAddress,
    pushes: Mutex<Vec<PushRecord>>,
    cancels: Mutex<Vec<CancelRecord>>,
}

impl MockWorkerClient {
    pub fn new(addr: WorkerAddress) -> Arc<Self> {
        Arc::new(Self {
            addr,
            pushes: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
        })
    }

    pub fn num_pushes(&self) -> usize {
        self.pushes.lock().len()
    }

    /// Sequence numbers of every pushed request, in push order.
    pub fn pushed_seqs(&self) -> Vec<u64> {
        self.pushes
            .lock()
            .iter()
            .map(|record| record.request.sequence_number)
            .collect()
    }

    pub fn pushed_request(&self, index: usize) -> PushTaskRequest {
        self.pushes.lock()[index].request.clone()
    }

    pub fn pushed_skip_queue(&self, index: usize) -> bool {
        self.pushes.lock()[index].skip_queue
    }

    /// Answer the `index`-th push.
    pub fn reply_push(&self, index: usize, status: RpcStatus, reply: PushTaskReply) {
        let callback = self.pushes.lock()[index]
            .callback
            .take()
            .expect("push already answered");
        callback(status, reply);
    }

    pub fn num_cancels(&self) -> usize {
        self.cancels.lock().len()
    }

    pub fn cancel_request(&self, index: usize) -> CancelTaskRequest {
        self.cancels.lock()[index].request.clone()
    }

    /// Answer the `index`-th cancel request.
    pub fn reply_cancel(&self, index: usize, status: RpcStatus, reply: CancelTaskReply) {
        let callback = self.cancels.lock()[index]
            .callback
            .take()
            .expect("cancel already answered");
        callback(status, reply);
    }
}

impl WorkerClient for MockWorkerClient {
    fn push_actor_task(
        &self,
        request: PushTaskRequest,
        skip_queue: bool,
        callback: PushTaskCallback,
    ) {
        self.pushes.lock().push(PushRecord {
            request,
            skip_queue,
            callback: Some(callback),
        });
    }

    fn cancel_task(&self, request: CancelTaskRequest, callback: CancelTaskCallback) {
        self.cancels.lock().push(CancelRecord {
            request,
            callback: Some(callback),
        });
    }

    fn addr(&self) -> WorkerAddress {
        self.addr.clone()
    }
}

/// Pool creating one [`MockWorkerClient`] per socket.
#[derive(Default)]
pub struct MockClientPool {
    clients: Mutex<HashMap<String, Arc<MockWorkerClient>>>,
    disconnects: Mutex<Vec<WorkerId>>,
}

impl MockClientPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The client for an address, creating it if the submitter has not
    /// connected there yet.
    pub fn client_for(&self, address: &WorkerAddress) -> Arc<MockWorkerClient> {
        self.clients
            .lock()
            .entry(address.to_string())
            .or_insert_with(|| MockWorkerClient::new(address.clone()))
            .clone()
    }

    pub fn num_clients(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn disconnects(&self) -> Vec<WorkerId> {
        self.disconnects.lock().clone()
    }
}

impl WorkerClientPool for MockClientPool {
    fn get_or_connect(&self, address: &WorkerAddress) -> Arc<dyn WorkerClient> {
        self.client_for(address)
    }

    fn disconnect(&self, worker_id: &WorkerId) {
        self.disconnects.lock().push(*worker_id);
    }
}

// =============================================================================
// Reference counter
// =============================================================================

type OutOfScopeCallback = Box<dyn FnOnce(ObjectId) + Send + 'static>;

#[derive(Default)]
struct RefCounterInner {
    callbacks: HashMap<ObjectId, Vec<OutOfScopeCallback>>,
    already_out_of_scope: bool,
    subscribe_count: usize,
}

/// Reference counter that stores callbacks until the test fires them.
#[derive(Default)]
pub struct MockReferenceCounter {
    inner: Mutex<RefCounterInner>,
}

impl MockReferenceCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make subsequent subscriptions report "already out of scope".
    pub fn set_already_out_of_scope(&self) {
        self.inner.lock().already_out_of_scope = true;
    }

    pub fn subscribe_count(&self) -> usize {
        self.inner.lock().subscribe_count
    }

    /// Fire every stored callback for the object.
    pub fn fire(&self, object_id: ObjectId) {
        let callbacks = self
            .inner
            .lock()
            .callbacks
            .remove(&object_id)
            .unwrap_or_default();
        for callback in callbacks {
            callback(object_id);
        }
    }
}

impl ReferenceCounter for MockReferenceCounter {
    fn add_object_out_of_scope_or_freed_callback(
        &self,
        object_id: ObjectId,
        callback: OutOfScopeCallback,
    ) -> bool {
        let mut inner = self.inner.lock();
        inner.subscribe_count += 1;
        if inner.already_out_of_scope {
            return false;
        }
        inner.callbacks.entry(object_id).or_default().push(callback);
        true
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A submitter wired to a full set of mocks.
pub struct Harness {
    pub submitter: ActorTaskSubmitter,
    pub task_manager: Arc<MockTaskManager>,
    pub resolver: Arc<MockResolver>,
    pub creator: Arc<MockActorCreator>,
    pub pool: Arc<MockClientPool>,
    pub ref_counter: Arc<MockReferenceCounter>,
    pub executor: Arc<InlineExecutor>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(config: SubmitterConfig) -> Self {
        Self::build(config, None)
    }

    pub fn with_warning(config: SubmitterConfig, warning: ExcessQueueingWarning) -> Self {
        Self::build(config, Some(warning))
    }

    fn build(config: SubmitterConfig, warning: Option<ExcessQueueingWarning>) -> Self {
        let task_manager = MockTaskManager::new();
        let resolver = MockResolver::new();
        let creator = MockActorCreator::new();
        let pool = MockClientPool::new();
        let ref_counter = MockReferenceCounter::new();
        let executor = Arc::new(InlineExecutor::default());
        let clock = Arc::new(ManualClock::default());

        let submitter = match warning {
            Some(warning) => ActorTaskSubmitter::with_excess_queueing_warning(
                task_manager.clone(),
                resolver.clone(),
                creator.clone(),
                pool.clone(),
                ref_counter.clone(),
                executor.clone(),
                clock.clone(),
                config,
                warning,
            ),
            None => ActorTaskSubmitter::new(
                task_manager.clone(),
                resolver.clone(),
                creator.clone(),
                pool.clone(),
                ref_counter.clone(),
                executor.clone(),
                clock.clone(),
                config,
            ),
        };

        Self {
            submitter,
            task_manager,
            resolver,
            creator,
            pool,
            ref_counter,
            executor,
            clock,
        }
    }

    /// Register an actor with sensible defaults: in-order, unlimited
    /// admission, waiting out restarts.
    pub fn register(&self, actor: ActorId, owned: bool) {
        self.submitter
            .add_actor_queue_if_not_exists(actor, 0, false, false, owned);
    }

    /// Connect the actor and return the mock client serving it.
    pub fn connect(
        &self,
        actor: ActorId,
        address: &WorkerAddress,
        num_restarts: u64,
    ) -> Arc<MockWorkerClient> {
        self.submitter
            .connect_actor(actor, address.clone(), num_restarts)
            .expect("connect");
        self.pool.client_for(address)
    }

    /// Submit a task and immediately resolve its dependencies.
    pub fn submit_resolved(&self, spec: &TaskSpec) {
        self.submitter.submit_task(spec.clone()).expect("submit");
        self.resolver.resolve(spec.task_id, RpcStatus::Ok);
    }
}
