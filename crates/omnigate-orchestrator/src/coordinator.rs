use crate::collaborator::metrics::{record_or_warn, TASKS_ENQUEUED_TOTAL, WORKFLOW_DURATION_MS};
use crate::collaborator::Collaborators;
use crate::concurrency::ConcurrencyLimiter;
use crate::config::OrchestratorConfig;
use crate::executor::{HandlerRegistry, TaskExecutor, TaskHandler};
use crate::handlers::{AiHandler, MetricsQueryHandler, SubWorkflowHandler, ToolHandler};
use crate::request::{build_tasks, TaskDefaults, WorkflowRequest};
use crate::scheduler::DependencyScheduler;
use crate::store::{InMemoryTaskStore, InMemoryWorkflowStore, TaskStore, WorkflowStore};
use crate::types::{
    Task, TaskId, TaskStatus, TaskType, Workflow, WorkflowId, WorkflowSnapshot, WorkflowStatus,
};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use omnigate_core::{OmnigateError, OmnigateResult};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Aggregated outcome of a completed workflow, keyed by task id.
pub type WorkflowResult = HashMap<TaskId, serde_json::Value>;

/// Persistence key of a workflow snapshot.
pub fn snapshot_key(workflow_id: &str) -> String {
    format!("workflow:{workflow_id}")
}

/// Builds workflows from requests and drives them to completion.
///
/// Execution proceeds in batches: ask the scheduler for the ready set, run
/// it concurrently, wait for every task in it, repeat. A task that fails
/// with no retry budget left fails the whole workflow.
pub struct WorkflowCoordinator {
    config: OrchestratorConfig,
    tasks: Arc<dyn TaskStore>,
    workflows: Arc<dyn WorkflowStore>,
    scheduler: DependencyScheduler,
    executor: TaskExecutor,
    limiter: Arc<ConcurrencyLimiter>,
    collaborators: Collaborators,
    cancellations: Mutex<HashMap<WorkflowId, CancellationToken>>,
    this: Weak<WorkflowCoordinator>,
}

/// Assembles a [`WorkflowCoordinator`] with optional custom stores and handlers.
pub struct CoordinatorBuilder {
    config: OrchestratorConfig,
    collaborators: Collaborators,
    tasks: Option<Arc<dyn TaskStore>>,
    workflows: Option<Arc<dyn WorkflowStore>>,
    handlers: Vec<(TaskType, Arc<dyn TaskHandler>)>,
}

impl CoordinatorBuilder {
    pub fn task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.tasks = Some(store);
        self
    }

    pub fn workflow_store(mut self, store: Arc<dyn WorkflowStore>) -> Self {
        self.workflows = Some(store);
        self
    }

    /// Replaces the built-in handler for `task_type`.
    pub fn handler(mut self, task_type: TaskType, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.push((task_type, handler));
        self
    }

    pub fn build(self) -> Arc<WorkflowCoordinator> {
        let CoordinatorBuilder {
            config,
            collaborators,
            tasks,
            workflows,
            handlers,
        } = self;
        let tasks: Arc<dyn TaskStore> =
            tasks.unwrap_or_else(|| Arc::new(InMemoryTaskStore::new()) as Arc<dyn TaskStore>);
        let workflows: Arc<dyn WorkflowStore> = workflows
            .unwrap_or_else(|| Arc::new(InMemoryWorkflowStore::new()) as Arc<dyn WorkflowStore>);

        Arc::new_cyclic(|weak| {
            let mut registry = HandlerRegistry::new();
            registry.register(
                TaskType::Ai,
                Arc::new(AiHandler::new(Arc::clone(&collaborators.ai))),
            );
            registry.register(
                TaskType::ToolInvocation,
                Arc::new(ToolHandler::new(Arc::clone(&collaborators.tools))),
            );
            registry.register(
                TaskType::SubWorkflow,
                Arc::new(SubWorkflowHandler::new(weak.clone())),
            );
            registry.register(
                TaskType::MetricsQuery,
                Arc::new(MetricsQueryHandler::new(Arc::clone(&collaborators.metrics))),
            );
            for (task_type, handler) in handlers {
                registry.register(task_type, handler);
            }

            let executor = TaskExecutor::new(
                Arc::clone(&tasks),
                Arc::new(registry),
                Arc::clone(&collaborators.metrics),
                config.default_task_timeout(),
            );

            WorkflowCoordinator {
                limiter: Arc::new(ConcurrencyLimiter::new(&config.concurrency)),
                config,
                tasks,
                workflows,
                scheduler: DependencyScheduler::new(),
                executor,
                collaborators,
                cancellations: Mutex::new(HashMap::new()),
                this: weak.clone(),
            }
        })
    }
}

impl WorkflowCoordinator {
    pub fn builder(config: OrchestratorConfig, collaborators: Collaborators) -> CoordinatorBuilder {
        CoordinatorBuilder {
            config,
            collaborators,
            tasks: None,
            workflows: None,
            handlers: Vec::new(),
        }
    }

    /// Coordinator over in-memory stores with the built-in handlers.
    pub fn new(config: OrchestratorConfig, collaborators: Collaborators) -> Arc<Self> {
        Self::builder(config, collaborators).build()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn task_store(&self) -> &Arc<dyn TaskStore> {
        &self.tasks
    }

    pub fn workflow_store(&self) -> &Arc<dyn WorkflowStore> {
        &self.workflows
    }

    pub fn limiter(&self) -> &Arc<ConcurrencyLimiter> {
        &self.limiter
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    // --- Workflow lifecycle ---

    /// Builds the full task graph for `request` and registers the workflow.
    ///
    /// Nothing is stored when the request is malformed.
    pub async fn create_workflow(&self, request: WorkflowRequest) -> OmnigateResult<Workflow> {
        let id = Uuid::new_v4().to_string();
        let tasks = build_tasks(
            &id,
            &request,
            TaskDefaults {
                max_retries: self.config.default_max_retries,
            },
        )?;

        let task_ids: Vec<TaskId> = tasks.iter().map(|t| t.id.clone()).collect();
        let task_count = tasks.len();
        for task in tasks {
            self.tasks.put(task);
        }
        let workflow = Workflow::new(id.clone(), task_ids);
        self.cancellations
            .lock()
            .insert(id.clone(), CancellationToken::new());
        self.workflows.put(workflow.clone());

        info!(workflow_id = %id, task_count, "Workflow created");
        record_or_warn(
            self.collaborators.metrics.as_ref(),
            TASKS_ENQUEUED_TOTAL,
            task_count as f64,
            &[],
        )
        .await;
        Ok(workflow)
    }

    /// Runs a pending workflow to a terminal status.
    ///
    /// Returns the result map on success, or the error that ended the
    /// workflow. The error is also stored on the workflow record.
    ///
    /// The run itself is a spawned task, so dropping the returned future
    /// does not abandon the workflow: it still reaches a terminal status.
    pub async fn execute_workflow(&self, id: &str) -> OmnigateResult<WorkflowResult> {
        let this = self.this.upgrade().ok_or_else(|| {
            OmnigateError::TaskExecution("coordinator is shutting down".into())
        })?;
        let started = self.workflows.update(id, &mut |w| {
            if w.status != WorkflowStatus::Pending {
                return false;
            }
            w.status = WorkflowStatus::Running;
            w.started_at = Some(Utc::now());
            true
        })?;
        let Some(workflow) = started else {
            let current = self.workflows.get(id)?;
            return Err(match current.status {
                WorkflowStatus::Cancelled => {
                    OmnigateError::Cancelled(format!("workflow '{id}' was cancelled"))
                }
                status => OmnigateError::Validation(format!("workflow '{id}' is already {status}")),
            });
        };

        let run = tokio::spawn(async move { this.run(workflow).await });
        run.await.map_err(|e| {
            OmnigateError::TaskExecution(format!("workflow '{id}' execution aborted: {e}"))
        })?
    }

    async fn run(&self, workflow: Workflow) -> OmnigateResult<WorkflowResult> {
        let id = workflow.id.as_str();
        let token = self.cancellation_token(id);
        let clock = tokio::time::Instant::now();
        info!(workflow_id = %id, task_count = workflow.tasks.len(), "Workflow started");

        let outcome = self.drive(&workflow, &token).await;
        let status = self.finish(&workflow, &outcome).to_string();

        record_or_warn(
            self.collaborators.metrics.as_ref(),
            WORKFLOW_DURATION_MS,
            clock.elapsed().as_millis() as f64,
            &[("status", status.as_str())],
        )
        .await;
        self.persist(id).await;
        self.cancellations.lock().remove(id);
        outcome
    }

    /// Creates and executes a workflow in one call.
    pub async fn submit(&self, request: WorkflowRequest) -> OmnigateResult<WorkflowResult> {
        let workflow = self.create_workflow(request).await?;
        self.execute_workflow(&workflow.id).await
    }

    /// Executes a workflow in the background. Errors end up on the workflow
    /// record and in the log.
    pub fn spawn_execution(self: &Arc<Self>, id: WorkflowId) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.execute_workflow(&id).await {
                warn!(workflow_id = %id, error = %e, "Background workflow execution ended with error");
            }
        })
    }

    /// Cancels a workflow.
    ///
    /// A pending workflow is cancelled at once. A running one stops before its
    /// next batch; tasks already dispatched finish on their own.
    pub async fn cancel_workflow(&self, id: &str) -> OmnigateResult<Workflow> {
        let now = Utc::now();
        let cancelled = self.workflows.update(id, &mut |w| {
            if w.status != WorkflowStatus::Pending {
                return false;
            }
            w.status = WorkflowStatus::Cancelled;
            w.completed_at = Some(now);
            w.error = Some(format!("workflow '{id}' was cancelled before it started"));
            true
        })?;

        if let Some(workflow) = cancelled {
            self.cancel_remaining(&workflow);
            self.cancellations.lock().remove(id);
            info!(workflow_id = %id, "Pending workflow cancelled");
            self.persist(id).await;
            return Ok(workflow);
        }

        let current = self.workflows.get(id)?;
        if current.status.is_terminal() {
            return Err(OmnigateError::Validation(format!(
                "workflow '{id}' is already {}",
                current.status
            )));
        }
        if let Some(token) = self.cancellations.lock().get(id) {
            token.cancel();
        }
        info!(workflow_id = %id, "Workflow cancellation requested");
        Ok(current)
    }

    /// Cancels a workflow whose caller went away. Callable from `Drop`.
    ///
    /// A pending workflow is cancelled in place; a running one is signalled
    /// and stops before its next batch. Terminal workflows are left alone.
    pub fn abandon_workflow(&self, id: &str) {
        let now = Utc::now();
        let cancelled = self.workflows.update(id, &mut |w| {
            if w.status != WorkflowStatus::Pending {
                return false;
            }
            w.status = WorkflowStatus::Cancelled;
            w.completed_at = Some(now);
            w.error = Some(format!("workflow '{id}' was abandoned before it started"));
            true
        });
        match cancelled {
            Ok(Some(workflow)) => {
                self.cancel_remaining(&workflow);
                self.cancellations.lock().remove(id);
                info!(workflow_id = %id, "Abandoned pending workflow cancelled");
                if let (Some(this), Ok(runtime)) =
                    (self.this.upgrade(), tokio::runtime::Handle::try_current())
                {
                    let id = id.to_string();
                    runtime.spawn(async move { this.persist(&id).await });
                }
            }
            Ok(None) => {
                if let Some(token) = self.cancellations.lock().get(id) {
                    token.cancel();
                    info!(workflow_id = %id, "Abandoned workflow cancellation requested");
                }
            }
            Err(e) => warn!(workflow_id = %id, error = %e, "Failed to abandon workflow"),
        }
    }

    // --- Queries ---

    pub fn get_workflow(&self, id: &str) -> OmnigateResult<Workflow> {
        self.workflows.get(id)
    }

    /// Workflows ordered by creation time.
    pub fn list_workflows(&self, status: Option<WorkflowStatus>) -> Vec<Workflow> {
        let mut workflows = self.workflows.list(status);
        workflows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        workflows
    }

    pub fn get_task(&self, id: &str) -> OmnigateResult<Task> {
        self.tasks.get(id)
    }

    /// Tasks ordered by creation time.
    pub fn list_tasks(&self, status: Option<TaskStatus>) -> Vec<Task> {
        let mut tasks = self.tasks.list(status);
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        tasks
    }

    /// Tasks of one workflow in creation order.
    pub fn workflow_tasks(&self, id: &str) -> OmnigateResult<Vec<Task>> {
        let workflow = self.workflows.get(id)?;
        Ok(self.tasks.get_many(&workflow.tasks))
    }

    /// Pending tasks that belong to running workflows.
    pub fn queue_depth(&self) -> usize {
        let running: HashSet<WorkflowId> = self
            .workflows
            .list(Some(WorkflowStatus::Running))
            .into_iter()
            .map(|w| w.id)
            .collect();
        self.tasks
            .list(Some(TaskStatus::Pending))
            .iter()
            .filter(|t| running.contains(&t.workflow_id))
            .count()
    }

    /// Drops terminal workflows, and their tasks, that finished more than
    /// the retention window before `now`. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let retention = chrono::Duration::seconds(
            i64::try_from(self.config.workflow_retention_secs).unwrap_or(i64::MAX),
        );
        let mut purged = 0;
        for workflow in self.workflows.list(None) {
            let expired = workflow.status.is_terminal()
                && workflow
                    .completed_at
                    .is_some_and(|at| now.signed_duration_since(at) > retention);
            if !expired {
                continue;
            }
            for task_id in &workflow.tasks {
                self.tasks.remove(task_id);
            }
            self.workflows.remove(&workflow.id);
            self.cancellations.lock().remove(&workflow.id);
            debug!(workflow_id = %workflow.id, "Purged expired workflow");
            purged += 1;
        }
        purged
    }

    // --- Execution internals ---

    async fn drive(
        &self,
        workflow: &Workflow,
        token: &CancellationToken,
    ) -> OmnigateResult<WorkflowResult> {
        let initial = self.tasks.get_many(&workflow.tasks);
        if let Err(e) = self.scheduler.validate(&initial) {
            self.cancel_remaining(workflow);
            return Err(e);
        }

        loop {
            if token.is_cancelled() {
                self.cancel_remaining(workflow);
                return Err(OmnigateError::Cancelled(format!(
                    "workflow '{}' was cancelled",
                    workflow.id
                )));
            }

            // failures left behind by the stuck-task sweep
            for task in self.tasks.get_many(&workflow.tasks) {
                if task.status == TaskStatus::Failed && task.has_retry_budget() {
                    self.tasks.update(&task.id, &mut |t| t.requeue())?;
                }
            }

            let tasks = self.tasks.get_many(&workflow.tasks);
            if tasks.len() != workflow.tasks.len() {
                return Err(OmnigateError::NotFound(format!(
                    "tasks of workflow '{}' were removed while it ran",
                    workflow.id
                )));
            }

            if let Some(failed) = tasks.iter().find(|t| t.status == TaskStatus::Failed) {
                let reason = failed.error.clone().unwrap_or_default();
                self.fail_dependents(&failed.id);
                self.cancel_remaining(workflow);
                return Err(OmnigateError::TaskExecution(format!(
                    "task '{}' failed: {reason}",
                    failed.id
                )));
            }
            if let Some(cancelled) = tasks.iter().find(|t| t.status == TaskStatus::Cancelled) {
                self.cancel_remaining(workflow);
                return Err(OmnigateError::Cancelled(format!(
                    "task '{}' was cancelled",
                    cancelled.id
                )));
            }

            let resolved: HashSet<TaskId> = tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Completed)
                .map(|t| t.id.clone())
                .collect();
            if resolved.len() == tasks.len() {
                return Ok(tasks
                    .into_iter()
                    .filter_map(|t| t.result.map(|r| (t.id, r)))
                    .collect());
            }

            let ready = match self.scheduler.ready_set(&tasks, &resolved) {
                Ok(ready) => ready,
                Err(e) => {
                    self.cancel_remaining(workflow);
                    return Err(e);
                }
            };

            let slots = self.limiter.available().max(1);
            let batch: Vec<TaskId> = ready.iter().take(slots).map(|t| t.id.clone()).collect();
            debug!(
                workflow_id = %workflow.id,
                batch_size = batch.len(),
                ready = ready.len(),
                "Dispatching batch"
            );

            let runs = batch.iter().map(|task_id| {
                let guard = self.limiter.acquire();
                async move {
                    let _guard = guard;
                    (task_id, self.executor.execute(task_id).await)
                }
            });
            for (task_id, result) in join_all(runs).await {
                if let Err(e) = result {
                    warn!(task_id = %task_id, error = %e, "Task dispatch failed");
                }
            }
        }
    }

    /// Fails every pending task that transitively depends on `root`.
    fn fail_dependents(&self, root: &TaskId) {
        let now = Utc::now();
        let mut seen: HashSet<TaskId> = HashSet::new();
        let mut stack: Vec<TaskId> = match self.tasks.get(root) {
            Ok(task) => task.dependents.into_iter().collect(),
            Err(_) => return,
        };
        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            match self.tasks.update(&id, &mut |t| t.propagate_failure(root, now)) {
                Ok(Some(task)) => {
                    debug!(task_id = %id, failed_dependency = %root, "Propagated dependency failure");
                    stack.extend(task.dependents);
                }
                Ok(None) => {
                    if let Ok(task) = self.tasks.get(&id) {
                        stack.extend(task.dependents);
                    }
                }
                Err(e) => warn!(task_id = %id, error = %e, "Failed to propagate dependency failure"),
            }
        }
    }

    /// Moves every still-cancellable task of the workflow to `cancelled`.
    fn cancel_remaining(&self, workflow: &Workflow) {
        let now = Utc::now();
        for id in &workflow.tasks {
            if let Err(e) = self.tasks.update(id, &mut |t| t.cancel(now)) {
                warn!(task_id = %id, error = %e, "Failed to cancel task");
            }
        }
    }

    fn finish(
        &self,
        workflow: &Workflow,
        outcome: &OmnigateResult<WorkflowResult>,
    ) -> WorkflowStatus {
        let status = match outcome {
            Ok(_) => WorkflowStatus::Completed,
            Err(OmnigateError::Cancelled(_)) => WorkflowStatus::Cancelled,
            Err(_) => WorkflowStatus::Failed,
        };
        let now = Utc::now();
        let committed = self.workflows.update(&workflow.id, &mut |w| {
            w.status = status;
            w.completed_at = Some(now);
            match outcome {
                Ok(result) => {
                    w.result = Some(result.clone());
                    w.error = None;
                }
                Err(e) => {
                    w.result = None;
                    w.error = Some(e.to_string());
                }
            }
            true
        });
        if let Err(e) = committed {
            warn!(workflow_id = %workflow.id, error = %e, "Failed to record workflow outcome");
        }

        match outcome {
            Ok(result) => {
                info!(workflow_id = %workflow.id, result_count = result.len(), "Workflow completed");
            }
            Err(e) => {
                error!(workflow_id = %workflow.id, status = %status, error = %e, "Workflow did not complete");
            }
        }
        status
    }

    /// Best-effort snapshot of the workflow and its tasks.
    async fn persist(&self, id: &str) {
        let Ok(workflow) = self.workflows.get(id) else {
            return;
        };
        let snapshot = WorkflowSnapshot {
            tasks: self.tasks.get_many(&workflow.tasks),
            workflow,
        };
        let value = match serde_json::to_value(&snapshot) {
            Ok(value) => value,
            Err(e) => {
                warn!(workflow_id = %id, error = %e, "Failed to serialize workflow snapshot");
                return;
            }
        };
        if let Err(e) = self
            .collaborators
            .persistence
            .store(&snapshot_key(id), value, Some(self.config.retention()))
            .await
        {
            warn!(workflow_id = %id, error = %e, "Failed to persist workflow snapshot");
        }
    }

    fn cancellation_token(&self, id: &str) -> CancellationToken {
        self.cancellations
            .lock()
            .entry(id.to_string())
            .or_insert_with(CancellationToken::new)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::PersistenceStore;
    use serde_json::json;

    fn coordinator() -> Arc<WorkflowCoordinator> {
        WorkflowCoordinator::new(OrchestratorConfig::default(), Collaborators::in_memory())
    }

    fn request(value: serde_json::Value) -> WorkflowRequest {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_create_registers_workflow_and_tasks() {
        let c = coordinator();
        let wf = c
            .create_workflow(request(json!({"prompt": "hi", "tools": [{"name": "echo"}]})))
            .await
            .unwrap();
        assert_eq!(wf.status, WorkflowStatus::Pending);
        assert_eq!(wf.tasks.len(), 2);
        assert_eq!(c.workflow_tasks(&wf.id).unwrap().len(), 2);
        assert_eq!(c.list_tasks(Some(TaskStatus::Pending)).len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_request_registers_nothing() {
        let c = coordinator();
        let err = c
            .create_workflow(request(json!({
                "tools": [{"name": "echo"}],
                "dependencies": [{"task": "echo", "dependsOn": "missing"}]
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, OmnigateError::Validation(_)));
        assert!(c.list_workflows(None).is_empty());
        assert!(c.list_tasks(None).is_empty());
    }

    #[tokio::test]
    async fn test_submit_returns_result_keyed_by_task_id() {
        let c = coordinator();
        let result = c
            .submit(request(json!({"tools": [{"name": "echo", "input": {"v": 1}}]})))
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        let (key, value) = result.into_iter().next().unwrap();
        assert!(key.ends_with("/echo"));
        assert_eq!(value, json!({"v": 1}));
    }

    #[tokio::test]
    async fn test_execute_twice_is_rejected() {
        let c = coordinator();
        let wf = c
            .create_workflow(request(json!({"prompt": "x"})))
            .await
            .unwrap();
        c.execute_workflow(&wf.id).await.unwrap();
        let err = c.execute_workflow(&wf.id).await.unwrap_err();
        assert!(err.to_string().contains("already completed"));
    }

    #[tokio::test]
    async fn test_cancel_pending_workflow() {
        let c = coordinator();
        let wf = c
            .create_workflow(request(json!({"tools": [{"name": "echo"}]})))
            .await
            .unwrap();
        let cancelled = c.cancel_workflow(&wf.id).await.unwrap();
        assert_eq!(cancelled.status, WorkflowStatus::Cancelled);
        assert_eq!(
            c.get_task(&wf.tasks[0]).unwrap().status,
            TaskStatus::Cancelled
        );

        let err = c.execute_workflow(&wf.id).await.unwrap_err();
        assert!(matches!(err, OmnigateError::Cancelled(_)));
        assert!(c.cancel_workflow(&wf.id).await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_is_persisted_after_completion() {
        let collaborators = Collaborators::in_memory();
        let persistence = Arc::clone(&collaborators.persistence);
        let c = WorkflowCoordinator::new(OrchestratorConfig::default(), collaborators);
        let wf = c
            .create_workflow(request(json!({"prompt": "persist me"})))
            .await
            .unwrap();
        c.execute_workflow(&wf.id).await.unwrap();

        let stored = persistence
            .retrieve(&snapshot_key(&wf.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["workflow"]["status"], "completed");
        assert_eq!(stored["tasks"][0]["status"], "completed");
    }

    #[tokio::test]
    async fn test_purge_expired_drops_old_terminal_workflows() {
        let c = coordinator();
        let wf = c
            .create_workflow(request(json!({"prompt": "x"})))
            .await
            .unwrap();
        c.execute_workflow(&wf.id).await.unwrap();
        let pending = c
            .create_workflow(request(json!({"prompt": "y"})))
            .await
            .unwrap();

        assert_eq!(c.purge_expired(Utc::now()), 0);
        let later = Utc::now() + chrono::Duration::days(2);
        assert_eq!(c.purge_expired(later), 1);
        assert!(c.get_workflow(&wf.id).is_err());
        assert!(c.get_task(&wf.tasks[0]).is_err());
        assert!(c.get_workflow(&pending.id).is_ok());
    }

    #[tokio::test]
    async fn test_queue_depth_counts_running_workflows_only() {
        let c = coordinator();
        c.create_workflow(request(json!({"prompt": "x"})))
            .await
            .unwrap();
        assert_eq!(c.queue_depth(), 0);
    }
}
