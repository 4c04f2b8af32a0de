use crate::collaborator::metrics::{record_or_warn, MetricsSink, TASKS_PROCESSED_TOTAL};
use crate::store::TaskStore;
use crate::types::{Task, TaskId, TaskStatus, TaskType};
use async_trait::async_trait;
use chrono::Utc;
use omnigate_core::{OmnigateError, OmnigateResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Runs one task type against its collaborator.
///
/// Handlers see `(type, payload)` only; all bookkeeping stays in the executor.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> OmnigateResult<serde_json::Value>;
}

/// Table of task type → handler. Adding a task type means registering a handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task_type: TaskType, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(task_type, handler);
    }

    pub fn get(&self, task_type: TaskType) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(&task_type)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub async fn dispatch(&self, task: &Task) -> OmnigateResult<serde_json::Value> {
        let handler = self.handlers.get(&task.task_type).ok_or_else(|| {
            OmnigateError::Validation(format!(
                "no handler registered for task type '{}'",
                task.task_type
            ))
        })?;
        handler.handle(task).await
    }
}

/// What one call to [`TaskExecutor::execute`] did to the task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(serde_json::Value),
    /// Failed with retry budget left; the task is `pending` again.
    Requeued { attempt: u32, error: String },
    /// Failed with no budget left.
    Failed(String),
    /// Another writer moved the task while it ran; this attempt's result was
    /// dropped.
    Superseded,
    /// The task was not `pending` with all dependencies completed.
    NotRunnable,
}

/// Runs a single task attempt: start, dispatch under a timeout, record.
pub struct TaskExecutor {
    store: Arc<dyn TaskStore>,
    handlers: Arc<HandlerRegistry>,
    metrics: Arc<dyn MetricsSink>,
    default_timeout: Duration,
}

impl TaskExecutor {
    pub fn new(
        store: Arc<dyn TaskStore>,
        handlers: Arc<HandlerRegistry>,
        metrics: Arc<dyn MetricsSink>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            store,
            handlers,
            metrics,
            default_timeout,
        }
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Executes one attempt of task `id`.
    ///
    /// Every dispatch error, including a timeout or a missing handler, counts
    /// as a task execution failure and is requeued while budget remains.
    pub async fn execute(&self, id: &TaskId) -> OmnigateResult<TaskOutcome> {
        let task = self.store.get(id)?;
        if !self.dependencies_completed(&task)? {
            warn!(task_id = %id, "Task dependencies not completed, skipping");
            return Ok(TaskOutcome::NotRunnable);
        }

        let Some(task) = self
            .store
            .update(id, &mut |t| t.begin_attempt(Utc::now()))?
        else {
            return Ok(TaskOutcome::NotRunnable);
        };

        let attempt = task.retries + 1;
        let timeout = task.effective_timeout(self.default_timeout);
        info!(
            task_id = %id,
            task_type = %task.task_type,
            attempt,
            "Executing task"
        );

        let result = match tokio::time::timeout(timeout, self.handlers.dispatch(&task)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("task '{id}' timed out after {}ms", timeout.as_millis())),
        };

        let outcome = match result {
            Ok(value) => {
                let committed = self
                    .store
                    .update(id, &mut |t| t.complete(value.clone(), Utc::now()))?;
                match committed {
                    Some(_) => {
                        info!(task_id = %id, attempt, "Task completed");
                        TaskOutcome::Completed(value)
                    }
                    None => TaskOutcome::Superseded,
                }
            }
            Err(error) => {
                let committed = self.store.update(id, &mut |t| {
                    if !t.fail(error.clone(), Utc::now()) {
                        return false;
                    }
                    t.requeue();
                    true
                })?;
                match committed {
                    Some(t) if t.status == TaskStatus::Pending => {
                        warn!(task_id = %id, attempt, error = %error, "Task failed, requeued");
                        TaskOutcome::Requeued { attempt, error }
                    }
                    Some(_) => {
                        warn!(task_id = %id, attempt, error = %error, "Task failed, retries exhausted");
                        TaskOutcome::Failed(error)
                    }
                    None => TaskOutcome::Superseded,
                }
            }
        };

        if outcome == TaskOutcome::Superseded {
            warn!(task_id = %id, attempt, "Task changed during execution, result dropped");
        }
        record_or_warn(
            self.metrics.as_ref(),
            TASKS_PROCESSED_TOTAL,
            1.0,
            &[("status", outcome.label())],
        )
        .await;
        Ok(outcome)
    }

    fn dependencies_completed(&self, task: &Task) -> OmnigateResult<bool> {
        for dep in &task.dependencies {
            if self.store.get(dep)?.status != TaskStatus::Completed {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl TaskOutcome {
    fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Completed(_) => "completed",
            TaskOutcome::Requeued { .. } => "requeued",
            TaskOutcome::Failed(_) => "failed",
            TaskOutcome::Superseded => "superseded",
            TaskOutcome::NotRunnable => "not_runnable",
        }
    }
}
