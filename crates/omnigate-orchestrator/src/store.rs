//! Task and workflow storage.
//!
//! Both stores hand out clones, never live references. Mutations go through
//! [`TaskStore::update`], which applies a closure to a copy of the record
//! under the write lock and commits it only when the closure accepts the
//! transition. That gives each record single-writer semantics, so the
//! self-healing sweep and a normal execution outcome cannot lose each
//! other's updates.

use crate::types::{Task, TaskId, TaskStatus, Workflow, WorkflowId, WorkflowStatus};
use omnigate_core::{OmnigateError, OmnigateResult};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Storage for task records. The store exclusively owns tasks.
pub trait TaskStore: Send + Sync {
    /// Inserts or overwrites a task by id. Dependencies are not validated.
    fn put(&self, task: Task);

    fn get(&self, id: &str) -> OmnigateResult<Task>;

    /// Snapshot of matching tasks, in no particular order.
    fn list(&self, status: Option<TaskStatus>) -> Vec<Task>;

    /// Applies `apply` to a copy of the task and commits it if `apply` returns
    /// true. Returns the committed record, or `None` when the change was
    /// declined.
    fn update(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut Task) -> bool,
    ) -> OmnigateResult<Option<Task>>;

    fn remove(&self, id: &str) -> Option<Task>;

    /// Fetches several tasks, skipping ids that do not resolve.
    fn get_many(&self, ids: &[TaskId]) -> Vec<Task> {
        ids.iter().filter_map(|id| self.get(id).ok()).collect()
    }
}

/// Storage for workflow records. Owned by the coordinator.
pub trait WorkflowStore: Send + Sync {
    fn put(&self, workflow: Workflow);

    fn get(&self, id: &str) -> OmnigateResult<Workflow>;

    fn list(&self, status: Option<WorkflowStatus>) -> Vec<Workflow>;

    fn update(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut Workflow) -> bool,
    ) -> OmnigateResult<Option<Workflow>>;

    fn remove(&self, id: &str) -> Option<Workflow>;
}

/// `HashMap`-backed [`TaskStore`].
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}

impl TaskStore for InMemoryTaskStore {
    fn put(&self, task: Task) {
        self.tasks.write().insert(task.id.clone(), task);
    }

    fn get(&self, id: &str) -> OmnigateResult<Task> {
        self.tasks
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| OmnigateError::NotFound(format!("task '{id}'")))
    }

    fn list(&self, status: Option<TaskStatus>) -> Vec<Task> {
        self.tasks
            .read()
            .values()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect()
    }

    fn update(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut Task) -> bool,
    ) -> OmnigateResult<Option<Task>> {
        let mut tasks = self.tasks.write();
        let current = tasks
            .get_mut(id)
            .ok_or_else(|| OmnigateError::NotFound(format!("task '{id}'")))?;
        let mut draft = current.clone();
        if !apply(&mut draft) {
            return Ok(None);
        }
        *current = draft.clone();
        Ok(Some(draft))
    }

    fn remove(&self, id: &str) -> Option<Task> {
        self.tasks.write().remove(id)
    }
}

/// `HashMap`-backed [`WorkflowStore`].
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    workflows: RwLock<HashMap<WorkflowId, Workflow>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkflowStore for InMemoryWorkflowStore {
    fn put(&self, workflow: Workflow) {
        self.workflows.write().insert(workflow.id.clone(), workflow);
    }

    fn get(&self, id: &str) -> OmnigateResult<Workflow> {
        self.workflows
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| OmnigateError::NotFound(format!("workflow '{id}'")))
    }

    fn list(&self, status: Option<WorkflowStatus>) -> Vec<Workflow> {
        self.workflows
            .read()
            .values()
            .filter(|w| status.map_or(true, |s| w.status == s))
            .cloned()
            .collect()
    }

    fn update(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut Workflow) -> bool,
    ) -> OmnigateResult<Option<Workflow>> {
        let mut workflows = self.workflows.write();
        let current = workflows
            .get_mut(id)
            .ok_or_else(|| OmnigateError::NotFound(format!("workflow '{id}'")))?;
        let mut draft = current.clone();
        if !apply(&mut draft) {
            return Ok(None);
        }
        *current = draft.clone();
        Ok(Some(draft))
    }

    fn remove(&self, id: &str) -> Option<Workflow> {
        self.workflows.write().remove(id)
    }
}
