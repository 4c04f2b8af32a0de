use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

/// Opaque task identifier, unique across every workflow.
pub type TaskId = String;

/// Opaque workflow identifier.
pub type WorkflowId = String;

/// Which collaborator a task is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    /// Completion or chat call against an AI provider.
    Ai,
    /// A named tool from the tool registry.
    ToolInvocation,
    /// A nested workflow built from the task payload.
    SubWorkflow,
    /// A read of the metrics collaborator's aggregates.
    MetricsQuery,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::Ai => write!(f, "ai"),
            TaskType::ToolInvocation => write!(f, "tool-invocation"),
            TaskType::SubWorkflow => write!(f, "sub-workflow"),
            TaskType::MetricsQuery => write!(f, "metrics-query"),
        }
    }
}

/// Scheduling weight used to order a ready set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Runs after everything else that is ready.
    Low,
    /// Used when a request names no priority.
    #[default]
    Medium,
    /// Ahead of medium and low.
    High,
    /// Runs first within a ready set.
    Critical,
}

impl Priority {
    /// Tie-break weight: critical=4 … low=1.
    pub fn weight(self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
            Priority::Critical => 4,
        }
    }
}

/// Lifecycle of a single task.
///
/// `pending → running → {completed | failed}`; `failed` loops back to
/// `pending` while retry budget remains. `completed` is always terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting for its dependencies or a free slot.
    Pending,
    /// An attempt is in flight.
    Running,
    /// Finished with a result. Terminal.
    Completed,
    /// The last attempt failed; requeued while retry budget remains.
    Failed,
    /// Stopped before it could complete. Terminal.
    Cancelled,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("unknown task status '{other}'")),
        }
    }
}

/// A unit of work dispatched to exactly one collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// `{workflow id}/{name}`.
    pub id: TaskId,
    pub workflow_id: WorkflowId,
    /// Name of the task inside its workflow request.
    pub name: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub priority: Priority,
    /// Handler input, shaped by `task_type`.
    pub payload: serde_json::Value,
    pub status: TaskStatus,
    /// Tasks that must complete before this one may start.
    #[serde(default)]
    pub dependencies: BTreeSet<TaskId>,
    /// Inverse of `dependencies`, maintained at graph-build time.
    #[serde(default)]
    pub dependents: BTreeSet<TaskId>,
    /// Failed attempts so far.
    pub retries: u32,
    /// Failed attempts allowed before the failure becomes terminal.
    pub max_retries: u32,
    /// Per-attempt timeout; `None` falls back to the configured default.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    /// Start of the first attempt.
    pub started_at: Option<DateTime<Utc>>,
    /// Start of the current attempt; drives stuck-task detection.
    pub attempt_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Handler output, set on completion.
    pub result: Option<serde_json::Value>,
    /// Why the task ended up failed or cancelled.
    pub error: Option<String>,
    /// Error of the most recent failed attempt, kept across requeues.
    pub last_error: Option<String>,
}

impl Task {
    pub fn new(
        workflow_id: impl Into<WorkflowId>,
        name: impl Into<String>,
        task_type: TaskType,
        payload: serde_json::Value,
    ) -> Self {
        let workflow_id = workflow_id.into();
        let name = name.into();
        Self {
            id: format!("{workflow_id}/{name}"),
            workflow_id,
            name,
            task_type,
            priority: Priority::default(),
            payload,
            status: TaskStatus::Pending,
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
            retries: 0,
            max_retries: 0,
            timeout_ms: None,
            created_at: Utc::now(),
            started_at: None,
            attempt_started_at: None,
            completed_at: None,
            result: None,
            error: None,
            last_error: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies<I>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = TaskId>,
    {
        self.dependencies = deps.into_iter().collect();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Pending with every dependency already resolved.
    pub fn is_ready(&self, resolved: &HashSet<TaskId>) -> bool {
        self.status == TaskStatus::Pending
            && self.dependencies.iter().all(|dep| resolved.contains(dep))
    }

    pub fn has_retry_budget(&self) -> bool {
        self.retries < self.max_retries
    }

    /// Completed, cancelled, or failed with no retry budget left.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            TaskStatus::Completed | TaskStatus::Cancelled => true,
            TaskStatus::Failed => !self.has_retry_budget(),
            TaskStatus::Pending | TaskStatus::Running => false,
        }
    }

    pub fn effective_timeout(&self, default: Duration) -> Duration {
        self.timeout_ms.map(Duration::from_millis).unwrap_or(default)
    }

    /// Running for longer than its timeout as of `now`.
    pub fn is_stuck(&self, now: DateTime<Utc>, default_timeout: Duration) -> bool {
        if self.status != TaskStatus::Running {
            return false;
        }
        let Some(started) = self.attempt_started_at else {
            return false;
        };
        let elapsed = (now - started).to_std().unwrap_or_default();
        elapsed > self.effective_timeout(default_timeout)
    }

    // --- State machine transitions ---
    //
    // Each returns false and leaves the task untouched when the transition
    // is not allowed from the current status.

    pub fn begin_attempt(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        self.status = TaskStatus::Running;
        self.started_at.get_or_insert(now);
        self.attempt_started_at = Some(now);
        true
    }

    pub fn complete(&mut self, result: serde_json::Value, now: DateTime<Utc>) -> bool {
        if self.status != TaskStatus::Running {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
        self.result = Some(result);
        self.error = None;
        true
    }

    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> bool {
        if self.status != TaskStatus::Running {
            return false;
        }
        let error = error.into();
        self.status = TaskStatus::Failed;
        self.completed_at = Some(now);
        self.last_error = Some(error.clone());
        self.error = Some(error);
        self.result = None;
        true
    }

    /// `failed → pending`, spending one unit of retry budget.
    pub fn requeue(&mut self) -> bool {
        if self.status != TaskStatus::Failed || !self.has_retry_budget() {
            return false;
        }
        self.retries += 1;
        self.status = TaskStatus::Pending;
        self.error = None;
        self.completed_at = None;
        self.attempt_started_at = None;
        true
    }

    /// Fails a pending task because one of its dependencies failed for good.
    pub fn propagate_failure(&mut self, dependency: &str, now: DateTime<Utc>) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        let error = format!("dependency '{dependency}' failed");
        self.status = TaskStatus::Failed;
        self.completed_at = Some(now);
        self.last_error = Some(error.clone());
        self.error = Some(error);
        self.retries = self.max_retries;
        true
    }

    /// Pending or retryable-failed tasks become cancelled; running tasks are left alone.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> bool {
        let cancellable = match self.status {
            TaskStatus::Pending => true,
            TaskStatus::Failed => self.has_retry_budget(),
            _ => false,
        };
        if !cancellable {
            return false;
        }
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(now);
        true
    }
}

/// Aggregate status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// Created, not yet executed.
    Pending,
    /// Batches are being dispatched.
    Running,
    /// Every task completed.
    Completed,
    /// A task failed with no retry budget left, or the graph was invalid.
    Failed,
    /// Cancelled by a caller, or abandoned by a parent task.
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Pending => write!(f, "pending"),
            WorkflowStatus::Running => write!(f, "running"),
            WorkflowStatus::Completed => write!(f, "completed"),
            WorkflowStatus::Failed => write!(f, "failed"),
            WorkflowStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorkflowStatus::Pending),
            "running" => Ok(WorkflowStatus::Running),
            "completed" => Ok(WorkflowStatus::Completed),
            "failed" => Ok(WorkflowStatus::Failed),
            "cancelled" => Ok(WorkflowStatus::Cancelled),
            other => Err(format!("unknown workflow status '{other}'")),
        }
    }
}

/// A task graph built from one inbound request.
///
/// Holds task ids only; the task records live in the task store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: WorkflowId,
    pub status: WorkflowStatus,
    /// Creation order, not execution order.
    pub tasks: Vec<TaskId>,
    /// Result of every task, keyed by task id. Set only on completion.
    pub result: Option<HashMap<TaskId, serde_json::Value>>,
    /// Error that ended a failed or cancelled workflow.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// When execution began.
    pub started_at: Option<DateTime<Utc>>,
    /// When the workflow reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Workflow {
    pub fn new(id: impl Into<WorkflowId>, tasks: Vec<TaskId>) -> Self {
        Self {
            id: id.into(),
            status: WorkflowStatus::Pending,
            tasks,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// What gets handed to the persistence collaborator after a terminal transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub workflow: Workflow,
    pub tasks: Vec<Task>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str) -> Task {
        Task::new("wf", name, TaskType::ToolInvocation, serde_json::json!({}))
    }

    #[test]
    fn test_task_creation() {
        let t = task("search");
        assert_eq!(t.id, "wf/search");
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!(t.priority, Priority::Medium);
        assert!(t.dependencies.is_empty());
    }

    #[test]
    fn test_task_is_ready_with_deps() {
        let t = task("b").with_dependencies(vec!["wf/a".to_string()]);
        assert!(!t.is_ready(&HashSet::new()));
        let resolved: HashSet<TaskId> = ["wf/a".to_string()].into_iter().collect();
        assert!(t.is_ready(&resolved));
    }

    #[test]
    fn test_task_not_ready_when_running() {
        let mut t = task("a");
        assert!(t.begin_attempt(Utc::now()));
        assert!(!t.is_ready(&HashSet::new()));
    }

    #[test]
    fn test_priority_weights_are_ordered() {
        assert_eq!(Priority::Critical.weight(), 4);
        assert_eq!(Priority::Low.weight(), 1);
        assert!(Priority::High > Priority::Medium);
    }

    #[test]
    fn test_started_at_is_set_once() {
        let mut t = task("a").with_max_retries(1);
        let first = Utc::now();
        t.begin_attempt(first);
        t.fail("boom", first);
        assert!(t.requeue());
        let second = first + chrono::Duration::seconds(5);
        t.begin_attempt(second);
        assert_eq!(t.started_at, Some(first));
        assert_eq!(t.attempt_started_at, Some(second));
    }

    #[test]
    fn test_requeue_respects_budget() {
        let mut t = task("a").with_max_retries(1);
        let now = Utc::now();
        t.begin_attempt(now);
        t.fail("first", now);
        assert!(t.requeue());
        assert_eq!(t.retries, 1);
        assert_eq!(t.last_error.as_deref(), Some("first"));
        assert!(t.error.is_none());

        t.begin_attempt(now);
        t.fail("second", now);
        assert!(!t.requeue());
        assert_eq!(t.status, TaskStatus::Failed);
        assert!(t.is_terminal());
    }

    #[test]
    fn test_completed_is_terminal() {
        let mut t = task("a");
        let now = Utc::now();
        t.begin_attempt(now);
        assert!(t.complete(serde_json::json!(1), now));
        assert!(!t.fail("late", now));
        assert!(!t.cancel(now));
        assert_eq!(t.status, TaskStatus::Completed);
        assert!(t.error.is_none());
    }

    #[test]
    fn test_is_stuck_uses_task_timeout() {
        let mut t = task("a").with_timeout(Duration::from_millis(100));
        let now = Utc::now();
        t.begin_attempt(now);
        assert!(!t.is_stuck(now, Duration::from_secs(30)));
        let later = now + chrono::Duration::milliseconds(500);
        assert!(t.is_stuck(later, Duration::from_secs(30)));
    }

    #[test]
    fn test_task_type_serialization() {
        let json = serde_json::to_string(&TaskType::ToolInvocation).unwrap();
        assert_eq!(json, "\"tool-invocation\"");
        let parsed: TaskType = serde_json::from_str("\"metrics-query\"").unwrap();
        assert_eq!(parsed, TaskType::MetricsQuery);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("failed".parse::<TaskStatus>(), Ok(TaskStatus::Failed));
        assert!("bogus".parse::<WorkflowStatus>().is_err());
    }
}
