//! Inbound workflow requests and their translation into a task graph.

use crate::types::{Priority, Task, TaskType};
use omnigate_core::{ChatMessage, OmnigateError, OmnigateResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Local name of the AI task when the request does not pick one.
pub const DEFAULT_COMPLETION_NAME: &str = "completion";

/// A request to run a workflow. Its shape decides which tasks exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRequest {
    /// Completion-style prompt; implies one `ai` task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Chat-style messages; implies one `ai` task routed to `chat`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_id: Option<String>,
    /// One `tool-invocation` task per entry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolCallSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_workflows: Vec<SubWorkflowSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics_queries: Vec<MetricsQuerySpec>,
    /// Edges between local task names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencySpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallSpec {
    /// Local task name; defaults to the tool name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubWorkflowSpec {
    pub id: String,
    pub request: Box<WorkflowRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsQuerySpec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<String>>,
}

/// `task` runs only after `depends_on` completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencySpec {
    pub task: String,
    pub depends_on: String,
}

/// Values applied to tasks the request leaves unset.
#[derive(Debug, Clone, Copy)]
pub struct TaskDefaults {
    pub max_retries: u32,
}

/// Builds the complete task graph for `request`, including dependency and
/// dependent edges. Fails without side effects on a malformed request.
///
/// Cycles are not rejected here; they surface as a graph error when the
/// workflow executes.
pub fn build_tasks(
    workflow_id: &str,
    request: &WorkflowRequest,
    defaults: TaskDefaults,
) -> OmnigateResult<Vec<Task>> {
    let mut tasks: Vec<Task> = Vec::new();

    if request.prompt.is_some() || request.messages.is_some() {
        let name = request
            .completion_id
            .clone()
            .unwrap_or_else(|| DEFAULT_COMPLETION_NAME.to_string());
        let payload = serde_json::json!({
            "prompt": request.prompt,
            "messages": request.messages,
            "options": request.options,
        });
        tasks.push(Task::new(workflow_id, name, TaskType::Ai, payload));
    }

    for tool in &request.tools {
        let name = tool.id.clone().unwrap_or_else(|| tool.name.clone());
        let payload = serde_json::json!({ "tool": tool.name, "input": tool.input });
        let task = Task::new(workflow_id, name, TaskType::ToolInvocation, payload)
            .with_priority(tool.priority.or(request.priority).unwrap_or_default());
        tasks.push(task);
    }

    for sub in &request.sub_workflows {
        // nested requests are validated now, not when the child is created
        build_tasks("validation", &sub.request, defaults)?;
        let payload = serde_json::to_value(&*sub.request)?;
        tasks.push(Task::new(
            workflow_id,
            sub.id.clone(),
            TaskType::SubWorkflow,
            payload,
        ));
    }

    for query in &request.metrics_queries {
        let payload = serde_json::json!({ "names": query.names });
        tasks.push(Task::new(
            workflow_id,
            query.id.clone(),
            TaskType::MetricsQuery,
            payload,
        ));
    }

    if tasks.is_empty() {
        return Err(OmnigateError::Validation(
            "request does not describe any task".into(),
        ));
    }

    let mut index: HashMap<String, usize> = HashMap::new();
    for (i, task) in tasks.iter().enumerate() {
        if task.name.is_empty() {
            return Err(OmnigateError::Validation("task name must not be empty".into()));
        }
        if index.insert(task.name.clone(), i).is_some() {
            return Err(OmnigateError::Validation(format!(
                "duplicate task name '{}'",
                task.name
            )));
        }
    }

    let max_retries = request.max_retries.unwrap_or(defaults.max_retries);
    for task in &mut tasks {
        task.max_retries = max_retries;
        task.timeout_ms = request.timeout_ms;
        if task.task_type != TaskType::ToolInvocation {
            task.priority = request.priority.unwrap_or_default();
        }
    }

    for edge in &request.dependencies {
        let lookup = |name: &str| {
            index.get(name).copied().ok_or_else(|| {
                OmnigateError::Validation(format!(
                    "dependency references unknown task '{name}'"
                ))
            })
        };
        let child = lookup(&edge.task)?;
        let parent = lookup(&edge.depends_on)?;
        let parent_id = tasks[parent].id.clone();
        let child_id = tasks[child].id.clone();
        tasks[child].dependencies.insert(parent_id);
        tasks[parent].dependents.insert(child_id);
    }

    Ok(tasks)
}
