//! Built-in [`TaskHandler`]s, one per [`TaskType`](crate::types::TaskType).

use crate::collaborator::metrics::series_name;
use crate::collaborator::{AiProvider, MetricsSink, ToolInvoker};
use crate::coordinator::WorkflowCoordinator;
use crate::executor::TaskHandler;
use crate::request::WorkflowRequest;
use crate::types::Task;
use async_trait::async_trait;
use omnigate_core::{ChatMessage, OmnigateError, OmnigateResult};
use serde::Deserialize;
use std::sync::{Arc, Weak};

#[derive(Deserialize)]
struct AiPayload {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    options: Option<serde_json::Value>,
}

/// `ai` tasks: `messages` selects chat, otherwise `prompt` selects completion.
pub struct AiHandler {
    provider: Arc<dyn AiProvider>,
}

impl AiHandler {
    pub fn new(provider: Arc<dyn AiProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl TaskHandler for AiHandler {
    async fn handle(&self, task: &Task) -> OmnigateResult<serde_json::Value> {
        let payload: AiPayload = serde_json::from_value(task.payload.clone())?;
        let options = payload.options.unwrap_or(serde_json::Value::Null);
        let completion = match (payload.messages, payload.prompt) {
            (Some(messages), _) => self.provider.chat(&messages, &options).await?,
            (None, Some(prompt)) => self.provider.complete(&prompt, &options).await?,
            (None, None) => {
                return Err(OmnigateError::Validation(
                    "ai task needs a prompt or messages".into(),
                ))
            }
        };
        Ok(serde_json::to_value(completion)?)
    }
}

#[derive(Deserialize)]
struct ToolPayload {
    tool: String,
    #[serde(default)]
    input: serde_json::Value,
}

/// `tool-invocation` tasks, payload `{tool, input}`.
pub struct ToolHandler {
    tools: Arc<dyn ToolInvoker>,
}

impl ToolHandler {
    pub fn new(tools: Arc<dyn ToolInvoker>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl TaskHandler for ToolHandler {
    async fn handle(&self, task: &Task) -> OmnigateResult<serde_json::Value> {
        let payload: ToolPayload = serde_json::from_value(task.payload.clone())?;
        self.tools.invoke(&payload.tool, payload.input).await
    }
}

/// `sub-workflow` tasks: the payload is a nested request, run to completion
/// through the same coordinator.
pub struct SubWorkflowHandler {
    coordinator: Weak<WorkflowCoordinator>,
}

impl SubWorkflowHandler {
    pub fn new(coordinator: Weak<WorkflowCoordinator>) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl TaskHandler for SubWorkflowHandler {
    async fn handle(&self, task: &Task) -> OmnigateResult<serde_json::Value> {
        let coordinator = self.coordinator.upgrade().ok_or_else(|| {
            OmnigateError::TaskExecution("coordinator is shutting down".into())
        })?;
        let request: WorkflowRequest = serde_json::from_value(task.payload.clone())?;
        let child = coordinator.create_workflow(request).await?;
        let mut guard = ChildGuard {
            coordinator: &coordinator,
            id: &child.id,
            armed: true,
        };
        let result = coordinator.execute_workflow(&child.id).await;
        guard.armed = false;
        Ok(serde_json::to_value(result?)?)
    }
}

/// Cancels the child workflow if the parent task stops waiting for it,
/// e.g. when the parent attempt times out.
struct ChildGuard<'a> {
    coordinator: &'a WorkflowCoordinator,
    id: &'a str,
    armed: bool,
}

impl Drop for ChildGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.coordinator.abandon_workflow(self.id);
        }
    }
}

#[derive(Deserialize)]
struct MetricsPayload {
    #[serde(default)]
    names: Option<Vec<String>>,
}

/// `metrics-query` tasks: current aggregates, optionally filtered by metric name.
pub struct MetricsQueryHandler {
    metrics: Arc<dyn MetricsSink>,
}

impl MetricsQueryHandler {
    pub fn new(metrics: Arc<dyn MetricsSink>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl TaskHandler for MetricsQueryHandler {
    async fn handle(&self, task: &Task) -> OmnigateResult<serde_json::Value> {
        let payload: MetricsPayload = serde_json::from_value(task.payload.clone())?;
        let mut aggregates = self.metrics.aggregates().await?;
        if let Some(names) = payload.names {
            aggregates.retain(|key, _| {
                names
                    .iter()
                    .any(|n| n == key || n.as_str() == series_name(key))
            });
        }
        Ok(serde_json::to_value(aggregates)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::{EchoProvider, InMemoryMetrics, ToolRegistry};
    use crate::types::TaskType;
    use serde_json::json;

    fn task(task_type: TaskType, payload: serde_json::Value) -> Task {
        Task::new("wf", "t", task_type, payload)
    }

    #[tokio::test]
    async fn test_ai_handler_prompt_uses_complete() {
        let handler = AiHandler::new(Arc::new(EchoProvider::new()));
        let out = handler
            .handle(&task(TaskType::Ai, json!({"prompt": "two words"})))
            .await
            .unwrap();
        assert_eq!(out["content"], "two words");
        assert_eq!(out["usage"]["promptTokens"], 2);
    }

    #[tokio::test]
    async fn test_ai_handler_messages_use_chat() {
        let handler = AiHandler::new(Arc::new(EchoProvider::new()));
        let payload = json!({
            "prompt": null,
            "messages": [{"role": "user", "content": "from chat"}]
        });
        let out = handler.handle(&task(TaskType::Ai, payload)).await.unwrap();
        assert_eq!(out["content"], "from chat");
    }

    #[tokio::test]
    async fn test_ai_handler_requires_input() {
        let handler = AiHandler::new(Arc::new(EchoProvider::new()));
        let err = handler
            .handle(&task(TaskType::Ai, json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, OmnigateError::Validation(_)));
    }

    #[tokio::test]
    async fn test_tool_handler_routes_by_name() {
        let handler = ToolHandler::new(Arc::new(ToolRegistry::with_builtins()));
        let out = handler
            .handle(&task(
                TaskType::ToolInvocation,
                json!({"tool": "echo", "input": [1, 2]}),
            ))
            .await
            .unwrap();
        assert_eq!(out, json!([1, 2]));
    }

    #[tokio::test]
    async fn test_metrics_handler_filters_by_name() {
        let metrics = Arc::new(InMemoryMetrics::new());
        metrics
            .record_metric("tasks_processed_total", 1.0, &[("status", "completed")])
            .await
            .unwrap();
        metrics.record_metric("other", 1.0, &[]).await.unwrap();

        let handler = MetricsQueryHandler::new(metrics);
        let out = handler
            .handle(&task(
                TaskType::MetricsQuery,
                json!({"names": ["tasks_processed_total"]}),
            ))
            .await
            .unwrap();
        let keys: Vec<_> = out.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["tasks_processed_total{status=completed}"]);
    }

    #[tokio::test]
    async fn test_sub_workflow_without_coordinator_fails() {
        let handler = SubWorkflowHandler::new(Weak::new());
        let err = handler
            .handle(&task(TaskType::SubWorkflow, json!({"prompt": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, OmnigateError::TaskExecution(_)));
    }
}
