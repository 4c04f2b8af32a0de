#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use omnigate_core::{OmnigateError, OmnigateResult};
use omnigate_orchestrator::collaborator::{Tool, ToolDescriptor, ToolRegistry};
use omnigate_orchestrator::{Collaborators, OrchestratorConfig, WorkflowCoordinator, WorkflowRequest};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn descriptor(name: &str) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: format!("test tool {name}"),
    }
}

/// Fails the first `failures` invocations, then echoes its input.
pub struct FlakyTool {
    descriptor: ToolDescriptor,
    failures: u32,
    pub calls: AtomicU32,
}

impl FlakyTool {
    pub fn new(name: &str, failures: u32) -> Self {
        Self {
            descriptor: descriptor(name),
            failures,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Tool for FlakyTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, input: serde_json::Value) -> OmnigateResult<serde_json::Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(OmnigateError::TaskExecution(format!(
                "{} unavailable (call {call})",
                self.descriptor.name
            )));
        }
        Ok(input)
    }
}

/// Sleeps before echoing its input.
pub struct SlowTool {
    descriptor: ToolDescriptor,
    delay: Duration,
}

impl SlowTool {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            descriptor: descriptor(name),
            delay,
        }
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, input: serde_json::Value) -> OmnigateResult<serde_json::Value> {
        tokio::time::sleep(self.delay).await;
        Ok(input)
    }
}

/// Appends its name to a shared log on every invocation.
pub struct RecordingTool {
    descriptor: ToolDescriptor,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingTool {
    pub fn new(name: &str, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            descriptor: descriptor(name),
            log,
        }
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, input: serde_json::Value) -> OmnigateResult<serde_json::Value> {
        self.log.lock().push(self.descriptor.name.clone());
        Ok(input)
    }
}

/// Built-in tools plus `extra`.
pub fn collaborators_with(extra: Vec<Arc<dyn Tool>>) -> Collaborators {
    let mut tools = ToolRegistry::with_builtins();
    for tool in extra {
        tools.register(tool);
    }
    Collaborators {
        tools: Arc::new(tools),
        ..Collaborators::in_memory()
    }
}

pub fn coordinator_with(extra: Vec<Arc<dyn Tool>>) -> Arc<WorkflowCoordinator> {
    WorkflowCoordinator::new(OrchestratorConfig::default(), collaborators_with(extra))
}

pub fn request(value: serde_json::Value) -> WorkflowRequest {
    serde_json::from_value(value).unwrap()
}
