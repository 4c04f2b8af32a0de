use async_trait::async_trait;
use omnigate_core::{OmnigateError, OmnigateResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Name and description of a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
}

/// A named capability callable from a `tool-invocation` task.
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    async fn invoke(&self, input: serde_json::Value) -> OmnigateResult<serde_json::Value>;
}

/// Dispatches a tool call by name.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(
        &self,
        tool_name: &str,
        input: serde_json::Value,
    ) -> OmnigateResult<serde_json::Value>;
}

/// Registry of the tools available to workflows.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry with every built-in tool.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for name in BUILTIN_TOOLS {
            if let Some(tool) = builtin(name) {
                registry.register(tool);
            }
        }
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.descriptor().name.clone();
        info!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn list_descriptors(&self) -> Vec<&ToolDescriptor> {
        let mut descriptors: Vec<&ToolDescriptor> =
            self.tools.values().map(|t| t.descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolInvoker for ToolRegistry {
    async fn invoke(
        &self,
        tool_name: &str,
        input: serde_json::Value,
    ) -> OmnigateResult<serde_json::Value> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| OmnigateError::Validation(format!("unknown tool '{tool_name}'")))?;
        tool.invoke(input).await
    }
}

/// Names accepted by [`builtin`].
pub const BUILTIN_TOOLS: &[&str] = &["echo", "json_merge"];

/// Looks up a built-in tool by name.
pub fn builtin(name: &str) -> Option<Arc<dyn Tool>> {
    match name {
        "echo" => Some(Arc::new(EchoTool::new())),
        "json_merge" => Some(Arc::new(JsonMergeTool::new())),
        _ => None,
    }
}

/// Returns its input unchanged.
pub struct EchoTool {
    descriptor: ToolDescriptor,
}

impl EchoTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: "echo".into(),
                description: "Returns its input unchanged".into(),
            },
        }
    }
}

impl Default for EchoTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, input: serde_json::Value) -> OmnigateResult<serde_json::Value> {
        Ok(input)
    }
}

/// Shallow-merges `{"objects": [..]}` left to right; later keys win.
pub struct JsonMergeTool {
    descriptor: ToolDescriptor,
}

impl JsonMergeTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: "json_merge".into(),
                description: "Shallow-merges a list of JSON objects".into(),
            },
        }
    }
}

impl Default for JsonMergeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for JsonMergeTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, input: serde_json::Value) -> OmnigateResult<serde_json::Value> {
        let objects = input
            .get("objects")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                OmnigateError::Validation("json_merge expects an 'objects' array".into())
            })?;

        let mut merged = serde_json::Map::new();
        for (i, obj) in objects.iter().enumerate() {
            let map = obj.as_object().ok_or_else(|| {
                OmnigateError::Validation(format!("json_merge: element {i} is not an object"))
            })?;
            for (k, v) in map {
                merged.insert(k.clone(), v.clone());
            }
        }
        Ok(serde_json::Value::Object(merged))
    }
}
