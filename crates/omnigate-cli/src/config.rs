use anyhow::Context;
use omnigate_orchestrator::collaborator::tool::{builtin, BUILTIN_TOOLS};
use omnigate_orchestrator::collaborator::ToolRegistry;
use omnigate_orchestrator::OrchestratorConfig;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize, Default)]
pub struct OmnigateConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Built-in tools to enable. Empty enables all of them.
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Start the autonomous loop together with the server.
    #[serde(default = "default_autonomous")]
    pub autonomous: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            autonomous: default_autonomous(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct SecurityConfig {
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default)]
    pub admin_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ToolConfig {
    pub name: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_autonomous() -> bool {
    true
}

impl OmnigateConfig {
    /// Reads and validates the config file. A missing file yields the
    /// defaults.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let config = match tokio::fs::read_to_string(path).await {
            Ok(raw) => Self::parse(&raw)
                .with_context(|| format!("Invalid config file '{}'", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            }
        };
        Ok(config)
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.orchestrator.validate()?;
        Ok(config)
    }

    /// Registry holding the configured built-in tools.
    pub fn tool_registry(&self) -> anyhow::Result<ToolRegistry> {
        if self.tools.is_empty() {
            return Ok(ToolRegistry::with_builtins());
        }
        let mut registry = ToolRegistry::new();
        for tool in &self.tools {
            let found = builtin(&tool.name).ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown tool '{}' in config (available: {})",
                    tool.name,
                    BUILTIN_TOOLS.join(", ")
                )
            })?;
            registry.register(found);
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = OmnigateConfig::parse("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert!(config.server.autonomous);
        assert!(config.security.api_keys.is_empty());
        assert_eq!(config.orchestrator, OrchestratorConfig::default());
        assert_eq!(config.tool_registry().unwrap().tool_count(), BUILTIN_TOOLS.len());
    }

    #[test]
    fn test_full_config() {
        let config = OmnigateConfig::parse(
            r#"
            [server]
            host = "127.0.0.1"
            port = 8080
            autonomous = false

            [security]
            api_keys = ["k1"]
            admin_keys = ["root"]

            [orchestrator]
            default_max_retries = 5

            [orchestrator.concurrency]
            initial = 4

            [[tools]]
            name = "echo"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(!config.server.autonomous);
        assert_eq!(config.security.admin_keys, vec!["root"]);
        assert_eq!(config.orchestrator.default_max_retries, 5);
        assert_eq!(config.orchestrator.concurrency.initial, 4);
        let registry = config.tool_registry().unwrap();
        assert_eq!(registry.tool_count(), 1);
        assert!(registry.get("echo").is_some());
    }

    #[test]
    fn test_unknown_tool_rejected() {
        let config = OmnigateConfig::parse("[[tools]]\nname = \"shell\"\n").unwrap();
        let err = config.tool_registry().unwrap_err().to_string();
        assert!(err.contains("Unknown tool 'shell'"));
    }

    #[test]
    fn test_invalid_orchestrator_config_rejected() {
        let raw = "[orchestrator.concurrency]\nmin = 10\nmax = 2\n";
        assert!(OmnigateConfig::parse(raw).is_err());
    }

    #[test]
    fn test_shipped_config_parses() {
        let raw = include_str!("../../../omnigate.toml");
        OmnigateConfig::parse(raw).unwrap();
    }
}
