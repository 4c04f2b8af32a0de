use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the orchestrator. Every field has a default so an empty
/// `[orchestrator]` table is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Timeout applied to tasks that do not carry their own.
    #[serde(default = "default_task_timeout_ms")]
    pub default_task_timeout_ms: u64,
    /// Retry budget applied to tasks when the request does not set one.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    /// TTL of persisted snapshots and of terminal workflows in the registry.
    #[serde(default = "default_workflow_retention_secs")]
    pub workflow_retention_secs: u64,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub sweeps: SweepConfig,
}

/// Bounds for the adaptive concurrency ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_initial")]
    pub initial: usize,
    #[serde(default = "default_min")]
    pub min: usize,
    #[serde(default = "default_max")]
    pub max: usize,
    #[serde(default = "default_step")]
    pub step: usize,
}

/// Intervals of the three autonomous-loop sweeps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,
    #[serde(default = "default_scaling_interval")]
    pub scaling_interval_secs: u64,
    #[serde(default = "default_healing_interval")]
    pub healing_interval_secs: u64,
}

fn default_task_timeout_ms() -> u64 {
    30_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_workflow_retention_secs() -> u64 {
    86_400
}
fn default_initial() -> usize {
    8
}
fn default_min() -> usize {
    2
}
fn default_max() -> usize {
    64
}
fn default_step() -> usize {
    2
}
fn default_health_interval() -> u64 {
    30
}
fn default_scaling_interval() -> u64 {
    10
}
fn default_healing_interval() -> u64 {
    15
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_task_timeout_ms: default_task_timeout_ms(),
            default_max_retries: default_max_retries(),
            workflow_retention_secs: default_workflow_retention_secs(),
            concurrency: ConcurrencyConfig::default(),
            sweeps: SweepConfig::default(),
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            initial: default_initial(),
            min: default_min(),
            max: default_max(),
            step: default_step(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            health_interval_secs: default_health_interval(),
            scaling_interval_secs: default_scaling_interval(),
            healing_interval_secs: default_healing_interval(),
        }
    }
}

impl OrchestratorConfig {
    pub fn default_task_timeout(&self) -> Duration {
        Duration::from_millis(self.default_task_timeout_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.workflow_retention_secs)
    }

    /// Rejects bounds that would leave the limiter without a usable range.
    pub fn validate(&self) -> omnigate_core::OmnigateResult<()> {
        let c = &self.concurrency;
        if c.min == 0 {
            return Err(omnigate_core::OmnigateError::Config(
                "concurrency.min must be at least 1".into(),
            ));
        }
        if c.min > c.max {
            return Err(omnigate_core::OmnigateError::Config(format!(
                "concurrency.min ({}) exceeds concurrency.max ({})",
                c.min, c.max
            )));
        }
        if c.step == 0 {
            return Err(omnigate_core::OmnigateError::Config(
                "concurrency.step must be at least 1".into(),
            ));
        }
        let sweeps = &self.sweeps;
        if sweeps.health_interval_secs == 0
            || sweeps.scaling_interval_secs == 0
            || sweeps.healing_interval_secs == 0
        {
            return Err(omnigate_core::OmnigateError::Config(
                "sweep intervals must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
