//! Contracts of the external services the orchestrator calls, plus in-process
//! implementations of each.
//!
//! To plug in a real service, implement the matching trait and pass it to
//! [`Collaborators`].

pub mod ai;
pub mod metrics;
pub mod persistence;
pub mod tool;

pub use ai::{AiProvider, Completion, EchoProvider, Usage};
pub use metrics::{Alert, InMemoryMetrics, MetricAggregate, MetricsSink, Severity};
pub use persistence::{InMemoryPersistence, PersistenceStore};
pub use tool::{EchoTool, JsonMergeTool, Tool, ToolDescriptor, ToolInvoker, ToolRegistry};

use async_trait::async_trait;
use omnigate_core::OmnigateResult;
use std::sync::Arc;

/// The external services one coordinator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub ai: Arc<dyn AiProvider>,
    pub tools: Arc<dyn ToolInvoker>,
    pub persistence: Arc<dyn PersistenceStore>,
    pub metrics: Arc<dyn MetricsSink>,
}

impl Collaborators {
    /// Echo provider, built-in tools, in-memory persistence and metrics.
    pub fn in_memory() -> Self {
        Self {
            ai: Arc::new(EchoProvider::new()),
            tools: Arc::new(ToolRegistry::with_builtins()),
            persistence: Arc::new(InMemoryPersistence::new()),
            metrics: Arc::new(InMemoryMetrics::new()),
        }
    }

    /// One probe per collaborator that exposes a liveness check.
    pub fn probes(&self) -> Vec<Arc<dyn HealthProbe>> {
        vec![
            Arc::new(CollaboratorProbe::ai(Arc::clone(&self.ai))),
            Arc::new(CollaboratorProbe::persistence(Arc::clone(&self.persistence))),
            Arc::new(CollaboratorProbe::metrics(Arc::clone(&self.metrics))),
        ]
    }
}

/// A named liveness check run by the health sweep and the readiness probe.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;

    async fn probe(&self) -> OmnigateResult<()>;
}

/// Exposes a collaborator's `health()` as a [`HealthProbe`].
pub struct CollaboratorProbe {
    name: String,
    target: ProbeTarget,
}

enum ProbeTarget {
    Ai(Arc<dyn AiProvider>),
    Persistence(Arc<dyn PersistenceStore>),
    Metrics(Arc<dyn MetricsSink>),
}

impl CollaboratorProbe {
    pub fn ai(provider: Arc<dyn AiProvider>) -> Self {
        Self {
            name: format!("ai:{}", provider.name()),
            target: ProbeTarget::Ai(provider),
        }
    }

    pub fn persistence(store: Arc<dyn PersistenceStore>) -> Self {
        Self {
            name: "persistence".into(),
            target: ProbeTarget::Persistence(store),
        }
    }

    pub fn metrics(sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            name: "metrics".into(),
            target: ProbeTarget::Metrics(sink),
        }
    }
}

#[async_trait]
impl HealthProbe for CollaboratorProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> OmnigateResult<()> {
        match &self.target {
            ProbeTarget::Ai(p) => p.health().await,
            ProbeTarget::Persistence(p) => p.health().await,
            ProbeTarget::Metrics(m) => m.health().await,
        }
    }
}
