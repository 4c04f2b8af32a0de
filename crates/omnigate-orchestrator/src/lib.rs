//! Task and workflow orchestration for the omnigate gateway.
//!
//! A [`WorkflowRequest`] is turned into a graph of typed tasks. The
//! [`WorkflowCoordinator`] runs that graph in dependency order, one batch of
//! ready tasks at a time, and folds the task results into a single
//! workflow result. The [`AutonomousLoop`] runs beside it, polling
//! collaborator health, resizing the concurrency ceiling and healing stuck
//! or failed tasks.
//!
//! # Main types
//!
//! - [`TaskStore`] / [`WorkflowStore`]: Record storage with per-record atomic updates.
//! - [`DependencyScheduler`]: Ready-set computation and cycle detection.
//! - [`TaskExecutor`]: One task attempt with timeout and retry bookkeeping.
//! - [`WorkflowCoordinator`]: Graph construction and batch-by-batch execution.
//! - [`AutonomousLoop`]: Health, scaling and self-healing sweeps.

pub mod autonomous;
pub mod collaborator;
pub mod concurrency;
pub mod config;
pub mod coordinator;
pub mod executor;
pub mod handlers;
pub mod health;
pub mod request;
pub mod scheduler;
pub mod store;
pub mod types;

pub use autonomous::{AutonomousLoop, HealingReport};
pub use collaborator::{Collaborators, HealthProbe};
pub use concurrency::{Adjustment, ConcurrencyLimiter};
pub use config::{ConcurrencyConfig, OrchestratorConfig, SweepConfig};
pub use coordinator::{snapshot_key, CoordinatorBuilder, WorkflowCoordinator, WorkflowResult};
pub use executor::{HandlerRegistry, TaskExecutor, TaskHandler, TaskOutcome};
pub use health::{HealthMonitor, HealthReport, ProbeReport};
pub use request::WorkflowRequest;
pub use scheduler::DependencyScheduler;
pub use store::{InMemoryTaskStore, InMemoryWorkflowStore, TaskStore, WorkflowStore};
pub use types::{
    Priority, Task, TaskId, TaskStatus, TaskType, Workflow, WorkflowId, WorkflowSnapshot,
    WorkflowStatus,
};
