//! Background supervision: health polling, adaptive concurrency and
//! self-healing.
//!
//! Each sweep is a plain method so tests can drive it directly. [`start`]
//! only wraps them in interval loops that share one cancellation token.
//!
//! [`start`]: AutonomousLoop::start

use crate::collaborator::metrics::{record_or_warn, CONCURRENCY_CEILING};
use crate::concurrency::Adjustment;
use crate::coordinator::WorkflowCoordinator;
use crate::health::{HealthMonitor, HealthReport};
use crate::types::{TaskStatus, WorkflowId, WorkflowStatus};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What one self-healing pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealingReport {
    pub timed_out: usize,
    pub requeued: usize,
    pub purged: usize,
    /// Expired snapshots dropped from the persistence collaborator.
    pub snapshots_purged: usize,
}

struct Running {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Owns the three background sweeps and their lifecycle.
pub struct AutonomousLoop {
    coordinator: Arc<WorkflowCoordinator>,
    health: Arc<HealthMonitor>,
    running: Mutex<Option<Running>>,
}

impl AutonomousLoop {
    pub fn new(coordinator: Arc<WorkflowCoordinator>, health: Arc<HealthMonitor>) -> Arc<Self> {
        Arc::new(Self {
            coordinator,
            health,
            running: Mutex::new(None),
        })
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Spawns the sweeps. Returns false if they were already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            return false;
        }

        let sweeps = &self.coordinator.config().sweeps;
        let token = CancellationToken::new();
        let handles = vec![
            self.spawn_sweep(
                "health",
                Duration::from_secs(sweeps.health_interval_secs),
                token.clone(),
                |this| async move {
                    this.health_sweep().await;
                },
            ),
            self.spawn_sweep(
                "scaling",
                Duration::from_secs(sweeps.scaling_interval_secs),
                token.clone(),
                |this| async move {
                    this.adapt_concurrency().await;
                },
            ),
            self.spawn_sweep(
                "healing",
                Duration::from_secs(sweeps.healing_interval_secs),
                token.clone(),
                |this| async move {
                    this.self_heal(Utc::now()).await;
                },
            ),
        ];
        *running = Some(Running { token, handles });
        info!("Autonomous loop started");
        true
    }

    /// Stops the sweeps and waits for them to exit. Returns false if they
    /// were not running.
    pub async fn stop(&self) -> bool {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return false;
        };
        running.token.cancel();
        for handle in running.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Autonomous sweep ended abnormally");
            }
        }
        info!("Autonomous loop stopped");
        true
    }

    fn spawn_sweep<F, Fut>(
        self: &Arc<Self>,
        name: &'static str,
        period: Duration,
        token: CancellationToken,
        sweep: F,
    ) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        debug!(sweep = name, "Running sweep");
                        sweep(Arc::clone(&this)).await;
                    }
                }
            }
            debug!(sweep = name, "Sweep exited");
        })
    }

    // --- Sweeps ---

    /// Probes every collaborator.
    pub async fn health_sweep(&self) -> HealthReport {
        self.health.check_all().await
    }

    /// Moves the concurrency ceiling one step toward the current load.
    pub async fn adapt_concurrency(&self) -> Adjustment {
        let limiter = self.coordinator.limiter();
        let depth = self.coordinator.queue_depth();
        let before = limiter.ceiling();
        let adjustment = limiter.adjust(depth);
        if adjustment != Adjustment::Unchanged {
            info!(
                queue_depth = depth,
                in_flight = limiter.in_flight(),
                from = before,
                to = limiter.ceiling(),
                "Concurrency ceiling adjusted"
            );
        }
        record_or_warn(
            self.coordinator.collaborators().metrics.as_ref(),
            CONCURRENCY_CEILING,
            limiter.ceiling() as f64,
            &[],
        )
        .await;
        adjustment
    }

    /// Marks running tasks past their timeout as failed. Running it again on
    /// the same tasks changes nothing.
    pub fn sweep_stuck_tasks(&self, now: DateTime<Utc>) -> usize {
        let store = self.coordinator.task_store();
        let default_timeout = self.coordinator.config().default_task_timeout();
        let mut timed_out = 0;
        for task in store.list(Some(TaskStatus::Running)) {
            if !task.is_stuck(now, default_timeout) {
                continue;
            }
            let limit = task.effective_timeout(default_timeout);
            let error = format!(
                "task '{}' timed out after {}ms",
                task.id,
                limit.as_millis()
            );
            // re-checked under the store lock so a concurrent completion wins
            let committed = store.update(&task.id, &mut |t| {
                t.is_stuck(now, default_timeout) && t.fail(error.clone(), now)
            });
            match committed {
                Ok(Some(_)) => {
                    warn!(task_id = %task.id, workflow_id = %task.workflow_id, "Stuck task marked failed");
                    timed_out += 1;
                }
                Ok(None) => {}
                Err(e) => warn!(task_id = %task.id, error = %e, "Stuck-task sweep failed"),
            }
        }
        timed_out
    }

    /// Requeues failed tasks that still have retry budget and belong to a
    /// running workflow.
    pub fn requeue_failed_tasks(&self) -> usize {
        let running: HashSet<WorkflowId> = self
            .coordinator
            .workflow_store()
            .list(Some(WorkflowStatus::Running))
            .into_iter()
            .map(|w| w.id)
            .collect();
        let store = self.coordinator.task_store();
        let mut requeued = 0;
        for task in store.list(Some(TaskStatus::Failed)) {
            if !task.has_retry_budget() || !running.contains(&task.workflow_id) {
                continue;
            }
            match store.update(&task.id, &mut |t| t.requeue()) {
                Ok(Some(t)) => {
                    info!(task_id = %t.id, retries = t.retries, "Failed task requeued");
                    requeued += 1;
                }
                Ok(None) => {}
                Err(e) => warn!(task_id = %task.id, error = %e, "Requeue failed"),
            }
        }
        requeued
    }

    async fn purge_snapshots(&self) -> usize {
        match self.coordinator.collaborators().persistence.purge_expired().await {
            Ok(purged) => purged,
            Err(e) => {
                warn!(error = %e, "Snapshot purge failed");
                0
            }
        }
    }

    /// One self-healing pass: stuck tasks, then retryable failures, then
    /// expired workflows and their snapshots.
    pub async fn self_heal(&self, now: DateTime<Utc>) -> HealingReport {
        let report = HealingReport {
            timed_out: self.sweep_stuck_tasks(now),
            requeued: self.requeue_failed_tasks(),
            purged: self.coordinator.purge_expired(now),
            snapshots_purged: self.purge_snapshots().await,
        };
        if report != HealingReport::default() {
            info!(
                timed_out = report.timed_out,
                requeued = report.requeued,
                purged = report.purged,
                snapshots_purged = report.snapshots_purged,
                "Self-healing pass"
            );
        }
        report
    }
}
