#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use chrono::Utc;
use common::*;
use omnigate_orchestrator::collaborator::{InMemoryPersistence, PersistenceStore};
use omnigate_orchestrator::{
    snapshot_key, AutonomousLoop, Collaborators, HealingReport, HealthMonitor, OrchestratorConfig,
    TaskStatus, WorkflowCoordinator, WorkflowStatus,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn autonomous(coordinator: &Arc<WorkflowCoordinator>) -> Arc<AutonomousLoop> {
    let collaborators = coordinator.collaborators();
    let health = Arc::new(HealthMonitor::new(
        collaborators.probes(),
        Arc::clone(&collaborators.metrics),
    ));
    AutonomousLoop::new(Arc::clone(coordinator), health)
}

/// Puts a task into `running` as if an attempt had started `ago` in the past.
fn plant_running(c: &WorkflowCoordinator, task_id: &str, ago: chrono::Duration) {
    let started = Utc::now() - ago;
    let committed = c
        .task_store()
        .update(task_id, &mut |t| t.begin_attempt(started))
        .unwrap();
    assert!(committed.is_some());
}

#[tokio::test]
async fn stuck_task_is_failed_once() {
    let c = coordinator_with(vec![]);
    let auto = autonomous(&c);
    let wf = c
        .create_workflow(request(json!({
            "tools": [{"name": "echo"}],
            "timeoutMs": 100,
            "maxRetries": 0
        })))
        .await
        .unwrap();
    let task_id = wf.tasks[0].clone();
    plant_running(&c, &task_id, chrono::Duration::seconds(1));

    let now = Utc::now();
    assert_eq!(auto.sweep_stuck_tasks(now), 1);
    let after_first = c.get_task(&task_id).unwrap();
    assert_eq!(after_first.status, TaskStatus::Failed);
    assert!(after_first
        .error
        .as_deref()
        .unwrap()
        .contains("timed out after 100ms"));

    assert_eq!(auto.sweep_stuck_tasks(Utc::now()), 0);
    assert_eq!(c.get_task(&task_id).unwrap(), after_first);
}

#[tokio::test]
async fn task_within_timeout_is_left_alone() {
    let c = coordinator_with(vec![]);
    let auto = autonomous(&c);
    let wf = c
        .create_workflow(request(json!({"tools": [{"name": "echo"}]})))
        .await
        .unwrap();
    plant_running(&c, &wf.tasks[0], chrono::Duration::milliseconds(10));

    assert_eq!(auto.sweep_stuck_tasks(Utc::now()), 0);
    assert_eq!(
        c.get_task(&wf.tasks[0]).unwrap().status,
        TaskStatus::Running
    );
}

#[tokio::test]
async fn requeue_only_touches_running_workflows() {
    let c = coordinator_with(vec![]);
    let auto = autonomous(&c);
    let wf = c
        .create_workflow(request(json!({
            "tools": [{"name": "echo"}],
            "timeoutMs": 100,
            "maxRetries": 2
        })))
        .await
        .unwrap();
    let task_id = wf.tasks[0].clone();
    plant_running(&c, &task_id, chrono::Duration::seconds(1));
    assert_eq!(auto.sweep_stuck_tasks(Utc::now()), 1);

    // workflow is still pending, so the failure is left for the coordinator
    assert_eq!(auto.requeue_failed_tasks(), 0);

    c.workflow_store()
        .update(&wf.id, &mut |w| {
            w.status = WorkflowStatus::Running;
            true
        })
        .unwrap();
    assert_eq!(auto.requeue_failed_tasks(), 1);
    let task = c.get_task(&task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.retries, 1);
    assert!(task.error.is_none());
}

#[tokio::test]
async fn coordinator_recovers_from_swept_failure() {
    let c = coordinator_with(vec![]);
    let auto = autonomous(&c);
    let wf = c
        .create_workflow(request(json!({
            "tools": [{"name": "echo", "input": "again"}],
            "timeoutMs": 100,
            "maxRetries": 1
        })))
        .await
        .unwrap();
    plant_running(&c, &wf.tasks[0], chrono::Duration::seconds(1));
    auto.sweep_stuck_tasks(Utc::now());

    // the loop requeues the swept failure before scheduling
    let result = c.execute_workflow(&wf.id).await.unwrap();
    assert_eq!(result[&wf.tasks[0]], json!("again"));
    assert_eq!(c.get_task(&wf.tasks[0]).unwrap().retries, 1);
}

#[tokio::test]
async fn self_heal_purges_expired_workflows() {
    let c = coordinator_with(vec![]);
    let auto = autonomous(&c);
    let wf = c
        .create_workflow(request(json!({"tools": [{"name": "echo"}]})))
        .await
        .unwrap();
    c.execute_workflow(&wf.id).await.unwrap();
    let snapshot = c
        .collaborators()
        .persistence
        .retrieve(&snapshot_key(&wf.id))
        .await
        .unwrap();
    assert!(snapshot.is_some());

    let retention = chrono::Duration::from_std(c.config().retention()).unwrap();
    let later = Utc::now() + retention + chrono::Duration::seconds(1);
    let report = auto.self_heal(later).await;
    assert_eq!(
        report,
        HealingReport {
            timed_out: 0,
            requeued: 0,
            purged: 1,
            snapshots_purged: 0
        }
    );
    assert!(c.get_workflow(&wf.id).is_err());
    assert!(c.get_task(&wf.tasks[0]).is_err());
}

#[tokio::test(start_paused = true)]
async fn self_heal_drops_expired_snapshots() {
    let persistence = Arc::new(InMemoryPersistence::new());
    let collaborators = Collaborators {
        persistence: persistence.clone(),
        ..collaborators_with(vec![])
    };
    let c = WorkflowCoordinator::new(OrchestratorConfig::default(), collaborators);
    let auto = autonomous(&c);
    c.submit(request(json!({"tools": [{"name": "echo"}]})))
        .await
        .unwrap();
    assert_eq!(persistence.len(), 1);

    // nothing has expired yet
    assert_eq!(auto.self_heal(Utc::now()).await.snapshots_purged, 0);
    assert_eq!(persistence.len(), 1);

    tokio::time::advance(c.config().retention() + Duration::from_secs(1)).await;
    let report = auto.self_heal(Utc::now()).await;
    assert_eq!(report.snapshots_purged, 1);
    assert!(persistence.is_empty());
}

#[tokio::test]
async fn scaling_grows_under_backlog() {
    let mut config = omnigate_orchestrator::OrchestratorConfig::default();
    config.concurrency.initial = 2;
    config.concurrency.min = 2;
    config.concurrency.max = 8;
    config.concurrency.step = 2;
    let c = WorkflowCoordinator::new(config, collaborators_with(vec![]));
    let auto = autonomous(&c);

    let tools: Vec<_> = (0..6)
        .map(|i| json!({"id": format!("t{i}"), "name": "echo"}))
        .collect();
    let wf = c
        .create_workflow(request(json!({"tools": tools})))
        .await
        .unwrap();
    c.workflow_store()
        .update(&wf.id, &mut |w| {
            w.status = WorkflowStatus::Running;
            true
        })
        .unwrap();
    assert_eq!(c.queue_depth(), 6);

    auto.adapt_concurrency().await;
    assert_eq!(c.limiter().ceiling(), 4);
    auto.adapt_concurrency().await;
    assert_eq!(c.limiter().ceiling(), 6);
}

#[tokio::test(start_paused = true)]
async fn background_sweeps_run_on_their_intervals() {
    let c = coordinator_with(vec![]);
    let auto = autonomous(&c);
    assert!(auto.health().last_report().is_none());

    assert!(auto.start());
    let interval = c.config().sweeps.health_interval_secs;
    tokio::time::sleep(Duration::from_secs(interval + 1)).await;
    let report = auto.health().last_report().expect("health sweep ran");
    assert!(report.healthy);

    assert!(auto.stop().await);
}
