use crate::types::{Task, TaskId};
use omnigate_core::{OmnigateError, OmnigateResult};
use std::collections::{HashMap, HashSet};

/// Classifies which tasks of one workflow can run next.
///
/// Stateless: every call reads the task snapshot it is given, so the
/// coordinator re-invokes it after each batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct DependencyScheduler;

impl DependencyScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Pending tasks whose dependencies are all in `resolved`, highest
    /// priority first. Equal priorities keep the order of `tasks`, which the
    /// coordinator passes in creation order.
    ///
    /// An empty ready set while unresolved tasks remain means the graph can
    /// never make progress and yields a [`OmnigateError::Graph`].
    pub fn ready_set<'a>(
        &self,
        tasks: &'a [Task],
        resolved: &HashSet<TaskId>,
    ) -> OmnigateResult<Vec<&'a Task>> {
        let mut ready: Vec<&Task> = tasks.iter().filter(|t| t.is_ready(resolved)).collect();
        // sort_by_key is stable
        ready.sort_by_key(|t| std::cmp::Reverse(t.priority.weight()));

        let unresolved = tasks.iter().filter(|t| !resolved.contains(&t.id)).count();
        if ready.is_empty() && unresolved > 0 {
            return Err(self.diagnose(tasks, unresolved));
        }
        Ok(ready)
    }

    /// Rejects dangling references and cycles before anything runs.
    pub fn validate(&self, tasks: &[Task]) -> OmnigateResult<()> {
        if let Some((task, dep)) = find_dangling(tasks) {
            return Err(OmnigateError::Graph(format!(
                "task '{task}' depends on unknown task '{dep}'"
            )));
        }
        if let Some(cycle) = detect_cycle(tasks) {
            return Err(OmnigateError::Graph(format!(
                "dependency cycle: {}",
                cycle.join(" -> ")
            )));
        }
        Ok(())
    }

    fn diagnose(&self, tasks: &[Task], unresolved: usize) -> OmnigateError {
        match self.validate(tasks) {
            Err(e) => e,
            Ok(()) => OmnigateError::Graph(format!(
                "no task is ready but {unresolved} of {} remain unresolved",
                tasks.len()
            )),
        }
    }
}

/// First `(task, dependency)` pair whose dependency is not in `tasks`.
pub fn find_dangling(tasks: &[Task]) -> Option<(TaskId, TaskId)> {
    let ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    tasks.iter().find_map(|t| {
        t.dependencies
            .iter()
            .find(|dep| !ids.contains(dep.as_str()))
            .map(|dep| (t.id.clone(), dep.clone()))
    })
}

/// Returns the ids along one dependency cycle, first id repeated at the end.
pub fn detect_cycle(tasks: &[Task]) -> Option<Vec<TaskId>> {
    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut visited: HashMap<&str, u8> = HashMap::new();
    let mut path: Vec<&str> = Vec::new();
    for task in tasks {
        if let Some(cycle) = dfs_cycle(task.id.as_str(), &by_id, &mut visited, &mut path) {
            return Some(cycle);
        }
    }
    None
}

fn dfs_cycle<'a>(
    id: &'a str,
    by_id: &HashMap<&'a str, &'a Task>,
    visited: &mut HashMap<&'a str, u8>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<TaskId>> {
    match visited.get(id) {
        Some(1) => {
            // back edge
            let start = path.iter().position(|p| *p == id).unwrap_or(0);
            let mut cycle: Vec<TaskId> = path[start..].iter().map(|s| s.to_string()).collect();
            cycle.push(id.to_string());
            return Some(cycle);
        }
        Some(2) => return None,
        _ => {}
    }
    visited.insert(id, 1);
    path.push(id);
    if let Some(task) = by_id.get(id) {
        for dep in &task.dependencies {
            if let Some(cycle) = dfs_cycle(dep.as_str(), by_id, visited, path) {
                return Some(cycle);
            }
        }
    }
    path.pop();
    visited.insert(id, 2);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Priority, TaskType};
    use chrono::Utc;

    fn task(name: &str, deps: &[&str]) -> Task {
        Task::new("wf", name, TaskType::Ai, serde_json::Value::Null)
            .with_dependencies(deps.iter().map(|d| format!("wf/{d}")))
    }

    fn resolved(names: &[&str]) -> HashSet<TaskId> {
        names.iter().map(|n| format!("wf/{n}")).collect()
    }

    fn ids(ready: &[&Task]) -> Vec<String> {
        ready.iter().map(|t| t.name.clone()).collect()
    }

    #[test]
    fn test_independent_tasks_are_ready() {
        let tasks = vec![task("a", &[]), task("b", &[])];
        let ready = DependencyScheduler::new()
            .ready_set(&tasks, &HashSet::new())
            .unwrap();
        assert_eq!(ids(&ready), vec!["a", "b"]);
    }

    #[test]
    fn test_dependency_blocks_until_resolved() {
        let tasks = vec![task("a", &[]), task("b", &["a"])];
        let sched = DependencyScheduler::new();
        assert_eq!(ids(&sched.ready_set(&tasks, &HashSet::new()).unwrap()), vec!["a"]);

        let mut tasks = tasks;
        let now = Utc::now();
        tasks[0].begin_attempt(now);
        tasks[0].complete(serde_json::json!("ok"), now);
        let ready = sched.ready_set(&tasks, &resolved(&["a"])).unwrap();
        assert_eq!(ids(&ready), vec!["b"]);
    }

    #[test]
    fn test_priority_orders_ready_set_stably() {
        let tasks = vec![
            task("low", &[]).with_priority(Priority::Low),
            task("m1", &[]),
            task("crit", &[]).with_priority(Priority::Critical),
            task("m2", &[]),
        ];
        let ready = DependencyScheduler::new()
            .ready_set(&tasks, &HashSet::new())
            .unwrap();
        assert_eq!(ids(&ready), vec!["crit", "m1", "m2", "low"]);
    }

    #[test]
    fn test_all_resolved_gives_empty_ready_set() {
        let tasks = vec![task("a", &[])];
        let ready = DependencyScheduler::new()
            .ready_set(&tasks, &resolved(&["a"]))
            .unwrap();
        assert!(ready.is_empty());
    }

    #[test]
    fn test_cycle_is_graph_error() {
        let tasks = vec![task("a", &["b"]), task("b", &["a"])];
        let err = DependencyScheduler::new()
            .ready_set(&tasks, &HashSet::new())
            .unwrap_err();
        assert!(matches!(err, OmnigateError::Graph(_)));
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let tasks = vec![task("a", &["a"])];
        let cycle = detect_cycle(&tasks).unwrap();
        assert_eq!(cycle, vec!["wf/a".to_string(), "wf/a".to_string()]);
    }

    #[test]
    fn test_transitive_cycle_path() {
        let tasks = vec![task("a", &["b"]), task("b", &["c"]), task("c", &["a"])];
        let cycle = detect_cycle(&tasks).unwrap();
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 4);
    }

    #[test]
    fn test_diamond_has_no_cycle() {
        let tasks = vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("d", &["b", "c"]),
        ];
        assert!(detect_cycle(&tasks).is_none());
        assert!(DependencyScheduler::new().validate(&tasks).is_ok());
    }

    #[test]
    fn test_dangling_reference_is_graph_error() {
        let tasks = vec![task("a", &["ghost"])];
        assert_eq!(
            find_dangling(&tasks),
            Some(("wf/a".to_string(), "wf/ghost".to_string()))
        );
        let err = DependencyScheduler::new()
            .ready_set(&tasks, &HashSet::new())
            .unwrap_err();
        assert!(err.to_string().contains("unknown task 'wf/ghost'"));
    }
}
