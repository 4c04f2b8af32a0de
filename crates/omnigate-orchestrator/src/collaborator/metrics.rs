use async_trait::async_trait;
use chrono::{DateTime, Utc};
use omnigate_core::OmnigateResult;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::warn;

/// Counter of tasks admitted by workflow creation.
pub const TASKS_ENQUEUED_TOTAL: &str = "tasks_enqueued_total";
/// Counter of task attempts by outcome (tag `status`).
pub const TASKS_PROCESSED_TOTAL: &str = "tasks_processed_total";
/// Wall time of one workflow execution (tag `status`).
pub const WORKFLOW_DURATION_MS: &str = "workflow_duration_ms";
/// 1 when a probe succeeds, 0 otherwise (tag `collaborator`).
pub const HEALTH_PROBE: &str = "health_probe";
/// Current dispatch ceiling after each scaling evaluation.
pub const CONCURRENCY_CEILING: &str = "concurrency_ceiling";

/// Maximum alerts kept by [`InMemoryMetrics`]; older ones are dropped.
pub const MAX_ALERTS: usize = 100;

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// An alert raised by the orchestrator, usually from the health sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub source: String,
    pub message: String,
    pub severity: Severity,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(source: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            severity,
            raised_at: Utc::now(),
        }
    }
}

/// Running aggregate of one metric series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricAggregate {
    pub count: u64,
    pub sum: f64,
    pub last: f64,
}

impl MetricAggregate {
    fn observe(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.last = value;
    }
}

/// Metrics and alerting collaborator.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record_metric(
        &self,
        name: &str,
        value: f64,
        tags: &[(&str, &str)],
    ) -> OmnigateResult<()>;

    async fn record_alert(&self, alert: Alert) -> OmnigateResult<()>;

    /// Aggregates keyed by series (see [`series_key`]).
    async fn aggregates(&self) -> OmnigateResult<HashMap<String, MetricAggregate>>;

    async fn health(&self) -> OmnigateResult<()> {
        Ok(())
    }
}

/// Records a metric, logging instead of failing when the sink errors.
pub async fn record_or_warn(sink: &dyn MetricsSink, name: &str, value: f64, tags: &[(&str, &str)]) {
    if let Err(e) = sink.record_metric(name, value, tags).await {
        warn!(metric = name, error = %e, "Failed to record metric");
    }
}

/// `name` alone, or `name{k=v,...}` with tags sorted by key.
pub fn series_key(name: &str, tags: &[(&str, &str)]) -> String {
    if tags.is_empty() {
        return name.to_string();
    }
    let mut tags = tags.to_vec();
    tags.sort_unstable();
    let rendered: Vec<String> = tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{name}{{{}}}", rendered.join(","))
}

/// Metric name of a series key, without its tags.
pub fn series_name(key: &str) -> &str {
    key.split_once('{').map_or(key, |(name, _)| name)
}

/// Process-local [`MetricsSink`].
#[derive(Default)]
pub struct InMemoryMetrics {
    series: RwLock<HashMap<String, MetricAggregate>>,
    alerts: RwLock<VecDeque<Alert>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<MetricAggregate> {
        self.series.read().get(key).copied()
    }

    /// Most recent alerts, oldest first.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().iter().cloned().collect()
    }

    /// Serialize the current state as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "series": *self.series.read(),
            "alerts": self.alerts(),
        })
    }
}

#[async_trait]
impl MetricsSink for InMemoryMetrics {
    async fn record_metric(
        &self,
        name: &str,
        value: f64,
        tags: &[(&str, &str)],
    ) -> OmnigateResult<()> {
        self.series
            .write()
            .entry(series_key(name, tags))
            .or_default()
            .observe(value);
        Ok(())
    }

    async fn record_alert(&self, alert: Alert) -> OmnigateResult<()> {
        let mut alerts = self.alerts.write();
        if alerts.len() == MAX_ALERTS {
            alerts.pop_front();
        }
        alerts.push_back(alert);
        Ok(())
    }

    async fn aggregates(&self) -> OmnigateResult<HashMap<String, MetricAggregate>> {
        Ok(self.series.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_key_sorts_tags() {
        assert_eq!(series_key("hits", &[]), "hits");
        assert_eq!(
            series_key("hits", &[("z", "1"), ("a", "2")]),
            "hits{a=2,z=1}"
        );
        assert_eq!(series_name("hits{a=2}"), "hits");
        assert_eq!(series_name("hits"), "hits");
    }

    #[tokio::test]
    async fn test_aggregate_count_sum_last() {
        let metrics = InMemoryMetrics::new();
        metrics.record_metric("latency", 10.0, &[]).await.unwrap();
        metrics.record_metric("latency", 30.0, &[]).await.unwrap();
        let agg = metrics.get("latency").unwrap();
        assert_eq!(agg.count, 2);
        assert_eq!(agg.sum, 40.0);
        assert_eq!(agg.last, 30.0);
    }

    #[tokio::test]
    async fn test_tagged_series_are_separate() {
        let metrics = InMemoryMetrics::new();
        metrics
            .record_metric("processed", 1.0, &[("status", "completed")])
            .await
            .unwrap();
        metrics
            .record_metric("processed", 1.0, &[("status", "failed")])
            .await
            .unwrap();
        let all = metrics.aggregates().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.contains_key("processed{status=failed}"));
    }

    #[tokio::test]
    async fn test_alerts_are_bounded() {
        let metrics = InMemoryMetrics::new();
        for i in 0..(MAX_ALERTS + 5) {
            metrics
                .record_alert(Alert::new("probe", format!("alert {i}"), Severity::Warning))
                .await
                .unwrap();
        }
        let alerts = metrics.alerts();
        assert_eq!(alerts.len(), MAX_ALERTS);
        assert_eq!(alerts[0].message, "alert 5");
    }

    #[tokio::test]
    async fn test_to_json_shape() {
        let metrics = InMemoryMetrics::new();
        metrics.record_metric("x", 1.0, &[]).await.unwrap();
        let json = metrics.to_json();
        assert_eq!(json["series"]["x"]["count"], 1);
        assert!(json["alerts"].as_array().unwrap().is_empty());
    }
}
