use crate::collaborator::metrics::{record_or_warn, HEALTH_PROBE};
use crate::collaborator::{Alert, HealthProbe, MetricsSink, Severity};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Upper bound on a single probe; a probe that hangs counts as failed.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    pub name: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one pass over every probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub checked_at: DateTime<Utc>,
    pub probes: Vec<ProbeReport>,
}

/// Runs collaborator probes for the health sweep and the readiness check.
pub struct HealthMonitor {
    probes: Vec<Arc<dyn HealthProbe>>,
    metrics: Arc<dyn MetricsSink>,
    last: RwLock<Option<HealthReport>>,
}

impl HealthMonitor {
    pub fn new(probes: Vec<Arc<dyn HealthProbe>>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            probes,
            metrics,
            last: RwLock::new(None),
        }
    }

    pub fn probe_count(&self) -> usize {
        self.probes.len()
    }

    /// Probes every collaborator, records a `health_probe` metric for each and
    /// raises an alert for each failure. One failing probe never stops the
    /// others.
    pub async fn check_all(&self) -> HealthReport {
        let report = self.run_probes().await;
        for probe in &report.probes {
            record_or_warn(
                self.metrics.as_ref(),
                HEALTH_PROBE,
                if probe.healthy { 1.0 } else { 0.0 },
                &[("collaborator", probe.name.as_str())],
            )
            .await;
            if let Some(error) = &probe.error {
                warn!(collaborator = %probe.name, error = %error, "Health probe failed");
                let alert = Alert::new(
                    probe.name.clone(),
                    format!("health probe failed: {error}"),
                    Severity::Warning,
                );
                if let Err(e) = self.metrics.record_alert(alert).await {
                    warn!(collaborator = %probe.name, error = %e, "Failed to record alert");
                }
            }
        }
        *self.last.write() = Some(report.clone());
        report
    }

    /// True only if every probe succeeds right now. No metrics are recorded.
    pub async fn is_ready(&self) -> bool {
        self.run_probes().await.healthy
    }

    /// Report of the most recent [`check_all`](Self::check_all).
    pub fn last_report(&self) -> Option<HealthReport> {
        self.last.read().clone()
    }

    async fn run_probes(&self) -> HealthReport {
        let checks = self.probes.iter().map(|probe| async move {
            let error = match tokio::time::timeout(PROBE_TIMEOUT, probe.probe()).await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(format!("probe timed out after {}s", PROBE_TIMEOUT.as_secs())),
            };
            ProbeReport {
                name: probe.name().to_string(),
                healthy: error.is_none(),
                error,
            }
        });
        let probes = join_all(checks).await;
        HealthReport {
            healthy: probes.iter().all(|p| p.healthy),
            checked_at: Utc::now(),
            probes,
        }
    }
}
