use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use super::types::{JobReport, JobState};

/// Receives every state change of every job.
#[async_trait]
pub trait JobObserver: Send + Sync {
    async fn on_transition(&self, job_id: Uuid, from: JobState, to: JobState);

    /// A best-effort step substituted a fallback value.
    async fn on_degraded(&self, _job_id: Uuid, _stage: &'static str, _reason: &str) {}

    async fn on_finished(&self, _report: &JobReport) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

#[async_trait]
impl JobObserver for TracingObserver {
    async fn on_transition(&self, job_id: Uuid, from: JobState, to: JobState) {
        info!(job = %job_id, ?from, ?to, "job transition");
    }

    async fn on_degraded(&self, job_id: Uuid, stage: &'static str, reason: &str) {
        warn!(job = %job_id, stage, reason, "degraded outcome");
    }

    async fn on_finished(&self, report: &JobReport) {
        info!(
            job = %report.job_id,
            state = ?report.state,
            file = report.file_name.as_deref().unwrap_or("-"),
            error = report.error.as_deref().unwrap_or(""),
            "job finished"
        );
    }
}
