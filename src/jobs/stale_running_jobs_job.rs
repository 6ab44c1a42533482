//! Stale running job report
//!
//! A worker that dies mid-pipeline leaves its job `running` forever and the
//! partial unique index then blocks every other job for that snapshot. This
//! sweep logs such jobs. Failing them is opt-in (`REAP_STALE_JOBS=true`)
//! because a slow provider call can look exactly like a dead worker.

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::Job;
use crate::services::job_scheduler_service::{JobContext, JobResult};
use crate::store::JobStore;

pub const LEASE_EXPIRED_MESSAGE: &str = "worker lease expired";

pub async fn report_stale_running_jobs(ctx: JobContext) -> Result<JobResult, AppError> {
    let cutoff = Utc::now() - Duration::minutes(ctx.settings.stale_job_minutes);
    let stale = ctx.jobs.running_since(cutoff).await?;

    if stale.is_empty() {
        return Ok(JobResult::default());
    }

    for job in &stale {
        warn!(
            "⏰ Job {} ({}, snapshot {}) running on {} since {:?}",
            job.id,
            job.kind,
            job.snapshot_id,
            job.worker_id.as_deref().unwrap_or("unknown worker"),
            job.started_at
        );
    }

    if !ctx.settings.reap_stale_jobs {
        return Ok(JobResult {
            items_processed: stale.len() as i32,
            items_failed: 0,
        });
    }

    Ok(reap(ctx.jobs.as_ref(), &stale).await)
}

/// Fail each job that is still running. Jobs that finished in the meantime
/// are left untouched.
pub async fn reap(jobs: &dyn JobStore, stale: &[Job]) -> JobResult {
    let mut result = JobResult::default();
    for job in stale {
        match jobs.fail(job.id, LEASE_EXPIRED_MESSAGE).await {
            Ok(true) => {
                info!("🪦 Reaped job {} for snapshot {}", job.id, job.snapshot_id);
                result.items_processed += 1;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Failed to reap job {}: {}", job.id, e);
                result.items_failed += 1;
            }
        }
    }
    result
}
