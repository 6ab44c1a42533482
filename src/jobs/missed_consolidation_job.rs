//! Missed consolidation sweep
//!
//! A snapshot can end up with strategist output and a briefing but no final
//! strategy when its `upstream_ready` notification was published while no
//! listener was connected. This sweep finds such records once they have been
//! idle for `SWEEP_MIN_AGE_MINUTES` and enqueues a `consolidate` job for each.
//! Snapshots that already had `SWEEP_MAX_ATTEMPTS` consolidate jobs are left
//! alone so a permanently failing snapshot cannot loop forever.

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::db::strategy_queries;
use crate::errors::AppError;
use crate::models::JobKind;
use crate::services::job_scheduler_service::{JobContext, JobResult};

pub async fn requeue_missed_consolidations(ctx: JobContext) -> Result<JobResult, AppError> {
    let settings = &ctx.settings;
    let cutoff = Utc::now() - Duration::minutes(settings.min_age_minutes);

    let snapshot_ids = strategy_queries::fetch_awaiting_consolidation(
        &ctx.pool,
        cutoff,
        settings.max_attempts,
        settings.batch_size,
    )
    .await?;

    if snapshot_ids.is_empty() {
        return Ok(JobResult::default());
    }

    info!("🔁 {} snapshot(s) awaiting consolidation", snapshot_ids.len());

    let mut result = JobResult::default();
    for snapshot_id in snapshot_ids {
        match ctx.jobs.enqueue(snapshot_id, JobKind::Consolidate).await {
            Ok(outcome) => {
                if outcome.was_created() {
                    info!("Enqueued consolidate job {} for snapshot {}", outcome.job().id, snapshot_id);
                }
                result.items_processed += 1;
            }
            Err(e) => {
                warn!("Failed to enqueue consolidation for snapshot {}: {}", snapshot_id, e);
                result.items_failed += 1;
            }
        }
    }

    Ok(result)
}
