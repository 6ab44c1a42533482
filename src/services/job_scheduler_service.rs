use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::SweepSettings;
use crate::db::job_run_queries;
use crate::errors::AppError;
use crate::jobs::{missed_consolidation_job, stale_running_jobs_job};
use crate::store::JobStore;

// Context passed to sweep functions
#[derive(Clone)]
pub struct JobContext {
    pub pool: PgPool,
    pub jobs: Arc<dyn JobStore>,
    pub settings: SweepSettings,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct JobResult {
    pub items_processed: i32,
    pub items_failed: i32,
}

pub struct JobSchedulerService {
    scheduler: JobScheduler,
    context: JobContext,
}

impl JobSchedulerService {
    pub async fn new(context: JobContext) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::External(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self { scheduler, context })
    }

    /// Register the safety-net sweeps and start ticking.
    pub async fn start(&mut self) -> Result<(), AppError> {
        info!("🚀 Starting sweep scheduler...");

        let schedule = self.context.settings.schedule.clone();

        self.schedule_job(
            &schedule,
            "requeue_missed_consolidations",
            "Re-enqueue consolidation for snapshots whose notification was missed",
            missed_consolidation_job::requeue_missed_consolidations,
        )
        .await?;

        self.schedule_job(
            &schedule,
            "report_stale_running_jobs",
            "Report (and optionally reap) jobs stuck in running",
            stale_running_jobs_job::report_stale_running_jobs,
        )
        .await?;

        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::External(format!("Failed to start scheduler: {}", e)))?;

        info!("✅ Sweep scheduler started with 2 jobs");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), AppError> {
        info!("🛑 Stopping sweep scheduler...");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::External(format!("Failed to stop scheduler: {}", e)))?;
        info!("✅ Sweep scheduler stopped");
        Ok(())
    }

    async fn schedule_job<F, Fut>(
        &mut self,
        schedule: &str,
        job_name: &'static str,
        description: &str,
        job_fn: F,
    ) -> Result<(), AppError>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<JobResult, AppError>> + Send + 'static,
    {
        let context = self.context.clone();
        let job_fn = Arc::new(job_fn);

        let job = Job::new_async(schedule, move |_uuid, _l| {
            let context = context.clone();
            let job_fn = job_fn.clone();
            Box::pin(async move {
                execute_job_with_tracking(job_name, context, job_fn).await;
            })
        })
        .map_err(|e| AppError::External(format!("Failed to create job {}: {}", job_name, e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::External(format!("Failed to add job {}: {}", job_name, e)))?;

        info!("📅 Scheduled: {} - {} [cron: {}]", job_name, description, schedule);
        Ok(())
    }
}

// Every run gets a job_runs row
async fn execute_job_with_tracking<F, Fut>(job_name: &str, context: JobContext, job_fn: Arc<F>)
where
    F: Fn(JobContext) -> Fut,
    Fut: std::future::Future<Output = Result<JobResult, AppError>>,
{
    info!("🏃 Starting sweep: {}", job_name);
    let pool = context.pool.clone();
    let started_at = Utc::now();

    let run_id = match job_run_queries::insert_running(&pool, job_name).await {
        Ok(id) => id,
        Err(e) => {
            error!("Failed to record sweep start: {}", e);
            return;
        }
    };

    let result = job_fn(context).await;
    let duration_ms = (Utc::now() - started_at).num_milliseconds();

    match result {
        Ok(job_result) => {
            info!(
                "✅ Sweep completed: {} (processed: {}, failed: {}, duration: {}ms)",
                job_name, job_result.items_processed, job_result.items_failed, duration_ms
            );

            if let Err(e) = job_run_queries::mark_success(
                &pool,
                run_id,
                job_result.items_processed,
                job_result.items_failed,
                duration_ms,
            )
            .await
            {
                error!("Failed to record sweep success: {}", e);
            }
        }
        Err(e) => {
            error!("❌ Sweep failed: {} - {}", job_name, e);

            if let Err(e) = job_run_queries::mark_failure(&pool, run_id, &e.to_string(), duration_ms).await {
                error!("Failed to record sweep failure: {}", e);
            }
        }
    }
}
