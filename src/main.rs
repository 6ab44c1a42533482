use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use strategy_worker::app::create_app;
use strategy_worker::logging::{init_logging, LoggingConfig};
use strategy_worker::services::job_scheduler_service::{JobContext, JobSchedulerService};
use strategy_worker::services::lifecycle::wait_for_shutdown_signal;
use strategy_worker::store::PgStore;
use strategy_worker::{
    AppState, JobWorker, LifecycleOwner, NotificationListener, PipelineContext,
    PipelineOrchestrator, ProviderSet, WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging FIRST
    init_logging(LoggingConfig::from_env())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let config = WorkerConfig::from_env()?;
    info!(
        "🔧 strategy-worker {} starting (mode: {:?})",
        config.worker_id, config.mode
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let providers = ProviderSet::from_config(&config)?;
    let ctx = PipelineContext::new(store.clone(), providers, config.pipeline.clone());
    let orchestrator = Arc::new(PipelineOrchestrator::new(ctx));
    let lifecycle = Arc::new(LifecycleOwner::new(config.shutdown_grace));

    if config.mode.runs_worker() {
        let worker = JobWorker::new(orchestrator.clone(), &config.worker_id, config.poll_interval);
        lifecycle.spawn("job worker", worker.run(lifecycle.shutdown_token()));
    }

    if config.mode.runs_listener() {
        let slot = lifecycle.acquire_listener_slot()?;
        let listener = NotificationListener::new(
            &orchestrator,
            &config.upstream_channel,
            config.listener_reconnect_delay,
        );
        let listener_pool = pool.clone();
        let token = lifecycle.shutdown_token();
        lifecycle.spawn("notification listener", async move {
            if let Err(e) = listener.run(listener_pool, slot, token).await {
                error!("Notification listener exited with error: {}", e);
            }
        });
    }

    let mut scheduler = if config.mode.runs_sweep() && config.sweep.enabled {
        let mut scheduler = JobSchedulerService::new(JobContext {
            pool: pool.clone(),
            jobs: store.clone(),
            settings: config.sweep.clone(),
        })
        .await?;
        scheduler.start().await?;
        Some(scheduler)
    } else {
        info!("Sweep scheduler disabled");
        None
    };

    if config.http_enabled {
        let app = create_app(AppState {
            pool: pool.clone(),
            jobs: store.clone(),
        });
        let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        info!("🚀 Admin API running at http://{}/", addr);

        let token = lifecycle.shutdown_token();
        lifecycle.spawn("admin http", async move {
            let shutdown = async move { token.cancelled().await };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                error!("Admin API server error: {}", e);
            }
        });
    } else {
        info!("Admin API disabled");
    }

    wait_for_shutdown_signal().await;

    if let Some(scheduler) = scheduler.as_mut() {
        if let Err(e) = scheduler.stop().await {
            warn!("Failed to stop sweep scheduler: {}", e);
        }
    }

    if let Err(e) = lifecycle.shutdown().await {
        warn!("{}", e);
    }

    pool.close().await;
    info!("👋 strategy-worker stopped");
    Ok(())
}
