//! Background worker that turns location snapshots into finalized strategies.
//!
//! Two entry points feed the same pipeline: a polling claim queue
//! ([`JobWorker`]) and a Postgres LISTEN/NOTIFY consumer
//! ([`NotificationListener`]). Both are idempotent against each other, so a
//! snapshot reached by either path never pays for a stage twice.

pub mod app;
pub mod config;
pub mod db;
pub mod errors;
pub mod external;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

pub use config::{WorkerConfig, WorkerMode};
pub use services::job_worker_service::JobWorker;
pub use services::lifecycle::LifecycleOwner;
pub use services::notification_listener::NotificationListener;
pub use services::pipeline_context::{PipelineContext, ProviderSet, StageModel};
pub use services::pipeline_service::{PipelineOrchestrator, PipelineOutcome};
pub use services::retry_policy::{RetryOutcome, RetryPolicy};
pub use state::AppState;
