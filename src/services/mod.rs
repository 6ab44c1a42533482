pub mod call_recorder;
pub mod consolidation_service;
pub mod job_scheduler_service;
pub mod job_worker_service;
pub mod lifecycle;
pub mod notification_listener;
pub mod pipeline_context;
pub mod pipeline_service;
pub mod prompts;
pub mod ranking_service;
pub mod retry_policy;
