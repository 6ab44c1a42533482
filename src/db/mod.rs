pub mod context_queries;
pub mod job_queries;
pub mod job_run_queries;
pub mod model_call_queries;
pub mod ranking_queries;
pub mod strategy_queries;
