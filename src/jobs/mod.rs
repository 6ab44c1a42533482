//! Safety-net sweeps
//!
//! Scheduled by `JobSchedulerService`. They backstop the notification path:
//!
//! - `missed_consolidation_job` - re-enqueues consolidation for snapshots
//!   whose upstream-ready notification was never acted on
//! - `stale_running_jobs_job` - reports jobs a crashed worker left `running`
//!   and, when enabled, fails them
//!
//! Each sweep is bounded and safe to re-run.

pub mod missed_consolidation_job;
pub mod stale_running_jobs_job;
