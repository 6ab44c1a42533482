mod job;
mod job_run;
mod model_call;
mod ranking;
mod snapshot;
mod strategy;

pub use job::{CreateJob, EnqueueOutcome, Job, JobKind, JobQueueStats, JobStatus, Stage};
pub use job_run::JobRun;
pub use model_call::{content_hash, CreateModelCall, ModelCall, ModelCallStats};
pub use ranking::{CreateRanking, RankedVenue, Ranking, RankingPlan, StagingArea};
pub use snapshot::{BriefingRecord, SnapshotContext, VenueCandidate};
pub use strategy::{StrategyRecord, StrategyStatus};
