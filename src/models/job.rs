use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of a queued pipeline job.
///
/// Transitions are strictly `Queued -> Running -> {Ok, Error}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Ok,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Ok => "ok",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "ok" => Ok(JobStatus::Ok),
            "error" => Ok(JobStatus::Error),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// A named phase of the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Provider A: market analysis from the snapshot alone.
    Strategist,
    /// Provider C: merges strategist output with the briefing.
    Consolidator,
    /// Downstream ranked venue list derived from the final text.
    Ranking,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Strategist => "strategist",
            Stage::Consolidator => "consolidator",
            Stage::Ranking => "ranking",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline variant carried by a job. Each variant has a fixed stage sequence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Strategist, then consolidator, then ranking.
    Full,
    /// Consolidator and ranking only; strategist output must already exist.
    Consolidate,
}

const FULL_STAGES: &[Stage] = &[Stage::Strategist, Stage::Consolidator, Stage::Ranking];
const CONSOLIDATE_STAGES: &[Stage] = &[Stage::Consolidator, Stage::Ranking];

impl JobKind {
    pub fn stages(&self) -> &'static [Stage] {
        match self {
            JobKind::Full => FULL_STAGES,
            JobKind::Consolidate => CONSOLIDATE_STAGES,
        }
    }

    pub fn runs(&self, stage: Stage) -> bool {
        self.stages().contains(&stage)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Full => "full",
            JobKind::Consolidate => "consolidate",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(JobKind::Full),
            "consolidate" => Ok(JobKind::Consolidate),
            other => Err(format!("unknown job kind: {}", other)),
        }
    }
}

/// A unit of work in the `strategy_jobs` queue.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub snapshot_id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(snapshot_id: Uuid, kind: JobKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            snapshot_id,
            kind,
            status: JobStatus::Queued,
            error_message: None,
            worker_id: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }
}

/// Result of an enqueue request.
#[derive(Debug, Clone)]
pub enum EnqueueOutcome {
    Created(Job),
    /// An equivalent queued or running job already existed.
    Existing(Job),
}

impl EnqueueOutcome {
    pub fn job(&self) -> &Job {
        match self {
            EnqueueOutcome::Created(job) | EnqueueOutcome::Existing(job) => job,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, EnqueueOutcome::Created(_))
    }
}

/// Request body for a manual enqueue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    pub snapshot_id: Uuid,
    #[serde(default = "default_kind")]
    pub kind: JobKind,
}

fn default_kind() -> JobKind {
    JobKind::Full
}

/// Queue depth by status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobQueueStats {
    pub queued: i64,
    pub running: i64,
    pub ok: i64,
    pub error: i64,
}
