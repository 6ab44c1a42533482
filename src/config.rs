use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::external::llm_provider::ProviderSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value '{value}' for {name}: {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },
}

/// Which entry points this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    /// Claim loop, listener, sweep and admin HTTP.
    All,
    /// Claim loop only.
    Worker,
    /// Notification listener only.
    Listener,
}

impl WorkerMode {
    pub fn runs_worker(&self) -> bool {
        matches!(self, WorkerMode::All | WorkerMode::Worker)
    }

    pub fn runs_listener(&self) -> bool {
        matches!(self, WorkerMode::All | WorkerMode::Listener)
    }

    pub fn runs_sweep(&self) -> bool {
        matches!(self, WorkerMode::All)
    }
}

impl FromStr for WorkerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(WorkerMode::All),
            "worker" => Ok(WorkerMode::Worker),
            "listener" => Ok(WorkerMode::Listener),
            other => Err(format!("expected all, worker or listener, got '{}'", other)),
        }
    }
}

/// Tunables for the staged pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub strategist_min_chars: usize,
    pub ranking_min_venues: usize,
    /// Minimum words of reasoning per ranked venue; 0 disables the check.
    pub ranking_min_reasoning_words: usize,
    pub max_venue_candidates: i64,
    pub result_channel: String,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            strategist_min_chars: 100,
            ranking_min_venues: 4,
            ranking_min_reasoning_words: 0,
            max_venue_candidates: 50,
            result_channel: "result_ready".to_string(),
            retry_max_attempts: 5,
            retry_base_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub enabled: bool,
    /// Six-field cron expression (sec min hour day month weekday).
    pub schedule: String,
    pub min_age_minutes: i64,
    pub max_attempts: i64,
    pub batch_size: i64,
    pub stale_job_minutes: i64,
    pub reap_stale_jobs: bool,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: "0 */5 * * * *".to_string(),
            min_age_minutes: 5,
            max_attempts: 3,
            batch_size: 100,
            stale_job_minutes: 30,
            reap_stale_jobs: false,
        }
    }
}

/// Process configuration read from the environment.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub mode: WorkerMode,
    pub worker_id: String,
    pub poll_interval: Duration,
    pub upstream_channel: String,
    pub listener_reconnect_delay: Duration,
    pub http_enabled: bool,
    pub http_port: u16,
    pub shutdown_grace: Duration,
    pub pipeline: PipelineSettings,
    pub sweep: SweepSettings,
    pub strategist: ProviderSettings,
    pub consolidator: ProviderSettings,
    pub planner: ProviderSettings,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup: &lookup };

        let database_url = env
            .string("DATABASE_URL")
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let pipeline_defaults = PipelineSettings::default();
        let pipeline = PipelineSettings {
            strategist_min_chars: env.parse("STRATEGIST_MIN_CHARS", pipeline_defaults.strategist_min_chars)?,
            ranking_min_venues: env.parse("RANKING_MIN_VENUES", pipeline_defaults.ranking_min_venues)?,
            ranking_min_reasoning_words: env.parse(
                "RANKING_MIN_REASONING_WORDS",
                pipeline_defaults.ranking_min_reasoning_words,
            )?,
            max_venue_candidates: env.parse("MAX_VENUE_CANDIDATES", pipeline_defaults.max_venue_candidates)?,
            result_channel: env
                .string("RESULT_CHANNEL")
                .unwrap_or(pipeline_defaults.result_channel),
            retry_max_attempts: env.parse("RETRY_MAX_ATTEMPTS", pipeline_defaults.retry_max_attempts)?,
            retry_base_delay: Duration::from_millis(env.parse("RETRY_BASE_DELAY_MS", 200u64)?),
        };
        if pipeline.retry_max_attempts == 0 {
            return Err(invalid("RETRY_MAX_ATTEMPTS", "0", "must be at least 1"));
        }

        let sweep_defaults = SweepSettings::default();
        let sweep = SweepSettings {
            enabled: env.parse("SWEEP_ENABLED", sweep_defaults.enabled)?,
            schedule: env.string("SWEEP_SCHEDULE").unwrap_or(sweep_defaults.schedule),
            min_age_minutes: env.parse("SWEEP_MIN_AGE_MINUTES", sweep_defaults.min_age_minutes)?,
            max_attempts: env.parse("SWEEP_MAX_ATTEMPTS", sweep_defaults.max_attempts)?,
            batch_size: env.parse("SWEEP_BATCH_SIZE", sweep_defaults.batch_size)?,
            stale_job_minutes: env.parse("STALE_JOB_MINUTES", sweep_defaults.stale_job_minutes)?,
            reap_stale_jobs: env.parse("REAP_STALE_JOBS", sweep_defaults.reap_stale_jobs)?,
        };

        Ok(Self {
            database_url,
            database_max_connections: env.parse("DATABASE_MAX_CONNECTIONS", 10u32)?,
            mode: env.parse("WORKER_MODE", WorkerMode::All)?,
            worker_id: env
                .string("WORKER_ID")
                .unwrap_or_else(|| format!("worker-{}", std::process::id())),
            poll_interval: Duration::from_millis(env.parse("JOB_POLL_INTERVAL_MS", 2000u64)?),
            upstream_channel: env
                .string("UPSTREAM_CHANNEL")
                .unwrap_or_else(|| "upstream_ready".to_string()),
            listener_reconnect_delay: Duration::from_secs(env.parse("LISTENER_RECONNECT_SECS", 5u64)?),
            http_enabled: env.parse("HTTP_ENABLED", true)?,
            http_port: env.parse("HTTP_PORT", 3000u16)?,
            shutdown_grace: Duration::from_secs(env.parse("SHUTDOWN_GRACE_SECS", 30u64)?),
            pipeline,
            sweep,
            strategist: env.provider("STRATEGIST", "anthropic", "claude-sonnet-4-20250514")?,
            consolidator: env.provider("CONSOLIDATOR", "google", "gemini-2.0-flash-001")?,
            planner: env.provider("PLANNER", "openai", "gpt-5")?,
        })
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<'a, F: Fn(&str) -> Option<String>> Env<'a, F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(name) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map_err(|e| invalid(name, &raw, &e.to_string())),
            None => Ok(default),
        }
    }

    fn provider(
        &self,
        stage: &str,
        default_provider: &str,
        default_model: &str,
    ) -> Result<ProviderSettings, ConfigError> {
        let provider = self
            .string(&format!("{}_PROVIDER", stage))
            .unwrap_or_else(|| default_provider.to_string());
        let model = self
            .string(&format!("{}_MODEL", stage))
            .unwrap_or_else(|| default_model.to_string());

        let mut settings = ProviderSettings::new(&provider, &model);
        settings.api_key = self.string(api_key_var(&provider));
        settings.max_tokens = self.parse(&format!("{}_MAX_TOKENS", stage), settings.max_tokens)?;
        settings.temperature = self.parse(&format!("{}_TEMPERATURE", stage), settings.temperature)?;
        settings.timeout = Duration::from_secs(
            self.parse(&format!("{}_TIMEOUT_SECS", stage), settings.timeout.as_secs())?,
        );
        settings.base_url = self.string(&format!("{}_BASE_URL", stage));
        Ok(settings)
    }
}

fn api_key_var(provider: &str) -> &'static str {
    match provider.to_lowercase().as_str() {
        "anthropic" => "ANTHROPIC_API_KEY",
        "google" | "gemini" => "GOOGLE_API_KEY",
        "local" => "LOCAL_MODEL_API_KEY",
        _ => "OPENAI_API_KEY",
    }
}

fn invalid(name: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
