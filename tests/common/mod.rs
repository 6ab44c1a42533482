#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use strategy_worker::config::PipelineSettings;
use strategy_worker::errors::LlmError;
use strategy_worker::external::llm_provider::{LlmProvider, ProviderResponse};
use strategy_worker::models::{BriefingRecord, SnapshotContext, VenueCandidate};
use strategy_worker::store::MemoryStore;
use strategy_worker::{
    JobWorker, NotificationListener, PipelineContext, PipelineOrchestrator, ProviderSet, StageModel,
};

pub const STRATEGY_TEXT: &str = "Demand is building downtown ahead of the 7pm tip-off. Stage near \
the arena garage, favor short airport runs before 5pm and avoid I-35 northbound where a lane \
closure is slowing pickups.";

pub const FINAL_TEXT: &str = "Head to the arena district by 6:15pm; the game lets out around \
9:30pm. Skip I-35 northbound until the closure clears.";

/// Provider returning a fixed reply and counting calls.
pub struct ScriptedProvider {
    name: &'static str,
    model: &'static str,
    reply: Result<String, String>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn replying(name: &'static str, model: &'static str, reply: &str) -> Arc<Self> {
        Arc::new(Self {
            name,
            model,
            reply: Ok(reply.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &'static str, model: &'static str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            name,
            model,
            reply: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        self.name
    }

    fn model_name(&self) -> &str {
        self.model
    }

    async fn call(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _max_tokens: u32,
    ) -> Result<ProviderResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Ok(content) => Ok(ProviderResponse {
                content: content.clone(),
                tokens_in: Some(200),
                tokens_out: Some(120),
                latency_ms: 5,
            }),
            Err(message) => Err(LlmError::ApiError(message.clone())),
        }
    }
}

pub fn plan_json(venues: usize) -> String {
    let venues: Vec<_> = (0..venues)
        .map(|i| {
            json!({
                "name": format!("Venue {}", i),
                "address": format!("{} Main St, Dallas, TX", 100 + i),
                "category": "entertainment",
                "distance_miles": 0.8 + i as f64 * 0.4,
                "drive_time_minutes": 3 + i,
                "reasoning": "Crowd release after the game keeps pickups steady for an hour."
            })
        })
        .collect();

    format!(
        "```json\n{}\n```",
        json!({
            "staging_area": {
                "name": "Arena Lot C",
                "address": "2500 Victory Ave, Dallas, TX",
                "reasoning": "Two minutes from every venue"
            },
            "venues": venues
        })
    )
}

pub fn snapshot(snapshot_id: Uuid) -> SnapshotContext {
    SnapshotContext {
        snapshot_id,
        lat: 32.7905,
        lng: -96.8103,
        formatted_address: Some("2500 Victory Ave, Dallas, TX 75219".into()),
        city: Some("Dallas".into()),
        state: Some("TX".into()),
        timezone: Some("America/Chicago".into()),
        weather: Some(json!({"description": "clear", "temperature": 68})),
        air_quality: Some(json!({"aqi": 41})),
        created_at: Utc::now(),
    }
}

pub fn briefing(snapshot_id: Uuid) -> BriefingRecord {
    BriefingRecord {
        snapshot_id,
        traffic: Some(json!({"congestion": "I-35 northbound lane closure"})),
        events: Some(json!([{"name": "Mavericks vs Suns", "starts": "19:30"}])),
        holidays: None,
        travel_advisories: None,
        updated_at: Utc::now(),
    }
}

pub fn venue(snapshot_id: Uuid, name: &str, score: f64) -> VenueCandidate {
    VenueCandidate {
        snapshot_id,
        name: name.to_string(),
        category: Some("bar".into()),
        formatted_address: Some("2600 Victory Ave, Dallas, TX".into()),
        score: Some(score),
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub strategist: Arc<ScriptedProvider>,
    pub consolidator: Arc<ScriptedProvider>,
    pub planner: Arc<ScriptedProvider>,
    pub orchestrator: Arc<PipelineOrchestrator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_providers(
            ScriptedProvider::replying("anthropic", "claude-sonnet-4-20250514", STRATEGY_TEXT),
            ScriptedProvider::replying("google", "gemini-2.0-flash-001", FINAL_TEXT),
            ScriptedProvider::replying("openai", "gpt-5", &plan_json(4)),
        )
    }

    pub fn with_providers(
        strategist: Arc<ScriptedProvider>,
        consolidator: Arc<ScriptedProvider>,
        planner: Arc<ScriptedProvider>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let providers = ProviderSet {
            strategist: StageModel::new(strategist.clone(), 1024),
            consolidator: StageModel::new(consolidator.clone(), 1024),
            planner: StageModel::new(planner.clone(), 2048),
        };
        let settings = PipelineSettings {
            retry_base_delay: Duration::from_millis(1),
            ..PipelineSettings::default()
        };
        let ctx = PipelineContext::new(store.clone(), providers, settings);

        Self {
            store,
            strategist,
            consolidator,
            planner,
            orchestrator: Arc::new(PipelineOrchestrator::new(ctx)),
        }
    }

    /// Seed a snapshot, optionally with its briefing.
    pub fn seed(&self, with_briefing: bool) -> Uuid {
        let snapshot_id = Uuid::new_v4();
        self.store.insert_snapshot(snapshot(snapshot_id));
        if with_briefing {
            self.store.insert_briefing(briefing(snapshot_id));
        }
        snapshot_id
    }

    pub fn worker(&self, worker_id: &str) -> JobWorker {
        JobWorker::new(self.orchestrator.clone(), worker_id, Duration::from_millis(10))
    }

    pub fn listener(&self) -> NotificationListener {
        NotificationListener::new(&self.orchestrator, "upstream_ready", Duration::from_millis(10))
    }

    pub fn total_calls(&self) -> usize {
        self.strategist.calls() + self.consolidator.calls() + self.planner.calls()
    }

    pub fn published_on(&self, channel: &str) -> Vec<String> {
        self.store
            .published()
            .into_iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, payload)| payload)
            .collect()
    }
}
