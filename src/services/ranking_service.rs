use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::PipelineError;
use crate::models::{CreateRanking, Ranking, RankingPlan, SnapshotContext, Stage, StrategyRecord};
use crate::services::pipeline_context::PipelineContext;
use crate::services::prompts;

/// What the post-consolidation ranking step ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingStatus {
    Created,
    Existing,
    Failed,
}

impl RankingStatus {
    pub fn is_available(&self) -> bool {
        !matches!(self, RankingStatus::Failed)
    }
}

/// Checks applied to the planner's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanRules {
    pub min_venues: usize,
    /// 0 disables the reasoning length check.
    pub min_reasoning_words: usize,
}

impl PlanRules {
    pub fn new(min_venues: usize) -> Self {
        Self {
            min_venues,
            min_reasoning_words: 0,
        }
    }
}

/// Derives the ranked venue list from a final strategy.
#[derive(Clone)]
pub struct RankingService {
    ctx: PipelineContext,
}

impl RankingService {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    fn plan_rules(&self) -> PlanRules {
        PlanRules {
            min_venues: self.ctx.settings.ranking_min_venues,
            min_reasoning_words: self.ctx.settings.ranking_min_reasoning_words,
        }
    }

    /// Ranking plus `true` when this call created it. An existing ranking
    /// is returned without calling the planner.
    pub async fn ensure_ranking(
        &self,
        record: &StrategyRecord,
        snapshot: &SnapshotContext,
    ) -> Result<(Ranking, bool), PipelineError> {
        let snapshot_id = record.snapshot_id;

        if let Some(existing) = self.ctx.rankings.find_ranking(snapshot_id).await? {
            return Ok((existing, false));
        }

        let final_output = record
            .final_output
            .as_deref()
            .ok_or_else(|| PipelineError::MissingStrategy(snapshot_id.to_string()))?;

        let venues = self
            .ctx
            .sources
            .venue_candidates(snapshot_id, self.ctx.settings.max_venue_candidates)
            .await?;

        let min_venues = self.ctx.settings.ranking_min_venues;
        let model = &self.ctx.providers.planner;
        let prompt = prompts::planner(final_output, snapshot, &venues, min_venues);
        let call = self.ctx.invoke(Stage::Ranking, model, snapshot_id, &prompt).await;

        let response = match call.result {
            Ok(response) => response,
            Err(e) => {
                self.ctx.recorder.record(call.log, true).await;
                return Err(PipelineError::provider(Stage::Ranking, e));
            }
        };
        let plan = match parse_plan(&response.content, &self.plan_rules()) {
            Ok(plan) => {
                self.ctx.recorder.record(call.log, true).await;
                plan
            }
            Err(reason) => {
                let err = PipelineError::degenerate(Stage::Ranking, reason);
                self.ctx.recorder.record(call.log.rejected(&err), true).await;
                return Err(err);
            }
        };

        let staging_area = serde_json::to_value(&plan.staging_area)
            .map_err(|e| PipelineError::degenerate(Stage::Ranking, e.to_string()))?;
        let venue_json = serde_json::to_value(&plan.venues)
            .map_err(|e| PipelineError::degenerate(Stage::Ranking, e.to_string()))?;

        let ranking = self
            .ctx
            .rankings
            .insert_ranking(CreateRanking {
                snapshot_id,
                strategy_version: record.version,
                staging_area,
                venues: venue_json,
                model_route: model.provider.route(),
            })
            .await?;

        info!(
            "🗺️ Ranked {} venues for snapshot {} ({} candidates offered)",
            plan.venues.len(),
            snapshot_id,
            venues.len()
        );
        Ok((ranking, true))
    }

    /// Ensure a ranking exists and announce the result. Failures are logged
    /// and reported as `RankingStatus::Failed`; they never propagate.
    pub async fn ensure_and_announce(
        &self,
        record: &StrategyRecord,
        snapshot: &SnapshotContext,
    ) -> RankingStatus {
        let status = match self.ensure_ranking(record, snapshot).await {
            Ok((_, true)) => RankingStatus::Created,
            Ok((_, false)) => RankingStatus::Existing,
            Err(e) => {
                error!("Ranking failed for snapshot {}: {}", record.snapshot_id, e);
                return RankingStatus::Failed;
            }
        };

        self.announce(record.snapshot_id).await;
        status
    }

    pub async fn announce(&self, snapshot_id: Uuid) {
        let payload = json!({
            "snapshot_id": snapshot_id,
            "timestamp": Utc::now().to_rfc3339(),
        })
        .to_string();

        let channel = &self.ctx.settings.result_channel;
        match self.ctx.publisher.publish(channel, &payload).await {
            Ok(()) => info!("📣 Published {} for snapshot {}", channel, snapshot_id),
            Err(e) => warn!("Failed to publish {} for snapshot {}: {}", channel, snapshot_id, e),
        }
    }
}

/// Strip a surrounding markdown code fence, with or without a language tag.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse and check the planner's JSON answer.
pub fn parse_plan(raw: &str, rules: &PlanRules) -> Result<RankingPlan, String> {
    let plan: RankingPlan = serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| format!("unparseable ranking JSON: {}", e))?;

    match &plan.staging_area {
        Some(area) if !area.name.trim().is_empty() => {}
        _ => return Err("staging area is required".to_string()),
    }

    if plan.venues.len() < rules.min_venues {
        return Err(format!(
            "expected at least {} venues, got {}",
            rules.min_venues,
            plan.venues.len()
        ));
    }

    if let Some((i, _)) = plan
        .venues
        .iter()
        .enumerate()
        .find(|(_, v)| v.name.trim().is_empty() || v.address.trim().is_empty())
    {
        return Err(format!("venue {} is missing a name or address", i));
    }

    if rules.min_reasoning_words > 0 {
        for (i, venue) in plan.venues.iter().enumerate() {
            let words = venue.reasoning.split_whitespace().count();
            if words < rules.min_reasoning_words {
                return Err(format!(
                    "venue {} reasoning too short ({} words, need {})",
                    i, words, rules.min_reasoning_words
                ));
            }
        }
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn venue(name: &str) -> serde_json::Value {
        json!({
            "name": name,
            "address": "100 Main St",
            "category": "stadium",
            "distance_miles": 1.2,
            "drive_time_minutes": 4,
            "reasoning": "Event lets out at 10pm"
        })
    }

    fn plan_json(venues: usize) -> String {
        json!({
            "staging_area": {"name": "Lot B", "address": "1 Arena Way", "reasoning": "central"},
            "venues": (0..venues).map(|i| venue(&format!("Venue {}", i))).collect::<Vec<_>>()
        })
        .to_string()
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {} "), "{}");
    }

    #[test]
    fn test_parse_plan_accepts_fenced_json() {
        let raw = format!("```json\n{}\n```", plan_json(4));
        let plan = parse_plan(&raw, &PlanRules::new(4)).unwrap();
        assert_eq!(plan.venues.len(), 4);
        assert_eq!(plan.staging_area.unwrap().name, "Lot B");
    }

    #[test]
    fn test_parse_plan_rejects_too_few_venues() {
        let err = parse_plan(&plan_json(3), &PlanRules::new(4)).unwrap_err();
        assert!(err.contains("at least 4"));
    }

    #[test]
    fn test_parse_plan_requires_staging_area() {
        let raw = json!({"venues": (0..4).map(|i| venue(&i.to_string())).collect::<Vec<_>>()}).to_string();
        assert_eq!(parse_plan(&raw, &PlanRules::new(4)).unwrap_err(), "staging area is required");
    }

    #[test]
    fn test_parse_plan_requires_every_venue_field() {
        let raw = json!({
            "staging_area": {"name": "Lot B", "address": "1 Arena Way"},
            "venues": [{"name": "Only name"}]
        })
        .to_string();
        assert!(parse_plan(&raw, &PlanRules::new(1)).unwrap_err().contains("unparseable"));
    }

    #[test]
    fn test_reasoning_word_floor_is_opt_in() {
        let raw = plan_json(4);
        assert!(parse_plan(&raw, &PlanRules::new(4)).is_ok());

        let strict = PlanRules {
            min_venues: 4,
            min_reasoning_words: 15,
        };
        let err = parse_plan(&raw, &strict).unwrap_err();
        assert_eq!(err, "venue 0 reasoning too short (5 words, need 15)");

        let lenient = PlanRules {
            min_venues: 4,
            min_reasoning_words: 5,
        };
        assert!(parse_plan(&raw, &lenient).is_ok());
    }
}
