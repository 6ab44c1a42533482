use std::time::Duration;

use serde::Deserialize;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::{PipelineError, StoreError};
use crate::services::consolidation_service::{Consolidation, ConsolidationService};
use crate::services::lifecycle::ListenerSlot;
use crate::services::pipeline_context::PipelineContext;
use crate::services::pipeline_service::PipelineOrchestrator;
use crate::services::ranking_service::{RankingService, RankingStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationOutcome {
    /// Payload did not name a snapshot.
    Unparseable,
    /// An input is missing; nothing was called and nothing was marked.
    NotReady { has_strategy: bool, has_briefing: bool },
    Consolidated { ranking: RankingStatus },
    AlreadyConsolidated { ranking: RankingStatus },
    Failed(String),
}

#[derive(Deserialize)]
struct ReadyPayload {
    #[serde(alias = "snapshotId")]
    snapshot_id: Uuid,
}

/// Accepts `{"snapshot_id": "<uuid>"}`, `{"snapshotId": "<uuid>"}` or a bare uuid.
pub fn parse_payload(payload: &str) -> Option<Uuid> {
    let trimmed = payload.trim();
    if trimmed.starts_with('{') {
        return serde_json::from_str::<ReadyPayload>(trimmed)
            .ok()
            .map(|p| p.snapshot_id);
    }
    Uuid::parse_str(trimmed.trim_matches('"')).ok()
}

/// Push-triggered consolidation. Reacts to upstream-ready notifications by
/// running Stage C and the downstream ranking, deduplicated against work the
/// claim queue may already have done.
pub struct NotificationListener {
    ctx: PipelineContext,
    consolidation: ConsolidationService,
    ranking: RankingService,
    channel: String,
    reconnect_delay: Duration,
}

impl NotificationListener {
    pub fn new(orchestrator: &PipelineOrchestrator, channel: &str, reconnect_delay: Duration) -> Self {
        Self {
            ctx: orchestrator.context().clone(),
            consolidation: orchestrator.consolidation().clone(),
            ranking: orchestrator.ranking().clone(),
            channel: channel.to_string(),
            reconnect_delay,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn handle_payload(&self, payload: &str) -> NotificationOutcome {
        match parse_payload(payload) {
            Some(snapshot_id) => self.handle_snapshot(snapshot_id).await,
            None => {
                warn!("Ignoring {} payload without a snapshot id: {:?}", self.channel, payload);
                NotificationOutcome::Unparseable
            }
        }
    }

    pub async fn handle_snapshot(&self, snapshot_id: Uuid) -> NotificationOutcome {
        let readiness = match self.consolidation.readiness(snapshot_id).await {
            Ok(readiness) => readiness,
            Err(e) => {
                error!("Readiness check failed for snapshot {}: {}", snapshot_id, e);
                return NotificationOutcome::Failed(e.to_string());
            }
        };

        let (record, briefing) = match (readiness.record, readiness.briefing) {
            (Some(record), Some(briefing)) if record.has_stage_a() => (record, briefing),
            (record, briefing) => {
                let has_strategy = record.map(|r| r.has_stage_a()).unwrap_or(false);
                debug!(
                    "Snapshot {} not ready (strategy: {}, briefing: {})",
                    snapshot_id,
                    has_strategy,
                    briefing.is_some()
                );
                return NotificationOutcome::NotReady {
                    has_strategy,
                    has_briefing: briefing.is_some(),
                };
            }
        };

        let snapshot = match self.ctx.sources.snapshot(snapshot_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                return self
                    .fail(snapshot_id, PipelineError::MissingSnapshot(snapshot_id.to_string()))
                    .await
            }
            Err(e) => return self.fail(snapshot_id, PipelineError::Store(e)).await,
        };

        let consolidation = match self.consolidation.consolidate(&record, &snapshot, &briefing).await {
            Ok(consolidation) => consolidation,
            Err(e) => return self.fail(snapshot_id, e).await,
        };

        let ranking = self
            .ranking
            .ensure_and_announce(consolidation.record(), &snapshot)
            .await;

        match consolidation {
            Consolidation::Written(_) => NotificationOutcome::Consolidated { ranking },
            Consolidation::AlreadyDone(_) => {
                debug!("Snapshot {} was already consolidated", snapshot_id);
                NotificationOutcome::AlreadyConsolidated { ranking }
            }
        }
    }

    async fn fail(&self, snapshot_id: Uuid, err: PipelineError) -> NotificationOutcome {
        let message = err.to_string();
        error!("❌ Consolidation failed for snapshot {}: {}", snapshot_id, message);
        if let Err(e) = self.ctx.strategies.mark_failed(snapshot_id, &message).await {
            error!("Failed to mark strategy {} failed: {}", snapshot_id, e);
        }
        NotificationOutcome::Failed(message)
    }

    /// Listen until the token is cancelled. The slot keeps a second listener
    /// from starting in this process while this one runs.
    pub async fn run(
        self,
        pool: PgPool,
        slot: ListenerSlot,
        token: CancellationToken,
    ) -> Result<(), StoreError> {
        let _slot = slot;

        while !token.is_cancelled() {
            let mut listener = match self.subscribe(&pool).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!("Failed to subscribe to {}: {}", self.channel, e);
                    if self.wait_before_reconnect(&token).await {
                        break;
                    }
                    continue;
                }
            };
            info!("👂 Listening on channel '{}'", self.channel);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        if let Err(e) = listener.unlisten_all().await {
                            warn!("UNLISTEN failed during shutdown: {}", e);
                        }
                        info!("👋 Listener on '{}' unsubscribed", self.channel);
                        return Ok(());
                    }
                    received = listener.recv() => match received {
                        Ok(notification) => {
                            let outcome = self.handle_payload(notification.payload()).await;
                            debug!("{} handled: {:?}", self.channel, outcome);
                        }
                        Err(e) => {
                            warn!("Listener connection lost: {}", e);
                            break;
                        }
                    }
                }
            }

            if self.wait_before_reconnect(&token).await {
                break;
            }
        }

        Ok(())
    }

    async fn subscribe(&self, pool: &PgPool) -> Result<PgListener, StoreError> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(&self.channel).await?;
        Ok(listener)
    }

    /// `true` when shutdown arrived during the wait.
    async fn wait_before_reconnect(&self, token: &CancellationToken) -> bool {
        info!("Reconnecting listener in {:?}", self.reconnect_delay);
        tokio::select! {
            _ = token.cancelled() => true,
            _ = tokio::time::sleep(self.reconnect_delay) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_payloads() {
        let id = Uuid::new_v4();
        assert_eq!(parse_payload(&format!(r#"{{"snapshot_id":"{}"}}"#, id)), Some(id));
        assert_eq!(parse_payload(&format!(r#"{{"snapshotId":"{}"}}"#, id)), Some(id));
    }

    #[test]
    fn test_parse_legacy_raw_uuid() {
        let id = Uuid::new_v4();
        assert_eq!(parse_payload(&format!(" {} ", id)), Some(id));
        assert_eq!(parse_payload(&format!("\"{}\"", id)), Some(id));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_payload(""), None);
        assert_eq!(parse_payload("not-a-uuid"), None);
        assert_eq!(parse_payload(r#"{"snapshot":"x"}"#), None);
    }
}
