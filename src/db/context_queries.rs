use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{BriefingRecord, SnapshotContext, VenueCandidate};

pub async fn fetch_snapshot(
    pool: &PgPool,
    snapshot_id: Uuid,
) -> Result<Option<SnapshotContext>, sqlx::Error> {
    sqlx::query_as::<_, SnapshotContext>(
        r#"
        SELECT snapshot_id, lat, lng, formatted_address, city, state, timezone,
               weather, air_quality, created_at
        FROM snapshots
        WHERE snapshot_id = $1
        "#,
    )
    .bind(snapshot_id)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_briefing(
    pool: &PgPool,
    snapshot_id: Uuid,
) -> Result<Option<BriefingRecord>, sqlx::Error> {
    sqlx::query_as::<_, BriefingRecord>(
        r#"
        SELECT snapshot_id, traffic, events, holidays, travel_advisories, updated_at
        FROM briefings
        WHERE snapshot_id = $1
        "#,
    )
    .bind(snapshot_id)
    .fetch_optional(pool)
    .await
}

/// Highest-scored candidates first
pub async fn fetch_venue_candidates(
    pool: &PgPool,
    snapshot_id: Uuid,
    limit: i64,
) -> Result<Vec<VenueCandidate>, sqlx::Error> {
    sqlx::query_as::<_, VenueCandidate>(
        r#"
        SELECT snapshot_id, name, category, formatted_address, score
        FROM venue_candidates
        WHERE snapshot_id = $1
        ORDER BY score DESC NULLS LAST, name
        LIMIT $2
        "#,
    )
    .bind(snapshot_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}
