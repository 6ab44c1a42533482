use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::StrategyRecord;

const STRATEGY_COLUMNS: &str = "id, snapshot_id, stage_a_output, final_output, status, \
                                model_route, error_message, version, created_at, updated_at";

pub async fn fetch_by_snapshot(
    pool: &PgPool,
    snapshot_id: Uuid,
) -> Result<Option<StrategyRecord>, sqlx::Error> {
    sqlx::query_as::<_, StrategyRecord>(&format!(
        "SELECT {} FROM strategies WHERE snapshot_id = $1",
        STRATEGY_COLUMNS
    ))
    .bind(snapshot_id)
    .fetch_optional(pool)
    .await
}

/// Create the record on first write, otherwise replace the strategist output.
/// A record that already reached `ok` is left untouched.
pub async fn upsert_stage_a(
    pool: &PgPool,
    snapshot_id: Uuid,
    stage_a_output: &str,
    model_route: &str,
) -> Result<Option<StrategyRecord>, sqlx::Error> {
    sqlx::query_as::<_, StrategyRecord>(&format!(
        r#"
        INSERT INTO strategies (id, snapshot_id, stage_a_output, status, model_route, version)
        VALUES ($1, $2, $3, 'pending', $4, 1)
        ON CONFLICT (snapshot_id) DO UPDATE SET
            stage_a_output = EXCLUDED.stage_a_output,
            status = 'pending',
            model_route = EXCLUDED.model_route,
            error_message = NULL,
            version = strategies.version + 1,
            updated_at = NOW()
        WHERE strategies.status <> 'ok'
        RETURNING {}
        "#,
        STRATEGY_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(snapshot_id)
    .bind(stage_a_output)
    .bind(model_route)
    .fetch_optional(pool)
    .await
}

/// Write the consolidated output exactly once.
///
/// Returns `None` when the record is already `ok` (another path finished
/// first) or does not exist.
pub async fn save_final(
    pool: &PgPool,
    snapshot_id: Uuid,
    final_output: &str,
    model_route: &str,
) -> Result<Option<StrategyRecord>, sqlx::Error> {
    sqlx::query_as::<_, StrategyRecord>(&format!(
        r#"
        UPDATE strategies
        SET final_output = $2,
            status = 'ok',
            model_route = $3,
            error_message = NULL,
            version = version + 1,
            updated_at = NOW()
        WHERE snapshot_id = $1 AND status <> 'ok'
        RETURNING {}
        "#,
        STRATEGY_COLUMNS
    ))
    .bind(snapshot_id)
    .bind(final_output)
    .bind(model_route)
    .fetch_optional(pool)
    .await
}

/// Record a failure, creating the row if needed. Never demotes an `ok` record.
pub async fn mark_failed(
    pool: &PgPool,
    snapshot_id: Uuid,
    error_message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO strategies (id, snapshot_id, status, error_message)
        VALUES ($1, $2, 'failed', $3)
        ON CONFLICT (snapshot_id) DO UPDATE SET
            status = 'failed',
            error_message = EXCLUDED.error_message,
            updated_at = NOW()
        WHERE strategies.status <> 'ok'
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(snapshot_id)
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(())
}

/// Snapshots whose strategist output and briefing both exist but whose final
/// output never landed, with fewer than `max_attempts` consolidate jobs so far.
pub async fn fetch_awaiting_consolidation(
    pool: &PgPool,
    updated_before: DateTime<Utc>,
    max_attempts: i64,
    limit: i64,
) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT s.snapshot_id
        FROM strategies s
        JOIN briefings b ON b.snapshot_id = s.snapshot_id
        WHERE s.stage_a_output IS NOT NULL
          AND s.final_output IS NULL
          AND s.status <> 'ok'
          AND s.updated_at < $1
          AND (
              SELECT COUNT(*) FROM strategy_jobs j
              WHERE j.snapshot_id = s.snapshot_id AND j.kind = 'consolidate'
          ) < $2
        ORDER BY s.updated_at
        LIMIT $3
        "#,
    )
    .bind(updated_before)
    .bind(max_attempts)
    .bind(limit)
    .fetch_all(pool)
    .await
}
