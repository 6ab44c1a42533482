use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreateModelCall, ModelCall, ModelCallStats};

/// Log a provider call. Fails with a foreign-key violation when the
/// referenced strategy row is not visible to this connection yet.
pub async fn insert(pool: &PgPool, call: &CreateModelCall) -> Result<ModelCall, sqlx::Error> {
    sqlx::query_as::<_, ModelCall>(
        r#"
        INSERT INTO model_calls
            (id, snapshot_id, stage, provider, model, prompt_hash, response_hash,
             latency_ms, tokens_in, tokens_out, success, error_message, reference_degraded)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING id, snapshot_id, stage, provider, model, prompt_hash, response_hash,
                  latency_ms, tokens_in, tokens_out, success, error_message,
                  reference_degraded, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(call.snapshot_id)
    .bind(call.stage)
    .bind(&call.provider)
    .bind(&call.model)
    .bind(&call.prompt_hash)
    .bind(&call.response_hash)
    .bind(call.latency_ms)
    .bind(call.tokens_in)
    .bind(call.tokens_out)
    .bind(call.success)
    .bind(&call.error_message)
    .bind(call.reference_degraded)
    .fetch_one(pool)
    .await
}

/// Per-stage call metrics for the last `hours` hours
pub async fn stats_by_stage(pool: &PgPool, hours: i32) -> Result<Vec<ModelCallStats>, sqlx::Error> {
    sqlx::query_as::<_, ModelCallStats>(
        r#"
        SELECT
            stage,
            COUNT(*) AS total_calls,
            COUNT(*) FILTER (WHERE success) AS successful_calls,
            AVG(latency_ms)::DOUBLE PRECISION AS avg_latency_ms,
            MAX(latency_ms) AS max_latency_ms,
            SUM(tokens_in)::BIGINT AS total_tokens_in,
            SUM(tokens_out)::BIGINT AS total_tokens_out
        FROM model_calls
        WHERE created_at >= NOW() - make_interval(hours => $1)
        GROUP BY stage
        ORDER BY stage
        "#,
    )
    .bind(hours)
    .fetch_all(pool)
    .await
}
