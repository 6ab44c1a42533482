use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreateRanking, Ranking};

pub async fn fetch_by_snapshot(
    pool: &PgPool,
    snapshot_id: Uuid,
) -> Result<Option<Ranking>, sqlx::Error> {
    sqlx::query_as::<_, Ranking>(
        r#"
        SELECT id, snapshot_id, strategy_version, staging_area, venues, model_route, created_at
        FROM rankings
        WHERE snapshot_id = $1
        "#,
    )
    .bind(snapshot_id)
    .fetch_optional(pool)
    .await
}

/// Insert-if-absent. When a concurrent writer got there first, its row wins
/// and is returned.
pub async fn insert(pool: &PgPool, input: CreateRanking) -> Result<Ranking, sqlx::Error> {
    let inserted = sqlx::query_as::<_, Ranking>(
        r#"
        INSERT INTO rankings (id, snapshot_id, strategy_version, staging_area, venues, model_route)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (snapshot_id) DO NOTHING
        RETURNING id, snapshot_id, strategy_version, staging_area, venues, model_route, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(input.snapshot_id)
    .bind(input.strategy_version)
    .bind(&input.staging_area)
    .bind(&input.venues)
    .bind(&input.model_route)
    .fetch_optional(pool)
    .await?;

    match inserted {
        Some(ranking) => Ok(ranking),
        None => fetch_by_snapshot(pool, input.snapshot_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound),
    }
}
