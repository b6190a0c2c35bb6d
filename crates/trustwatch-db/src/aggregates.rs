// crates/trustwatch-db/src/aggregates.rs
use crate::scored_mentions::score_to_decimal;
use crate::DbError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use trustwatch_core::ScoredMention;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BrandAggregateRow {
    pub brand: String,
    pub mention_count: i64,
    pub avg_trust_score: Decimal,
    pub last_updated: DateTime<Utc>,
}

/// Folds one scored mention into the brand's rolling aggregate. The first
/// mention for a brand seeds the average; subsequent mentions move it by
/// `alpha` toward the new score.
///
/// Callers must apply each distinct mention exactly once. The pipeline gates
/// this on the inserted flag from `upsert_scored_mention`, so redelivered
/// mentions never shift the average twice.
///
/// # Errors
///
/// Returns `DbError` on database query failure.
pub async fn apply_scored_mention(
    pool: &PgPool,
    scored: &ScoredMention,
    alpha: f64,
) -> Result<(), DbError> {
    let mut conn = pool.acquire().await?;
    apply_scored_mention_conn(&mut conn, scored, alpha).await
}

pub(crate) async fn apply_scored_mention_conn(
    conn: &mut PgConnection,
    scored: &ScoredMention,
    alpha: f64,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO brand_aggregates (brand, mention_count, avg_trust_score, last_updated) \
         VALUES ($1, 1, $2, $3) \
         ON CONFLICT (brand) DO UPDATE SET \
           mention_count = brand_aggregates.mention_count + 1, \
           avg_trust_score = ROUND( \
             brand_aggregates.avg_trust_score \
               + $4::NUMERIC * ($2 - brand_aggregates.avg_trust_score), 2), \
           last_updated = GREATEST(brand_aggregates.last_updated, EXCLUDED.last_updated)",
    )
    .bind(&scored.brand)
    .bind(score_to_decimal(scored.trust_score))
    .bind(scored.scored_at)
    .bind(alpha)
    .execute(conn)
    .await?;
    Ok(())
}

/// Fetches the rolling aggregate for a brand.
///
/// # Errors
///
/// Returns `DbError::NotFound` when the brand has no scored mentions yet, or
/// `DbError` on query failure.
pub async fn get_brand_aggregate(pool: &PgPool, brand: &str) -> Result<BrandAggregateRow, DbError> {
    sqlx::query_as::<_, BrandAggregateRow>(
        "SELECT brand, mention_count, avg_trust_score, last_updated \
         FROM brand_aggregates WHERE brand = $1",
    )
    .bind(brand)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
