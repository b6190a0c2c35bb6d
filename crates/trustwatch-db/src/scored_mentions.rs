//! Database operations for the `scored_mentions` and `quarantined_mentions`
//! tables.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{PgConnection, PgPool};

use trustwatch_core::ScoredMention;

use crate::DbError;

/// A row from the `scored_mentions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScoredMentionRow {
    pub mention_id: String,
    pub brand: String,
    pub source: String,
    pub content_fingerprint: String,
    pub trust_score: Decimal,
    pub bias: Value,
    pub sentiment_label: String,
    pub sentiment_confidence: f64,
    pub classifier_confidence: f64,
    pub degraded: bool,
    pub scored_at: DateTime<Utc>,
}

/// NUMERIC(5,2)-safe conversion. Trust scores are already clamped to
/// [0, 100]; non-finite values collapse to zero rather than failing a write.
pub(crate) fn score_to_decimal(score: f64) -> Decimal {
    Decimal::from_f64_retain(score)
        .unwrap_or(Decimal::ZERO)
        .round_dp(2)
}

/// Idempotent upsert keyed by `mention_id`.
///
/// Returns `true` when the row was newly inserted, `false` for a redelivery
/// rewrite — the caller uses this to apply the brand aggregate exactly once
/// per distinct mention.
///
/// # Errors
///
/// Returns [`DbError::FingerprintConflict`] when the id already exists with a
/// different content fingerprint (the record should then be quarantined), or
/// [`DbError::Sqlx`] on query failure.
pub async fn upsert_scored_mention(
    pool: &PgPool,
    scored: &ScoredMention,
    content_fingerprint: &str,
) -> Result<bool, DbError> {
    let mut conn = pool.acquire().await?;
    upsert_scored_mention_conn(&mut conn, scored, content_fingerprint).await
}

/// Upsert plus the brand-aggregate fold in one transaction. The aggregate is
/// applied only when the mention row is new, so at-least-once redelivery
/// never moves the average twice, and a crash can never separate the two
/// writes.
///
/// Returns the inserted flag from the upsert.
///
/// # Errors
///
/// Same contract as [`upsert_scored_mention`].
pub async fn persist_scored_record(
    pool: &PgPool,
    scored: &ScoredMention,
    content_fingerprint: &str,
    alpha: f64,
) -> Result<bool, DbError> {
    let mut tx = pool.begin().await?;
    let inserted = upsert_scored_mention_conn(&mut tx, scored, content_fingerprint).await?;
    if inserted {
        crate::aggregates::apply_scored_mention_conn(&mut tx, scored, alpha).await?;
    }
    tx.commit().await?;
    Ok(inserted)
}

async fn upsert_scored_mention_conn(
    conn: &mut PgConnection,
    scored: &ScoredMention,
    content_fingerprint: &str,
) -> Result<bool, DbError> {
    let existing: Option<String> = sqlx::query_scalar(
        "SELECT content_fingerprint FROM scored_mentions WHERE mention_id = $1",
    )
    .bind(&scored.mention_id)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(stored) = existing {
        if stored.trim() != content_fingerprint {
            return Err(DbError::FingerprintConflict {
                mention_id: scored.mention_id.clone(),
            });
        }
    }

    let bias = serde_json::to_value(&scored.bias).unwrap_or(Value::Array(Vec::new()));

    // xmax = 0 only for freshly-inserted tuples.
    let inserted: bool = sqlx::query_scalar(
        "INSERT INTO scored_mentions \
           (mention_id, brand, source, content_fingerprint, trust_score, bias, \
            sentiment_label, sentiment_confidence, classifier_confidence, degraded, scored_at) \
         VALUES ($1, $2, $3::mention_source, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT (mention_id) DO UPDATE SET \
           trust_score = EXCLUDED.trust_score, \
           bias = EXCLUDED.bias, \
           sentiment_label = EXCLUDED.sentiment_label, \
           sentiment_confidence = EXCLUDED.sentiment_confidence, \
           classifier_confidence = EXCLUDED.classifier_confidence, \
           degraded = EXCLUDED.degraded, \
           scored_at = EXCLUDED.scored_at, \
           updated_at = NOW() \
         RETURNING (xmax = 0)",
    )
    .bind(&scored.mention_id)
    .bind(&scored.brand)
    .bind(scored.source.to_string())
    .bind(content_fingerprint)
    .bind(score_to_decimal(scored.trust_score))
    .bind(bias)
    .bind(scored.sentiment.label.to_string())
    .bind(scored.sentiment.confidence)
    .bind(scored.classifier_confidence)
    .bind(scored.degraded)
    .bind(scored.scored_at)
    .fetch_one(conn)
    .await?;

    Ok(inserted)
}

/// Record a conflicting redelivery for manual inspection. Keyed by
/// `(mention_id, seen_fingerprint)` so repeated conflicts are a no-op.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn quarantine_mention(
    pool: &PgPool,
    mention_id: &str,
    seen_fingerprint: &str,
    stored_fingerprint: &str,
    reason: &str,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO quarantined_mentions \
           (mention_id, seen_fingerprint, stored_fingerprint, reason) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (mention_id, seen_fingerprint) DO NOTHING",
    )
    .bind(mention_id)
    .bind(seen_fingerprint)
    .bind(stored_fingerprint)
    .bind(reason)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetch one scored mention by id, or `None` when absent.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_scored_mention(
    pool: &PgPool,
    mention_id: &str,
) -> Result<Option<ScoredMentionRow>, DbError> {
    let row = sqlx::query_as::<_, ScoredMentionRow>(
        "SELECT mention_id, brand, source::TEXT, content_fingerprint, trust_score, bias, \
                sentiment_label, sentiment_confidence, classifier_confidence, degraded, scored_at \
         FROM scored_mentions WHERE mention_id = $1",
    )
    .bind(mention_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Fetch the stored fingerprint for a mention id, if the row exists.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_stored_fingerprint(
    pool: &PgPool,
    mention_id: &str,
) -> Result<Option<String>, DbError> {
    let row: Option<String> = sqlx::query_scalar(
        "SELECT content_fingerprint FROM scored_mentions WHERE mention_id = $1",
    )
    .bind(mention_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|s| s.trim().to_string()))
}
