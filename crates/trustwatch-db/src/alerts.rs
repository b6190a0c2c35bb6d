// crates/trustwatch-db/src/alerts.rs
use crate::scored_mentions::score_to_decimal;
use crate::DbError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use rust_decimal::prelude::ToPrimitive;
use trustwatch_alerts::AlertError;
use trustwatch_core::{Alert, AlertState, BiasCategory, Severity};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlertRow {
    pub id: Uuid,
    pub dedup_key: String,
    pub brand: String,
    pub bias_type: Option<String>,
    pub trust_score: Decimal,
    pub severity: String,
    pub text_sample: String,
    pub state: String,
    pub triggered_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AlertRow {
    /// Rebuild the domain alert from its stored row.
    ///
    /// # Errors
    ///
    /// Returns a decode error when the stored severity or state text does not
    /// match a known variant.
    pub fn into_alert(self) -> Result<Alert, DbError> {
        let severity = Severity::parse(&self.severity).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown alert severity '{}'", self.severity).into())
        })?;
        let state = AlertState::parse(&self.state).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown alert state '{}'", self.state).into())
        })?;
        Ok(Alert {
            id: self.id,
            brand: self.brand,
            bias_type: self.bias_type.as_deref().and_then(BiasCategory::parse),
            trust_score: self.trust_score.to_f64().unwrap_or(0.0),
            severity,
            text_sample: self.text_sample,
            triggered_at: self.triggered_at,
            state,
            resolved_at: self.resolved_at,
            dedup_key: self.dedup_key,
        })
    }
}

/// Upsert an alert keyed by its ID. Re-applying the same alert after a
/// redelivery updates the evidence columns in place, so replays converge on
/// the latest engine decision instead of duplicating rows.
///
/// A row that has already reached `resolved` is never rewritten: resolution
/// is terminal, so a stale engine decision for a resolved alert is dropped
/// here. Returns `true` when the row was written, `false` when the resolved
/// guard skipped it.
///
/// # Errors
///
/// Returns `DbError` on database query failure.
pub async fn upsert_alert(pool: &PgPool, alert: &Alert) -> Result<bool, DbError> {
    let written = sqlx::query(
        "INSERT INTO alerts \
           (id, dedup_key, brand, bias_type, trust_score, severity, \
            text_sample, state, triggered_at, resolved_at) \
         VALUES ($1, $2, $3, $4, $5, $6::alert_severity, $7, $8::alert_state, $9, $10) \
         ON CONFLICT (id) DO UPDATE SET \
           trust_score = EXCLUDED.trust_score, \
           severity = EXCLUDED.severity, \
           text_sample = EXCLUDED.text_sample, \
           state = EXCLUDED.state, \
           triggered_at = EXCLUDED.triggered_at, \
           resolved_at = EXCLUDED.resolved_at, \
           updated_at = NOW() \
         WHERE alerts.state <> 'resolved'",
    )
    .bind(alert.id)
    .bind(&alert.dedup_key)
    .bind(&alert.brand)
    .bind(alert.bias_type.map(|b| b.as_str()))
    .bind(score_to_decimal(alert.trust_score))
    .bind(alert.severity.as_str())
    .bind(&alert.text_sample)
    .bind(alert.state.as_str())
    .bind(alert.triggered_at)
    .bind(alert.resolved_at)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(written == 1)
}

/// Marks an Open alert as Acknowledged. Acknowledging an already-acknowledged
/// alert is a no-op.
///
/// # Errors
///
/// Returns `AlertError::AlertNotFound` for an unknown ID and
/// `AlertError::AlertAlreadyResolved` when the alert has reached its terminal
/// state, or `DbError` on query failure.
pub async fn acknowledge_alert(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let updated = sqlx::query(
        "UPDATE alerts SET state = 'acknowledged', updated_at = NOW() \
         WHERE id = $1 AND state = 'open'",
    )
    .bind(id)
    .execute(pool)
    .await?
    .rows_affected();
    if updated == 1 {
        return Ok(());
    }
    match current_state(pool, id).await? {
        None => Err(AlertError::AlertNotFound(id).into()),
        Some(state) if state == "resolved" => Err(AlertError::AlertAlreadyResolved(id).into()),
        Some(_) => Ok(()),
    }
}

/// Resolves an alert, stamping `resolved_at`. Resolution is terminal.
///
/// # Errors
///
/// Returns `AlertError::AlertNotFound` for an unknown ID and
/// `AlertError::AlertAlreadyResolved` on a second resolve, or `DbError` on
/// query failure.
pub async fn resolve_alert(pool: &PgPool, id: Uuid, now: DateTime<Utc>) -> Result<(), DbError> {
    let updated = sqlx::query(
        "UPDATE alerts SET state = 'resolved', resolved_at = $2, updated_at = NOW() \
         WHERE id = $1 AND state <> 'resolved'",
    )
    .bind(id)
    .bind(now)
    .execute(pool)
    .await?
    .rows_affected();
    if updated == 1 {
        return Ok(());
    }
    match current_state(pool, id).await? {
        None => Err(AlertError::AlertNotFound(id).into()),
        Some(_) => Err(AlertError::AlertAlreadyResolved(id).into()),
    }
}

/// Sweeps Open alerts whose last trigger predates `cutoff`, resolving them in
/// bulk. Returns the number of alerts resolved.
///
/// # Errors
///
/// Returns `DbError` on database query failure.
pub async fn resolve_expired_alerts(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<u64, DbError> {
    let resolved = sqlx::query(
        "UPDATE alerts SET state = 'resolved', resolved_at = $2, updated_at = NOW() \
         WHERE state = 'open' AND triggered_at < $1",
    )
    .bind(cutoff)
    .bind(now)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(resolved)
}

/// Lists non-resolved alerts, optionally filtered by brand, most recent first.
///
/// # Errors
///
/// Returns `DbError` on database query failure.
pub async fn list_open_alerts(
    pool: &PgPool,
    brand: Option<&str>,
) -> Result<Vec<AlertRow>, DbError> {
    Ok(sqlx::query_as::<_, AlertRow>(
        "SELECT id, dedup_key, brand, bias_type, trust_score, \
                severity::TEXT AS severity, text_sample, state::TEXT AS state, \
                triggered_at, resolved_at \
         FROM alerts \
         WHERE state <> 'resolved' AND ($1::TEXT IS NULL OR brand = $1) \
         ORDER BY triggered_at DESC",
    )
    .bind(brand)
    .fetch_all(pool)
    .await?)
}

/// Open alerts for one brand, as domain alerts. The partition worker rebuilds
/// its dedup table from this at startup so a restart inside a cooldown window
/// refreshes the existing alert instead of minting a duplicate.
///
/// # Errors
///
/// Returns `DbError` on database query failure or an undecodable row.
pub async fn open_alerts_for_brand(pool: &PgPool, brand: &str) -> Result<Vec<Alert>, DbError> {
    let rows = sqlx::query_as::<_, AlertRow>(
        "SELECT id, dedup_key, brand, bias_type, trust_score, \
                severity::TEXT AS severity, text_sample, state::TEXT AS state, \
                triggered_at, resolved_at \
         FROM alerts \
         WHERE state = 'open' AND brand = $1",
    )
    .bind(brand)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(AlertRow::into_alert).collect()
}

/// Fetches a single alert by ID.
///
/// # Errors
///
/// Returns `DbError::NotFound` for an unknown ID, or `DbError` on query
/// failure.
pub async fn get_alert(pool: &PgPool, id: Uuid) -> Result<AlertRow, DbError> {
    sqlx::query_as::<_, AlertRow>(
        "SELECT id, dedup_key, brand, bias_type, trust_score, \
                severity::TEXT AS severity, text_sample, state::TEXT AS state, \
                triggered_at, resolved_at \
         FROM alerts WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

async fn current_state(pool: &PgPool, id: Uuid) -> Result<Option<String>, DbError> {
    Ok(
        sqlx::query_scalar::<_, String>("SELECT state::TEXT FROM alerts WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?,
    )
}
