//! The persistence seam between partition workers and the database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use trustwatch_core::{Alert, AlertState, BrandAggregate, ScoredMention};
use trustwatch_db::DbError;

#[async_trait]
pub trait StoreWriter: Send + Sync {
    /// Persist one scored mention and fold it into the brand aggregate.
    /// Returns `true` when the mention was newly inserted; redeliveries
    /// rewrite the row and leave the aggregate untouched.
    async fn persist_scored(
        &self,
        scored: &ScoredMention,
        content_fingerprint: &str,
    ) -> Result<bool, DbError>;

    /// Record a conflicting redelivery for manual inspection.
    async fn quarantine(
        &self,
        mention_id: &str,
        seen_fingerprint: &str,
        reason: &str,
    ) -> Result<(), DbError>;

    /// Persist an alert row (create, refresh, or resolve). Returns `false`
    /// when the stored row is already Resolved and the write was skipped —
    /// resolution is terminal, so the caller must drop its dedup entry for
    /// that alert.
    async fn persist_alert(&self, alert: &Alert) -> Result<bool, DbError>;

    /// The Open alerts for one brand, used to rebuild a worker's dedup table
    /// at startup.
    async fn open_alerts(&self, brand: &str) -> Result<Vec<Alert>, DbError>;

    /// Commit the next offset to poll for a partition. Called only after
    /// every other effect of the record has been acknowledged.
    async fn commit_offset(&self, partition: &str, next_offset: i64) -> Result<(), DbError>;

    /// The committed next-offset for a partition, 0 when never polled.
    async fn committed_offset(&self, partition: &str) -> Result<i64, DbError>;
}

/// Postgres-backed writer over the trustwatch-db operations.
pub struct PgStoreWriter {
    pool: PgPool,
    ewma_alpha: f64,
}

impl PgStoreWriter {
    #[must_use]
    pub fn new(pool: PgPool, ewma_alpha: f64) -> Self {
        Self { pool, ewma_alpha }
    }
}

#[async_trait]
impl StoreWriter for PgStoreWriter {
    async fn persist_scored(
        &self,
        scored: &ScoredMention,
        content_fingerprint: &str,
    ) -> Result<bool, DbError> {
        trustwatch_db::persist_scored_record(
            &self.pool,
            scored,
            content_fingerprint,
            self.ewma_alpha,
        )
        .await
    }

    async fn quarantine(
        &self,
        mention_id: &str,
        seen_fingerprint: &str,
        reason: &str,
    ) -> Result<(), DbError> {
        let stored = trustwatch_db::get_stored_fingerprint(&self.pool, mention_id)
            .await?
            .unwrap_or_default();
        trustwatch_db::quarantine_mention(&self.pool, mention_id, seen_fingerprint, &stored, reason)
            .await
    }

    async fn persist_alert(&self, alert: &Alert) -> Result<bool, DbError> {
        trustwatch_db::upsert_alert(&self.pool, alert).await
    }

    async fn open_alerts(&self, brand: &str) -> Result<Vec<Alert>, DbError> {
        trustwatch_db::open_alerts_for_brand(&self.pool, brand).await
    }

    async fn commit_offset(&self, partition: &str, next_offset: i64) -> Result<(), DbError> {
        trustwatch_db::commit_offset(&self.pool, partition, next_offset).await
    }

    async fn committed_offset(&self, partition: &str) -> Result<i64, DbError> {
        trustwatch_db::get_committed_offset(&self.pool, partition).await
    }
}

#[derive(Default)]
struct MemoryStoreInner {
    scored: HashMap<String, (ScoredMention, String)>,
    aggregates: HashMap<String, BrandAggregate>,
    alerts: HashMap<Uuid, Alert>,
    quarantined: Vec<(String, String, String)>,
    offsets: HashMap<String, i64>,
}

/// In-memory writer with the same semantics as [`PgStoreWriter`], including
/// the fingerprint-conflict check, the insert-gated aggregate fold, the
/// resolved-row write guard, and the one-Open-alert-per-dedup-key constraint
/// the database enforces with a partial unique index. Used by the pipeline
/// tests.
pub struct MemoryStore {
    ewma_alpha: f64,
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(ewma_alpha: f64) -> Self {
        Self {
            ewma_alpha,
            inner: Mutex::new(MemoryStoreInner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryStoreInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[must_use]
    pub fn scored_count(&self) -> usize {
        self.lock().scored.len()
    }

    #[must_use]
    pub fn scored(&self, mention_id: &str) -> Option<ScoredMention> {
        self.lock().scored.get(mention_id).map(|(s, _)| s.clone())
    }

    #[must_use]
    pub fn aggregate(&self, brand: &str) -> Option<BrandAggregate> {
        self.lock().aggregates.get(brand).cloned()
    }

    #[must_use]
    pub fn alerts(&self) -> Vec<Alert> {
        self.lock().alerts.values().cloned().collect()
    }

    #[must_use]
    pub fn open_alert_count(&self) -> usize {
        self.lock()
            .alerts
            .values()
            .filter(|a| a.state == AlertState::Open)
            .count()
    }

    /// Resolve an alert in place, the way an operator action would in the
    /// database. Panics on an unknown ID, as tests resolve alerts they made.
    pub fn resolve_alert(&self, id: Uuid, now: DateTime<Utc>) {
        let mut inner = self.lock();
        let alert = inner
            .alerts
            .get_mut(&id)
            .unwrap_or_else(|| panic!("no alert {id}"));
        alert.state = AlertState::Resolved;
        alert.resolved_at = Some(now);
    }

    #[must_use]
    pub fn quarantined_count(&self) -> usize {
        self.lock().quarantined.len()
    }

    #[must_use]
    pub fn offset(&self, partition: &str) -> i64 {
        self.lock().offsets.get(partition).copied().unwrap_or(0)
    }
}

#[async_trait]
impl StoreWriter for MemoryStore {
    async fn persist_scored(
        &self,
        scored: &ScoredMention,
        content_fingerprint: &str,
    ) -> Result<bool, DbError> {
        let mut inner = self.lock();
        if let Some((_, stored_fp)) = inner.scored.get(&scored.mention_id) {
            if stored_fp != content_fingerprint {
                return Err(DbError::FingerprintConflict {
                    mention_id: scored.mention_id.clone(),
                });
            }
        }
        let inserted = !inner.scored.contains_key(&scored.mention_id);
        inner.scored.insert(
            scored.mention_id.clone(),
            (scored.clone(), content_fingerprint.to_string()),
        );
        if inserted {
            let aggregate = inner
                .aggregates
                .entry(scored.brand.clone())
                .or_insert_with(|| BrandAggregate {
                    brand: scored.brand.clone(),
                    mention_count: 0,
                    avg_trust_score: 0.0,
                    last_updated: scored.scored_at,
                });
            aggregate.apply(scored.trust_score, self.ewma_alpha, scored.scored_at);
        }
        Ok(inserted)
    }

    async fn quarantine(
        &self,
        mention_id: &str,
        seen_fingerprint: &str,
        reason: &str,
    ) -> Result<(), DbError> {
        self.lock().quarantined.push((
            mention_id.to_string(),
            seen_fingerprint.to_string(),
            reason.to_string(),
        ));
        Ok(())
    }

    async fn persist_alert(&self, alert: &Alert) -> Result<bool, DbError> {
        let mut inner = self.lock();
        if let Some(existing) = inner.alerts.get(&alert.id) {
            if existing.state == AlertState::Resolved {
                return Ok(false);
            }
        }
        if alert.state == AlertState::Open {
            let conflicting = inner.alerts.values().any(|a| {
                a.id != alert.id && a.dedup_key == alert.dedup_key && a.state == AlertState::Open
            });
            if conflicting {
                return Err(DbError::Sqlx(sqlx::Error::Protocol(format!(
                    "duplicate key value violates unique index \
                     \"idx_alerts_one_open_per_key\" for dedup key '{}'",
                    alert.dedup_key
                ))));
            }
        }
        inner.alerts.insert(alert.id, alert.clone());
        Ok(true)
    }

    async fn open_alerts(&self, brand: &str) -> Result<Vec<Alert>, DbError> {
        Ok(self
            .lock()
            .alerts
            .values()
            .filter(|a| a.brand == brand && a.state == AlertState::Open)
            .cloned()
            .collect())
    }

    async fn commit_offset(&self, partition: &str, next_offset: i64) -> Result<(), DbError> {
        self.lock()
            .offsets
            .insert(partition.to_string(), next_offset);
        Ok(())
    }

    async fn committed_offset(&self, partition: &str) -> Result<i64, DbError> {
        Ok(self.offset(partition))
    }
}
