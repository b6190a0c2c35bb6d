//! Partition workers: strictly-sequential per-partition processing.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use trustwatch_alerts::{AlertDecision, AlertEngine, AlertEvent};
use trustwatch_core::{RawMention, Severity};
use trustwatch_db::DbError;
use trustwatch_scoring::{Classify, ScoringEngine};

use crate::{MentionQueue, PipelineError, StoreWriter};

/// Backoff cap for transient store retries.
const MAX_RETRY_DELAY_MS: u64 = 60_000;

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Transient-failure retries per partition before it is marked degraded.
    pub retry_budget: u32,
    pub backoff_base_ms: u64,
    /// A polled record older than this (by `ingested_at`) raises a delay
    /// trigger for its brand.
    pub ingestion_delay_bound_secs: i64,
}

struct PartitionState {
    name: String,
    next_offset: i64,
    degraded: bool,
}

/// Owns a disjoint set of partitions. Within each partition, records are
/// processed strictly in offset order and the offset commits only after the
/// store acknowledges every effect of the record.
pub struct PartitionWorker<C> {
    partitions: Vec<String>,
    queue: Arc<dyn MentionQueue>,
    store: Arc<dyn StoreWriter>,
    scoring: Arc<ScoringEngine<C>>,
    alerts: AlertEngine,
    events: mpsc::Sender<AlertEvent>,
    shutdown: watch::Receiver<bool>,
    options: WorkerOptions,
}

impl<C: Classify> PartitionWorker<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        partitions: Vec<String>,
        queue: Arc<dyn MentionQueue>,
        store: Arc<dyn StoreWriter>,
        scoring: Arc<ScoringEngine<C>>,
        alerts: AlertEngine,
        events: mpsc::Sender<AlertEvent>,
        shutdown: watch::Receiver<bool>,
        options: WorkerOptions,
    ) -> Self {
        Self {
            partitions,
            queue,
            store,
            scoring,
            alerts,
            events,
            shutdown,
            options,
        }
    }

    /// Runs until every owned partition is drained or degraded, or shutdown
    /// is signalled. An in-flight record is always finished before stopping.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError` only for failures outside any single
    /// partition's containment (a degraded partition is logged and skipped,
    /// not an error).
    pub async fn run(mut self) -> Result<(), PipelineError> {
        let mut states = Vec::with_capacity(self.partitions.len());
        for name in self.partitions.clone() {
            let store = Arc::clone(&self.store);
            let partition = name.clone();
            let next_offset =
                Self::with_retry(&self.options, &name, "load committed offset", || {
                    store.committed_offset(&partition)
                })
                .await?;
            tracing::debug!(partition = %name, next_offset, "partition resumed");

            // Rebuild the dedup table from the store so a restart inside a
            // cooldown window refreshes the persisted alert instead of
            // opening a duplicate under the same key.
            let store = Arc::clone(&self.store);
            let partition = name.clone();
            let open = Self::with_retry(&self.options, &name, "load open alerts", || {
                store.open_alerts(&partition)
            })
            .await?;
            if !open.is_empty() {
                tracing::debug!(partition = %name, count = open.len(), "open alerts adopted");
            }
            for alert in open {
                self.alerts.adopt_open(alert);
            }

            states.push(PartitionState {
                name,
                next_offset,
                degraded: false,
            });
        }

        'outer: loop {
            let mut progressed = false;
            for state in &mut states {
                if state.degraded {
                    continue;
                }
                if *self.shutdown.borrow() {
                    break 'outer;
                }
                let Some(mention) = self.queue.poll(&state.name, state.next_offset).await else {
                    continue;
                };
                let partition = state.name.clone();
                match self.process(&partition, state.next_offset, mention).await {
                    Ok(()) => {
                        state.next_offset += 1;
                        progressed = true;
                    }
                    Err(PipelineError::PartitionDegraded {
                        partition,
                        attempts,
                        reason,
                    }) => {
                        tracing::error!(
                            partition = %partition,
                            attempts,
                            reason = %reason,
                            "partition degraded, halting its processing"
                        );
                        state.degraded = true;
                        self.escalate(&partition).await;
                    }
                    Err(err) => return Err(err),
                }
            }

            let swept = self.alerts.sweep(Utc::now());
            if let Err(err) = self.flush_decisions("sweep", swept).await {
                tracing::warn!(error = %err, "failed to persist alert sweep results");
            }

            if *self.shutdown.borrow() || !progressed {
                break;
            }
        }
        Ok(())
    }

    /// One record, end to end: score, evaluate alerts, persist, commit.
    async fn process(
        &mut self,
        partition: &str,
        offset: i64,
        mention: RawMention,
    ) -> Result<(), PipelineError> {
        let now = Utc::now();
        let fingerprint = mention.content_fingerprint();
        let mut decisions: Vec<AlertDecision> = Vec::new();

        // Delay trigger fires even when scoring fails, so a lagging
        // partition surfaces regardless of classifier health.
        let delay_secs = (now - mention.ingested_at).num_seconds();
        if delay_secs > self.options.ingestion_delay_bound_secs {
            decisions.extend(self.alerts.ingestion_delay(&mention.brand, delay_secs, now));
        }

        match self.scoring.score(&mention).await {
            Ok(scored) => {
                let store = Arc::clone(&self.store);
                let persisted =
                    Self::with_retry(&self.options, partition, "persist scored mention", || {
                        store.persist_scored(&scored, &fingerprint)
                    })
                    .await;
                match persisted {
                    Ok(_inserted) => {
                        decisions.extend(self.alerts.evaluate(&scored, &mention.text, now));
                    }
                    Err(PipelineError::Store(DbError::FingerprintConflict { .. })) => {
                        tracing::warn!(
                            mention_id = %mention.id,
                            brand = %mention.brand,
                            "content fingerprint conflict, quarantining record"
                        );
                        let store = Arc::clone(&self.store);
                        Self::with_retry(&self.options, partition, "quarantine mention", || {
                            store.quarantine(
                                &mention.id,
                                &fingerprint,
                                "content fingerprint conflict on redelivery",
                            )
                        })
                        .await?;
                    }
                    Err(err) => return Err(err),
                }
            }
            // Scoring errors are permanent per-record: log, skip, advance.
            Err(err) => {
                tracing::warn!(
                    mention_id = %mention.id,
                    brand = %mention.brand,
                    error = %err,
                    "skipping unprocessable mention"
                );
            }
        }

        self.flush_decisions(partition, decisions).await?;

        let store = Arc::clone(&self.store);
        let next_offset = offset + 1;
        Self::with_retry(&self.options, partition, "commit offset", || {
            store.commit_offset(partition, next_offset)
        })
        .await?;
        Ok(())
    }

    async fn flush_decisions(
        &mut self,
        partition: &str,
        decisions: Vec<AlertDecision>,
    ) -> Result<(), PipelineError> {
        for decision in decisions {
            let alert = decision.alert().clone();
            let store = Arc::clone(&self.store);
            let written = Self::with_retry(&self.options, partition, "persist alert", || {
                store.persist_alert(&alert)
            })
            .await?;
            if !written {
                // The store row reached Resolved out of band, likely via an
                // operator action. Resolution is terminal; drop the stale
                // entry so the next trigger opens a fresh alert.
                tracing::info!(
                    alert_id = %alert.id,
                    dedup_key = %alert.dedup_key,
                    "alert resolved externally, dropping its dedup entry"
                );
                self.alerts.forget(alert.id);
                continue;
            }

            let event = match decision {
                AlertDecision::Created { event, .. } => Some(event),
                AlertDecision::Updated { event, .. } => event,
                AlertDecision::AutoResolved { .. } => None,
            };
            if let Some(event) = event {
                if self.events.send(event).await.is_err() {
                    tracing::warn!("alert event channel closed, dropping event");
                }
            }
        }
        Ok(())
    }

    /// Degraded-partition escalation: an operational Low event for the
    /// notifier, alongside the error log. Nothing is persisted here since
    /// the store is exactly what just failed; the nil id tells consumers
    /// there is no alert row to look up.
    async fn escalate(&self, partition: &str) {
        let event = AlertEvent {
            alert_id: Uuid::nil(),
            brand: partition.to_string(),
            severity: Severity::Low,
            bias_type: None,
            trust_score: 0.0,
            text_sample: format!("partition {partition} degraded: retry budget exhausted"),
            timestamp: Utc::now(),
        };
        if self.events.send(event).await.is_err() {
            tracing::warn!("alert event channel closed, dropping escalation event");
        }
    }

    async fn with_retry<T, F, Fut>(
        options: &WorkerOptions,
        partition: &str,
        what: &str,
        mut op: F,
    ) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DbError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !is_transient(&err) => return Err(PipelineError::Store(err)),
                Err(err) => {
                    attempt += 1;
                    if attempt > options.retry_budget {
                        return Err(PipelineError::PartitionDegraded {
                            partition: partition.to_string(),
                            attempts: attempt,
                            reason: format!("{what}: {err}"),
                        });
                    }
                    let exp = options
                        .backoff_base_ms
                        .saturating_mul(1u64 << (attempt - 1).min(10));
                    let delay_ms = exp.min(MAX_RETRY_DELAY_MS);
                    tracing::warn!(
                        partition,
                        what,
                        attempt,
                        delay_ms,
                        error = %err,
                        "transient store failure, backing off"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }
}

fn is_transient(err: &DbError) -> bool {
    matches!(err, DbError::Sqlx(_))
}
