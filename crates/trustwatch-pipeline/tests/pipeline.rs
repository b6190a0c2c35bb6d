//! End-to-end pipeline tests over the in-memory queue and store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::{mpsc, watch};

use trustwatch_classifier::ClassifierError;
use trustwatch_core::{
    Alert, AlertState, BiasCategory, BiasSignal, Classification, MentionSource, RawMention,
    ScoredMention, ScoringPolicy, Sentiment, SentimentLabel, Severity,
};
use trustwatch_db::DbError;
use trustwatch_pipeline::{
    Coordinator, CoordinatorOptions, MemoryQueue, MemoryStore, MentionQueue, StoreWriter,
};
use trustwatch_scoring::{Classify, ScoringEngine};

struct CleanClassifier;

#[async_trait]
impl Classify for CleanClassifier {
    async fn classify(&self, _text: &str, _brand: &str) -> Result<Classification, ClassifierError> {
        Ok(Classification {
            bias: Vec::new(),
            sentiment: Sentiment {
                label: SentimentLabel::Positive,
                confidence: 0.9,
            },
            confidence: 0.9,
        })
    }
}

struct HostileClassifier;

#[async_trait]
impl Classify for HostileClassifier {
    async fn classify(&self, _text: &str, _brand: &str) -> Result<Classification, ClassifierError> {
        Ok(Classification {
            bias: vec![BiasSignal {
                category: BiasCategory::Urban,
                confidence: 0.95,
            }],
            sentiment: Sentiment {
                label: SentimentLabel::Negative,
                confidence: 0.8,
            },
            confidence: 0.9,
        })
    }
}

struct DownClassifier;

#[async_trait]
impl Classify for DownClassifier {
    async fn classify(&self, _text: &str, _brand: &str) -> Result<Classification, ClassifierError> {
        Err(ClassifierError::Unavailable {
            reason: "connection refused".to_string(),
        })
    }
}

/// A store whose scored-mention writes always fail the way a lost database
/// connection does.
struct FailingStore;

#[async_trait]
impl StoreWriter for FailingStore {
    async fn persist_scored(
        &self,
        _scored: &ScoredMention,
        _content_fingerprint: &str,
    ) -> Result<bool, DbError> {
        Err(DbError::Sqlx(sqlx::Error::Protocol(
            "connection reset by peer".to_string(),
        )))
    }

    async fn quarantine(
        &self,
        _mention_id: &str,
        _seen_fingerprint: &str,
        _reason: &str,
    ) -> Result<(), DbError> {
        Ok(())
    }

    async fn persist_alert(&self, _alert: &Alert) -> Result<bool, DbError> {
        Ok(true)
    }

    async fn open_alerts(&self, _brand: &str) -> Result<Vec<Alert>, DbError> {
        Ok(Vec::new())
    }

    async fn commit_offset(&self, _partition: &str, _next_offset: i64) -> Result<(), DbError> {
        Ok(())
    }

    async fn committed_offset(&self, _partition: &str) -> Result<i64, DbError> {
        Ok(0)
    }
}

fn mention(id: &str, brand: &str, text: &str) -> RawMention {
    let now = Utc::now();
    RawMention {
        id: id.to_string(),
        brand: brand.to_string(),
        source: MentionSource::Forum,
        text: text.to_string(),
        author: Some("reviewer42".to_string()),
        url: None,
        published_at: now - Duration::minutes(1),
        ingested_at: now,
    }
}

fn options() -> CoordinatorOptions {
    CoordinatorOptions {
        worker_count: 2,
        retry_budget: 2,
        backoff_base_ms: 1,
        ingestion_delay_bound_secs: 600,
    }
}

async fn run_pipeline<C: Classify + 'static>(
    classifier: C,
    queue: Arc<MemoryQueue>,
    store: Arc<MemoryStore>,
) -> Vec<trustwatch_alerts::AlertEvent> {
    let policy = ScoringPolicy::default();
    let scoring = Arc::new(ScoringEngine::new(classifier, policy.clone()));
    let coordinator = Coordinator::new(
        queue as Arc<dyn MentionQueue>,
        store as Arc<dyn StoreWriter>,
        scoring,
        policy,
        options(),
    );
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (event_tx, mut event_rx) = mpsc::channel(64);
    coordinator.run(shutdown_rx, event_tx).await.unwrap();

    let mut events = Vec::new();
    while let Some(event) = event_rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn clean_mentions_score_high_and_raise_no_alerts() {
    let queue = Arc::new(MemoryQueue::from_mentions(vec![
        mention("f-1", "acme", "love the new acme campaign"),
        mention("f-2", "acme", "solid value, would recommend"),
        mention("b-1", "bolt", "bolt is doing great work"),
    ]));
    let store = Arc::new(MemoryStore::new(0.2));

    let events = run_pipeline(CleanClassifier, Arc::clone(&queue), Arc::clone(&store)).await;

    assert!(events.is_empty());
    assert_eq!(store.scored_count(), 3);
    assert_eq!(store.offset("acme"), 2);
    assert_eq!(store.offset("bolt"), 1);

    let acme = store.aggregate("acme").unwrap();
    assert_eq!(acme.mention_count, 2);
    assert!((acme.avg_trust_score - 100.0).abs() < f64::EPSILON);
    assert!(!store.scored("f-1").unwrap().degraded);
}

#[tokio::test]
async fn hostile_mentions_open_one_deduplicated_alert_per_trigger() {
    let queue = Arc::new(MemoryQueue::from_mentions(vec![
        mention("f-1", "acme", "typical city-dweller nonsense from acme"),
        mention("f-2", "acme", "more of the same from acme"),
    ]));
    let store = Arc::new(MemoryStore::new(0.2));

    let events = run_pipeline(HostileClassifier, Arc::clone(&queue), Arc::clone(&store)).await;

    // Urban 0.95 plus strong negative sentiment lands below the critical
    // band, so both the score trigger and the bias trigger fire; the second
    // mention refreshes both alerts inside the cooldown window.
    assert_eq!(store.open_alert_count(), 2);
    let created: Vec<_> = events
        .iter()
        .filter(|e| e.severity >= Severity::High)
        .collect();
    assert!(!created.is_empty());

    let score_alert = store
        .alerts()
        .into_iter()
        .find(|a| a.bias_type.is_none())
        .unwrap();
    assert_eq!(score_alert.severity, Severity::Critical);
    let bias_alert = store
        .alerts()
        .into_iter()
        .find(|a| a.bias_type == Some(BiasCategory::Urban))
        .unwrap();
    assert_eq!(bias_alert.severity, Severity::Critical);
}

#[tokio::test]
async fn replay_from_offset_zero_changes_nothing() {
    let queue = Arc::new(MemoryQueue::from_mentions(vec![
        mention("f-1", "acme", "love the campaign"),
        mention("f-2", "acme", "still loving it"),
    ]));
    let store = Arc::new(MemoryStore::new(0.2));

    run_pipeline(CleanClassifier, Arc::clone(&queue), Arc::clone(&store)).await;
    let first = store.aggregate("acme").unwrap();

    // Simulate a crash before the offset commit: rewind and replay.
    store.commit_offset("acme", 0).await.unwrap();
    run_pipeline(CleanClassifier, Arc::clone(&queue), Arc::clone(&store)).await;

    let second = store.aggregate("acme").unwrap();
    assert_eq!(store.scored_count(), 2);
    assert_eq!(first.mention_count, second.mention_count);
    assert!((first.avg_trust_score - second.avg_trust_score).abs() < f64::EPSILON);
    assert_eq!(store.offset("acme"), 2);
}

#[tokio::test]
async fn second_run_resumes_from_committed_offset() {
    let queue = Arc::new(MemoryQueue::from_mentions(vec![
        mention("f-1", "acme", "love the campaign"),
    ]));
    let store = Arc::new(MemoryStore::new(0.2));

    run_pipeline(CleanClassifier, Arc::clone(&queue), Arc::clone(&store)).await;
    run_pipeline(CleanClassifier, Arc::clone(&queue), Arc::clone(&store)).await;

    assert_eq!(store.scored_count(), 1);
    assert_eq!(store.aggregate("acme").unwrap().mention_count, 1);
}

#[tokio::test]
async fn conflicting_redelivery_is_quarantined_and_skipped() {
    let queue = Arc::new(MemoryQueue::from_mentions(vec![
        mention("f-1", "acme", "original text"),
        mention("f-1", "acme", "tampered text, same id"),
        mention("f-2", "acme", "a later clean mention"),
    ]));
    let store = Arc::new(MemoryStore::new(0.2));

    run_pipeline(CleanClassifier, Arc::clone(&queue), Arc::clone(&store)).await;

    assert_eq!(store.quarantined_count(), 1);
    // The partition kept going past the poisoned record.
    assert_eq!(store.offset("acme"), 3);
    assert_eq!(store.scored("f-1").unwrap().mention_id, "f-1");
    assert!(store.scored("f-2").is_some());
    // The aggregate counted each distinct mention once.
    assert_eq!(store.aggregate("acme").unwrap().mention_count, 2);
}

#[tokio::test]
async fn classifier_outage_degrades_instead_of_stalling() {
    let queue = Arc::new(MemoryQueue::from_mentions(vec![
        mention("f-1", "acme", "this campaign is a scam, total ripoff"),
        mention("f-2", "acme", "great product, love it"),
    ]));
    let store = Arc::new(MemoryStore::new(0.2));

    run_pipeline(DownClassifier, Arc::clone(&queue), Arc::clone(&store)).await;

    assert_eq!(store.scored_count(), 2);
    assert_eq!(store.offset("acme"), 2);
    let negative = store.scored("f-1").unwrap();
    assert!(negative.degraded);
    assert!(negative.bias.is_empty());
    let positive = store.scored("f-2").unwrap();
    assert!(positive.degraded);
    assert!(positive.trust_score > negative.trust_score);
}

#[tokio::test]
async fn invalid_mention_is_skipped_but_offset_advances() {
    let mut bad = mention("f-1", "acme", "ok text");
    bad.text = String::new();
    let queue = Arc::new(MemoryQueue::from_mentions(vec![
        bad,
        mention("f-2", "acme", "a fine mention"),
    ]));
    let store = Arc::new(MemoryStore::new(0.2));

    run_pipeline(CleanClassifier, Arc::clone(&queue), Arc::clone(&store)).await;

    assert_eq!(store.scored_count(), 1);
    assert!(store.scored("f-1").is_none());
    assert_eq!(store.offset("acme"), 2);
}

#[tokio::test]
async fn stale_ingestion_raises_a_low_delay_alert() {
    let mut stale = mention("f-1", "acme", "perfectly nice text");
    stale.ingested_at = Utc::now() - Duration::minutes(30);
    stale.published_at = stale.ingested_at - Duration::minutes(1);
    let queue = Arc::new(MemoryQueue::from_mentions(vec![stale]));
    let store = Arc::new(MemoryStore::new(0.2));

    let events = run_pipeline(CleanClassifier, Arc::clone(&queue), Arc::clone(&store)).await;

    let delay_event = events
        .iter()
        .find(|e| e.severity == Severity::Low)
        .expect("delay event");
    assert_eq!(delay_event.brand, "acme");
    assert_eq!(store.open_alert_count(), 1);
}

#[tokio::test]
async fn restart_within_cooldown_refreshes_the_same_alerts() {
    let queue = Arc::new(MemoryQueue::from_mentions(vec![
        mention("f-1", "acme", "typical city-dweller nonsense from acme"),
        mention("f-2", "acme", "more of the same from acme"),
    ]));
    let store = Arc::new(MemoryStore::new(0.2));

    run_pipeline(HostileClassifier, Arc::clone(&queue), Arc::clone(&store)).await;
    let mut first_ids: Vec<_> = store.alerts().iter().map(|a| a.id).collect();
    first_ids.sort_unstable();
    assert_eq!(first_ids.len(), 2);

    // Crash before the offset commit, then a fresh process replays the
    // partition. The new worker must adopt the persisted Open alerts and
    // refresh them in place — never open duplicates under the same keys.
    store.commit_offset("acme", 0).await.unwrap();
    run_pipeline(HostileClassifier, Arc::clone(&queue), Arc::clone(&store)).await;

    let mut second_ids: Vec<_> = store.alerts().iter().map(|a| a.id).collect();
    second_ids.sort_unstable();
    assert_eq!(second_ids, first_ids, "restart must keep the same alert rows");
    assert_eq!(store.open_alert_count(), 2);
    assert_eq!(store.offset("acme"), 2);
}

#[tokio::test]
async fn externally_resolved_alert_stays_resolved() {
    let queue = Arc::new(MemoryQueue::from_mentions(vec![
        mention("f-1", "acme", "typical city-dweller nonsense from acme"),
    ]));
    let store = Arc::new(MemoryStore::new(0.2));

    run_pipeline(HostileClassifier, Arc::clone(&queue), Arc::clone(&store)).await;
    let score_alert = store
        .alerts()
        .into_iter()
        .find(|a| a.bias_type.is_none())
        .unwrap();

    // Operator resolves the score alert, then the partition replays the
    // trigger inside the cooldown window.
    let resolved_at = Utc::now();
    store.resolve_alert(score_alert.id, resolved_at);
    store.commit_offset("acme", 0).await.unwrap();
    run_pipeline(HostileClassifier, Arc::clone(&queue), Arc::clone(&store)).await;

    // The resolved row is untouched and the re-trigger opened a fresh alert.
    let stored = store
        .alerts()
        .into_iter()
        .find(|a| a.id == score_alert.id)
        .unwrap();
    assert_eq!(stored.state, AlertState::Resolved);
    assert_eq!(stored.resolved_at, Some(resolved_at));

    let fresh = store
        .alerts()
        .into_iter()
        .find(|a| a.bias_type.is_none() && a.id != score_alert.id)
        .expect("re-trigger must open a new alert");
    assert_eq!(fresh.state, AlertState::Open);
    assert_eq!(fresh.dedup_key, score_alert.dedup_key);
    assert_eq!(store.open_alert_count(), 2);
}

#[tokio::test]
async fn store_outage_degrades_partition_and_emits_ops_event() {
    let queue = Arc::new(MemoryQueue::from_mentions(vec![
        mention("f-1", "acme", "a perfectly fine mention"),
    ]));
    let policy = ScoringPolicy::default();
    let scoring = Arc::new(ScoringEngine::new(CleanClassifier, policy.clone()));
    let coordinator = Coordinator::new(
        Arc::clone(&queue) as Arc<dyn MentionQueue>,
        Arc::new(FailingStore) as Arc<dyn StoreWriter>,
        scoring,
        policy,
        options(),
    );
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (event_tx, mut event_rx) = mpsc::channel(8);
    coordinator.run(shutdown_rx, event_tx).await.unwrap();

    let mut events = Vec::new();
    while let Some(event) = event_rx.recv().await {
        events.push(event);
    }
    let ops = events
        .iter()
        .find(|e| e.severity == Severity::Low)
        .expect("degraded partition must surface an operational event");
    assert_eq!(ops.brand, "acme");
    assert!(ops.text_sample.contains("degraded"));
    assert!(
        ops.alert_id.is_nil(),
        "a synthetic ops event carries no alert row id"
    );
}

#[tokio::test]
async fn shutdown_before_start_processes_nothing() {
    let queue = Arc::new(MemoryQueue::from_mentions(vec![
        mention("f-1", "acme", "never processed"),
    ]));
    let store = Arc::new(MemoryStore::new(0.2));

    let policy = ScoringPolicy::default();
    let scoring = Arc::new(ScoringEngine::new(CleanClassifier, policy.clone()));
    let coordinator = Coordinator::new(
        Arc::clone(&queue) as Arc<dyn MentionQueue>,
        Arc::clone(&store) as Arc<dyn StoreWriter>,
        scoring,
        policy,
        options(),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();
    let (event_tx, _event_rx) = mpsc::channel(8);
    coordinator.run(shutdown_rx, event_tx).await.unwrap();

    assert_eq!(store.scored_count(), 0);
    assert_eq!(store.offset("acme"), 0);
}
