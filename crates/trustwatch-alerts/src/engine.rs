//! The dedup/cooldown state machine.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use trustwatch_core::{
    Alert, AlertState, BiasCategory, ScoredMention, ScoringPolicy, Severity,
};

use crate::severity::{bias_severity, score_severity};

/// How long a text sample is kept on an alert.
const TEXT_SAMPLE_MAX: usize = 240;

/// Identity of "the same incident" for dedup purposes:
/// `(brand, bias-type-or-null, severity bucket)`.
///
/// The bucket separates score-driven alerts from operational delay alerts so
/// severity can escalate in place without minting a new incident.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub brand: String,
    pub bias_type: Option<BiasCategory>,
    pub bucket: Bucket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// Trust-score and bias triggers.
    Score,
    /// Ingestion-delay triggers reported by the coordinator.
    Delay,
}

impl DedupKey {
    /// Stable string form, persisted alongside the alert row.
    #[must_use]
    pub fn render(&self) -> String {
        let bias = self.bias_type.map_or("-", BiasCategory::as_str);
        let bucket = match self.bucket {
            Bucket::Score => "score",
            Bucket::Delay => "delay",
        };
        format!("{}|{}|{}", self.brand, bias, bucket)
    }
}

/// Outbound event emitted on alert creation or severity escalation, routed by
/// the external notifier.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    /// Nil for synthetic operational events with no alert row behind them.
    pub alert_id: Uuid,
    pub brand: String,
    pub severity: Severity,
    pub bias_type: Option<BiasCategory>,
    pub trust_score: f64,
    pub text_sample: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    fn from_alert(alert: &Alert) -> Self {
        Self {
            alert_id: alert.id,
            brand: alert.brand.clone(),
            severity: alert.severity,
            bias_type: alert.bias_type,
            trust_score: alert.trust_score,
            text_sample: alert.text_sample.clone(),
            timestamp: alert.triggered_at,
        }
    }
}

/// What the caller must persist (and possibly notify) after evaluation.
#[derive(Debug, Clone)]
pub enum AlertDecision {
    /// A new Open alert. Always carries a notifier event.
    Created { alert: Alert, event: AlertEvent },
    /// An existing Open alert refreshed within its cooldown window. Carries
    /// an event only when the severity escalated.
    Updated {
        alert: Alert,
        event: Option<AlertEvent>,
    },
    /// An Open alert whose cooldown expired with no re-trigger; `resolved_at`
    /// is set. No event — resolution is not notified.
    AutoResolved { alert: Alert },
}

impl AlertDecision {
    /// The alert row this decision writes.
    #[must_use]
    pub fn alert(&self) -> &Alert {
        match self {
            AlertDecision::Created { alert, .. }
            | AlertDecision::Updated { alert, .. }
            | AlertDecision::AutoResolved { alert } => alert,
        }
    }
}

struct OpenEntry {
    alert: Alert,
    last_trigger: DateTime<Utc>,
}

/// One candidate alert produced by trigger evaluation.
struct Candidate {
    bias_type: Option<BiasCategory>,
    bucket: Bucket,
    severity: Severity,
    trust_score: f64,
}

/// Per-partition alert engine.
///
/// Holds the open-alert dedup table for the brands this partition owns.
/// Cooldown expiry is evaluated lazily on the next trigger for a key; the
/// store-level sweep covers keys that never re-trigger.
pub struct AlertEngine {
    policy: ScoringPolicy,
    open: HashMap<DedupKey, OpenEntry>,
}

impl AlertEngine {
    #[must_use]
    pub fn new(policy: ScoringPolicy) -> Self {
        Self {
            policy,
            open: HashMap::new(),
        }
    }

    fn cooldown(&self) -> Duration {
        Duration::seconds(self.policy.cooldown_secs)
    }

    /// Seed the dedup table with an Open alert loaded from the store.
    ///
    /// Called at worker startup so a restart inside a cooldown window
    /// refreshes the persisted alert in place instead of minting a duplicate
    /// under the same dedup key. Non-Open alerts are ignored.
    pub fn adopt_open(&mut self, alert: Alert) {
        if alert.state != AlertState::Open {
            return;
        }
        let bucket = if alert.dedup_key.ends_with("|delay") {
            Bucket::Delay
        } else {
            Bucket::Score
        };
        let key = DedupKey {
            brand: alert.brand.clone(),
            bias_type: alert.bias_type,
            bucket,
        };
        let last_trigger = alert.triggered_at;
        self.open.insert(
            key,
            OpenEntry {
                alert,
                last_trigger,
            },
        );
    }

    /// Drop the dedup entry holding this alert, if any.
    ///
    /// Used when the store reports the alert was resolved externally: the
    /// entry is stale, and the next trigger for its key must open a fresh
    /// alert rather than rewrite the resolved row.
    pub fn forget(&mut self, alert_id: Uuid) {
        self.open.retain(|_, entry| entry.alert.id != alert_id);
    }

    /// Evaluate all score/bias triggers for one scored mention.
    ///
    /// `text_sample` is the mention text (truncated for storage); the latest
    /// evidence always wins on update.
    pub fn evaluate(
        &mut self,
        scored: &ScoredMention,
        text_sample: &str,
        now: DateTime<Utc>,
    ) -> Vec<AlertDecision> {
        let mut candidates = Vec::new();

        // Trust-score trigger: one candidate with no bias type.
        if let Some(severity) = score_severity(scored.trust_score, &self.policy) {
            candidates.push(Candidate {
                bias_type: None,
                bucket: Bucket::Score,
                severity,
                trust_score: scored.trust_score,
            });
        }

        // Bias triggers: one candidate per category above its own threshold.
        // Score severity still participates — the maximum across
        // simultaneously-firing conditions wins.
        for signal in &scored.bias {
            let bias_policy = self.policy.bias_policy(signal.category);
            if signal.confidence > bias_policy.alert_threshold {
                let severity = bias_severity(signal, &self.policy)
                    .max(score_severity(scored.trust_score, &self.policy).unwrap_or(Severity::Low));
                candidates.push(Candidate {
                    bias_type: Some(signal.category),
                    bucket: Bucket::Score,
                    severity,
                    trust_score: scored.trust_score,
                });
            }
        }

        let mut decisions = Vec::new();
        for candidate in candidates {
            self.apply(&scored.brand, candidate, text_sample, now, &mut decisions);
        }
        decisions
    }

    /// Distinct trigger type fed by the coordinator when a partition's
    /// ingestion lags beyond the configured bound. Always Low severity.
    pub fn ingestion_delay(
        &mut self,
        brand: &str,
        delay_secs: i64,
        now: DateTime<Utc>,
    ) -> Vec<AlertDecision> {
        let candidate = Candidate {
            bias_type: None,
            bucket: Bucket::Delay,
            severity: Severity::Low,
            trust_score: 0.0,
        };
        let sample = format!("ingestion delayed by {delay_secs}s for brand {brand}");
        let mut decisions = Vec::new();
        self.apply(brand, candidate, &sample, now, &mut decisions);
        decisions
    }

    /// Resolve every open entry whose cooldown expired before `now`.
    ///
    /// The in-memory counterpart of the store-level sweep; the coordinator
    /// runs it between records so long-quiet keys do not linger as Open.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<AlertDecision> {
        let cooldown = self.cooldown();
        let expired: Vec<DedupKey> = self
            .open
            .iter()
            .filter(|(_, entry)| now - entry.last_trigger > cooldown)
            .map(|(key, _)| key.clone())
            .collect();

        let mut decisions = Vec::new();
        for key in expired {
            if let Some(mut entry) = self.open.remove(&key) {
                entry.alert.state = AlertState::Resolved;
                entry.alert.resolved_at = Some(now);
                tracing::info!(
                    alert_id = %entry.alert.id,
                    dedup_key = %key.render(),
                    "alert auto-resolved after cooldown"
                );
                decisions.push(AlertDecision::AutoResolved { alert: entry.alert });
            }
        }
        decisions
    }

    /// Number of currently-open entries (test and metrics hook).
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    fn apply(
        &mut self,
        brand: &str,
        candidate: Candidate,
        text_sample: &str,
        now: DateTime<Utc>,
        decisions: &mut Vec<AlertDecision>,
    ) {
        let key = DedupKey {
            brand: brand.to_string(),
            bias_type: candidate.bias_type,
            bucket: candidate.bucket,
        };
        let sample = truncate_sample(text_sample);

        if let Some(mut entry) = self.open.remove(&key) {
            if now - entry.last_trigger <= self.cooldown() {
                // Within cooldown: refresh in place, latest evidence wins.
                let escalated = candidate.severity > entry.alert.severity;
                if escalated {
                    tracing::info!(
                        alert_id = %entry.alert.id,
                        from = %entry.alert.severity,
                        to = %candidate.severity,
                        "alert severity escalated"
                    );
                    entry.alert.severity = candidate.severity;
                }
                entry.alert.trust_score = candidate.trust_score;
                entry.alert.text_sample = sample;
                entry.alert.triggered_at = now;
                entry.last_trigger = now;
                let alert = entry.alert.clone();
                let event = escalated.then(|| AlertEvent::from_alert(&alert));
                self.open.insert(key, entry);
                decisions.push(AlertDecision::Updated { alert, event });
                return;
            }

            // Stale: the previous incident is over. Resolve it, then fall
            // through to create a fresh alert for this trigger.
            entry.alert.state = AlertState::Resolved;
            entry.alert.resolved_at = Some(now);
            decisions.push(AlertDecision::AutoResolved { alert: entry.alert });
        }

        let alert = Alert {
            id: Uuid::new_v4(),
            brand: brand.to_string(),
            bias_type: candidate.bias_type,
            trust_score: candidate.trust_score,
            severity: candidate.severity,
            text_sample: sample,
            triggered_at: now,
            state: AlertState::Open,
            resolved_at: None,
            dedup_key: key.render(),
        };
        tracing::info!(
            alert_id = %alert.id,
            brand = %alert.brand,
            severity = %alert.severity,
            bias = ?alert.bias_type,
            trust_score = alert.trust_score,
            "alert created"
        );
        let event = AlertEvent::from_alert(&alert);
        self.open.insert(
            key,
            OpenEntry {
                alert: alert.clone(),
                last_trigger: now,
            },
        );
        decisions.push(AlertDecision::Created { alert, event });
    }
}

fn truncate_sample(text: &str) -> String {
    if text.len() <= TEXT_SAMPLE_MAX {
        return text.to_string();
    }
    let mut end = TEXT_SAMPLE_MAX;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}
