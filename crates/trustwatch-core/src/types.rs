//! Domain model: raw mentions, classifier output, scored mentions, alerts,
//! and per-brand rolling aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Where a mention was collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MentionSource {
    Forum,
    Video,
    News,
}

impl std::fmt::Display for MentionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MentionSource::Forum => write!(f, "forum"),
            MentionSource::Video => write!(f, "video"),
            MentionSource::News => write!(f, "news"),
        }
    }
}

/// One raw mention of a brand campaign, as handed over by a source connector.
///
/// Immutable once ingested; the pipeline treats it as read-only input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMention {
    /// Source-scoped unique id (e.g. a post or video id).
    pub id: String,
    pub brand: String,
    pub source: MentionSource,
    pub text: String,
    pub author: Option<String>,
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
}

impl RawMention {
    /// Validate the structural invariants of a mention.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the mention is malformed:
    /// empty id, brand, or text, or `published_at` after `ingested_at`.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("mention id must be non-empty".to_string());
        }
        if self.brand.trim().is_empty() {
            return Err(format!("mention '{}' has an empty brand", self.id));
        }
        if self.text.trim().is_empty() {
            return Err(format!("mention '{}' has empty text", self.id));
        }
        if self.published_at > self.ingested_at {
            return Err(format!(
                "mention '{}' published_at {} is after ingested_at {}",
                self.id, self.published_at, self.ingested_at
            ));
        }
        Ok(())
    }

    /// Hex SHA-256 over the content-identifying fields.
    ///
    /// Two mentions sharing an id but disagreeing on this fingerprint are a
    /// conflicting redelivery and get quarantined rather than overwritten.
    #[must_use]
    pub fn content_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.brand.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.source.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.text.as_bytes());
        let digest = hasher.finalize();
        let mut out = String::with_capacity(64);
        for byte in digest {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SentimentLabel::Positive => write!(f, "positive"),
            SentimentLabel::Neutral => write!(f, "neutral"),
            SentimentLabel::Negative => write!(f, "negative"),
        }
    }
}

/// Sentiment label with the classifier's confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    pub confidence: f64,
}

impl Sentiment {
    #[must_use]
    pub fn neutral() -> Self {
        Self {
            label: SentimentLabel::Neutral,
            confidence: 0.0,
        }
    }
}

/// Closed taxonomy of campaign framing biases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiasCategory {
    Urban,
    Elitist,
    Demographic,
    Gender,
}

impl BiasCategory {
    pub const ALL: [BiasCategory; 4] = [
        BiasCategory::Urban,
        BiasCategory::Elitist,
        BiasCategory::Demographic,
        BiasCategory::Gender,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BiasCategory::Urban => "urban",
            BiasCategory::Elitist => "elitist",
            BiasCategory::Demographic => "demographic",
            BiasCategory::Gender => "gender",
        }
    }

    /// Parse the lowercase wire/db form back into a category.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "urban" => Some(BiasCategory::Urban),
            "elitist" => Some(BiasCategory::Elitist),
            "demographic" => Some(BiasCategory::Demographic),
            "gender" => Some(BiasCategory::Gender),
            _ => None,
        }
    }
}

impl std::fmt::Display for BiasCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected bias with the classifier's confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiasSignal {
    pub category: BiasCategory,
    pub confidence: f64,
}

/// Output of the external classifier for one mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub bias: Vec<BiasSignal>,
    pub sentiment: Sentiment,
    /// Overall classifier confidence in `[0, 1]`.
    pub confidence: f64,
}

/// A mention after scoring. Written exactly once per mention id (upserts make
/// redelivery a no-op rewrite).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMention {
    pub mention_id: String,
    pub brand: String,
    pub source: MentionSource,
    /// Composite trust score in `[0, 100]`.
    pub trust_score: f64,
    pub bias: Vec<BiasSignal>,
    pub sentiment: Sentiment,
    pub classifier_confidence: f64,
    /// True when the classifier was unavailable and the lexical fallback
    /// produced the score. Flagged for an external re-scoring sweep.
    pub degraded: bool,
    pub scored_at: DateTime<Utc>,
}

/// Alert severity, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Open,
    Acknowledged,
    Resolved,
}

impl AlertState {
    /// Whether the lifecycle permits moving from `self` to `next`.
    ///
    /// Open → Acknowledged → Resolved, with Open → Resolved allowed directly
    /// (cooldown expiry or operator resolve). Resolved is terminal.
    #[must_use]
    pub fn can_transition_to(self, next: AlertState) -> bool {
        match (self, next) {
            (AlertState::Open, AlertState::Acknowledged | AlertState::Resolved)
            | (AlertState::Acknowledged, AlertState::Resolved) => true,
            (AlertState::Open | AlertState::Acknowledged | AlertState::Resolved, _) => false,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AlertState::Open => "open",
            AlertState::Acknowledged => "acknowledged",
            AlertState::Resolved => "resolved",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(AlertState::Open),
            "acknowledged" => Some(AlertState::Acknowledged),
            "resolved" => Some(AlertState::Resolved),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raised alert. Never deleted, only state-transitioned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub brand: String,
    /// `None` for trust-score-only or ingestion-delay alerts.
    pub bias_type: Option<BiasCategory>,
    /// Trust score observed at the most recent trigger.
    pub trust_score: f64,
    pub severity: Severity,
    pub text_sample: String,
    pub triggered_at: DateTime<Utc>,
    pub state: AlertState,
    pub resolved_at: Option<DateTime<Utc>>,
    pub dedup_key: String,
}

/// Rolling per-brand aggregate, maintained incrementally by the store writer.
/// Rebuildable from scored-mention history; not a source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandAggregate {
    pub brand: String,
    pub mention_count: i64,
    /// Exponentially weighted running average of trust scores.
    pub avg_trust_score: f64,
    pub last_updated: DateTime<Utc>,
}

impl BrandAggregate {
    /// Fold one scored mention into the aggregate:
    /// `avg' = avg + alpha * (score - avg)`. The first mention seeds the
    /// average with its own score.
    pub fn apply(&mut self, trust_score: f64, alpha: f64, at: DateTime<Utc>) {
        if self.mention_count == 0 {
            self.avg_trust_score = trust_score;
        } else {
            self.avg_trust_score += alpha * (trust_score - self.avg_trust_score);
        }
        self.mention_count += 1;
        self.last_updated = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn mention() -> RawMention {
        RawMention {
            id: "t3_abc".to_string(),
            brand: "voltora".to_string(),
            source: MentionSource::Forum,
            text: "the new campaign only talks to city buyers".to_string(),
            author: Some("u/driver".to_string()),
            url: None,
            published_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            ingested_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 5, 0).unwrap(),
        }
    }

    #[test]
    fn valid_mention_passes_validation() {
        assert!(mention().validate().is_ok());
    }

    #[test]
    fn empty_text_fails_validation() {
        let mut m = mention();
        m.text = "   ".to_string();
        assert!(m.validate().is_err());
    }

    #[test]
    fn published_after_ingested_fails_validation() {
        let mut m = mention();
        m.published_at = m.ingested_at + chrono::Duration::seconds(1);
        assert!(m.validate().is_err());
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let m = mention();
        assert_eq!(m.content_fingerprint(), m.content_fingerprint());

        let mut other = mention();
        other.text.push_str(" edited");
        assert_ne!(m.content_fingerprint(), other.content_fingerprint());
    }

    #[test]
    fn severity_ordering_is_low_to_critical() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn resolved_is_terminal() {
        assert!(!AlertState::Resolved.can_transition_to(AlertState::Open));
        assert!(!AlertState::Resolved.can_transition_to(AlertState::Acknowledged));
        assert!(!AlertState::Resolved.can_transition_to(AlertState::Resolved));
    }

    #[test]
    fn open_can_resolve_directly() {
        assert!(AlertState::Open.can_transition_to(AlertState::Resolved));
        assert!(AlertState::Open.can_transition_to(AlertState::Acknowledged));
        assert!(AlertState::Acknowledged.can_transition_to(AlertState::Resolved));
        assert!(!AlertState::Acknowledged.can_transition_to(AlertState::Open));
    }

    #[test]
    fn aggregate_seeds_then_ewma() {
        let mut agg = BrandAggregate {
            brand: "voltora".to_string(),
            mention_count: 0,
            avg_trust_score: 0.0,
            last_updated: Utc::now(),
        };
        let now = Utc::now();
        agg.apply(80.0, 0.2, now);
        assert_eq!(agg.mention_count, 1);
        assert!((agg.avg_trust_score - 80.0).abs() < f64::EPSILON);

        agg.apply(40.0, 0.2, now);
        // 80 + 0.2 * (40 - 80) = 72
        assert!((agg.avg_trust_score - 72.0).abs() < 1e-9);
        assert_eq!(agg.mention_count, 2);
    }

    #[test]
    fn bias_category_round_trips_through_str() {
        for cat in BiasCategory::ALL {
            assert_eq!(BiasCategory::parse(cat.as_str()), Some(cat));
        }
        assert_eq!(BiasCategory::parse("rural"), None);
    }
}
