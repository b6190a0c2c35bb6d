//! The per-partition scoring engine.

use async_trait::async_trait;
use chrono::Utc;

use trustwatch_classifier::{ClassifierClient, ClassifierError};
use trustwatch_core::{Classification, RawMention, ScoredMention, ScoringPolicy, Sentiment};

use crate::error::ScoringError;
use crate::fallback::lexical_trust_score;
use crate::score::trust_score;

/// Seam over the classifier so the engine (and the pipeline above it) can be
/// exercised with fakes.
#[async_trait]
pub trait Classify: Send + Sync {
    /// Classify one mention text in its brand context.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError`] when the classifier cannot produce a
    /// verdict; see the variants for which failures are transient.
    async fn classify(&self, text: &str, brand: &str) -> Result<Classification, ClassifierError>;
}

#[async_trait]
impl Classify for ClassifierClient {
    async fn classify(&self, text: &str, brand: &str) -> Result<Classification, ClassifierError> {
        ClassifierClient::classify(self, text, brand).await
    }
}

/// Scores raw mentions one at a time, in partition order.
///
/// Owned by exactly one partition worker; never shared across partitions, so
/// per-brand ordering holds by construction.
pub struct ScoringEngine<C> {
    classifier: C,
    policy: ScoringPolicy,
}

impl<C: Classify> ScoringEngine<C> {
    pub fn new(classifier: C, policy: ScoringPolicy) -> Self {
        Self { classifier, policy }
    }

    #[must_use]
    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Score one mention.
    ///
    /// When the classifier reports itself unavailable (open breaker, exhausted
    /// retries, timeout) the engine emits a degraded record — neutral
    /// sentiment, no bias categories, classifier confidence zero, lexical
    /// fallback trust score — instead of stalling or dropping the mention.
    ///
    /// Deterministic: identical (mention, classifier output) pairs always
    /// produce the same record apart from `scored_at`.
    ///
    /// # Errors
    ///
    /// - [`ScoringError::InvalidMention`] — structural validation failed;
    ///   permanent, the record is skipped.
    /// - [`ScoringError::Rejected`] — the classifier refused the input or
    ///   returned an uninterpretable body; permanent for this record.
    pub async fn score(&self, mention: &RawMention) -> Result<ScoredMention, ScoringError> {
        mention
            .validate()
            .map_err(|reason| ScoringError::InvalidMention {
                id: mention.id.clone(),
                reason,
            })?;

        match self.classifier.classify(&mention.text, &mention.brand).await {
            Ok(classification) => Ok(self.scored(mention, &classification)),
            Err(
                err @ (ClassifierError::Unavailable { .. }
                | ClassifierError::Timeout
                | ClassifierError::Http(_)),
            ) => {
                tracing::warn!(
                    mention_id = %mention.id,
                    brand = %mention.brand,
                    error = %err,
                    "classifier unavailable — falling back to lexical scoring"
                );
                Ok(self.degraded(mention))
            }
            Err(err) => Err(ScoringError::Rejected {
                id: mention.id.clone(),
                source: err,
            }),
        }
    }

    fn scored(&self, mention: &RawMention, classification: &Classification) -> ScoredMention {
        let score = trust_score(classification, &self.policy);
        tracing::debug!(
            mention_id = %mention.id,
            brand = %mention.brand,
            trust_score = score,
            bias_count = classification.bias.len(),
            "scored mention"
        );
        ScoredMention {
            mention_id: mention.id.clone(),
            brand: mention.brand.clone(),
            source: mention.source,
            trust_score: score,
            bias: classification.bias.clone(),
            sentiment: classification.sentiment,
            classifier_confidence: classification.confidence.clamp(0.0, 1.0),
            degraded: false,
            scored_at: Utc::now(),
        }
    }

    fn degraded(&self, mention: &RawMention) -> ScoredMention {
        ScoredMention {
            mention_id: mention.id.clone(),
            brand: mention.brand.clone(),
            source: mention.source,
            trust_score: lexical_trust_score(&mention.text),
            bias: Vec::new(),
            sentiment: Sentiment::neutral(),
            classifier_confidence: 0.0,
            degraded: true,
            scored_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use trustwatch_core::{BiasCategory, BiasSignal, MentionSource, SentimentLabel};

    struct FixedClassifier(Classification);

    #[async_trait]
    impl Classify for FixedClassifier {
        async fn classify(&self, _: &str, _: &str) -> Result<Classification, ClassifierError> {
            Ok(self.0.clone())
        }
    }

    struct FailingClassifier(fn() -> ClassifierError);

    #[async_trait]
    impl Classify for FailingClassifier {
        async fn classify(&self, _: &str, _: &str) -> Result<Classification, ClassifierError> {
            Err((self.0)())
        }
    }

    fn mention(text: &str) -> RawMention {
        RawMention {
            id: "yt_901".to_string(),
            brand: "voltora".to_string(),
            source: MentionSource::Video,
            text: text.to_string(),
            author: None,
            url: None,
            published_at: Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
            ingested_at: Utc.with_ymd_and_hms(2025, 6, 1, 9, 1, 0).unwrap(),
        }
    }

    fn negative_urban() -> Classification {
        Classification {
            bias: vec![BiasSignal {
                category: BiasCategory::Urban,
                confidence: 0.95,
            }],
            sentiment: Sentiment {
                label: SentimentLabel::Negative,
                confidence: 0.8,
            },
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn scores_with_classifier_verdict() {
        let engine = ScoringEngine::new(FixedClassifier(negative_urban()), ScoringPolicy::default());
        let scored = engine
            .score(&mention("city-only campaign, felt excluded"))
            .await
            .expect("should score");
        assert!(scored.trust_score < 30.0);
        assert_eq!(scored.bias.len(), 1);
        assert!(!scored.degraded);
        assert!((scored.classifier_confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unavailable_classifier_takes_degraded_path() {
        let engine = ScoringEngine::new(
            FailingClassifier(|| ClassifierError::Unavailable {
                reason: "circuit breaker open".to_string(),
            }),
            ScoringPolicy::default(),
        );
        let scored = engine
            .score(&mention("the ad was misleading and overpriced"))
            .await
            .expect("degraded path must still produce a record");
        assert!(scored.degraded);
        assert!(scored.bias.is_empty());
        assert_eq!(scored.sentiment.label, SentimentLabel::Neutral);
        assert!((scored.classifier_confidence - 0.0).abs() < f64::EPSILON);
        // Lexical fallback still reacts to the negative wording.
        assert!(scored.trust_score < 50.0);
    }

    #[tokio::test]
    async fn timeout_also_degrades() {
        let engine = ScoringEngine::new(
            FailingClassifier(|| ClassifierError::Timeout),
            ScoringPolicy::default(),
        );
        let scored = engine.score(&mention("plain text")).await.expect("degraded");
        assert!(scored.degraded);
        assert!((scored.trust_score - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn invalid_input_from_classifier_is_permanent() {
        let engine = ScoringEngine::new(
            FailingClassifier(|| ClassifierError::InvalidInput {
                reason: "unsupported language".to_string(),
            }),
            ScoringPolicy::default(),
        );
        let err = engine
            .score(&mention("some text"))
            .await
            .expect_err("rejection must surface");
        assert!(matches!(err, ScoringError::Rejected { .. }));
    }

    #[tokio::test]
    async fn malformed_mention_is_rejected_before_classification() {
        let engine = ScoringEngine::new(FixedClassifier(negative_urban()), ScoringPolicy::default());
        let mut m = mention("text");
        m.published_at = m.ingested_at + chrono::Duration::seconds(5);
        let err = engine.score(&m).await.expect_err("must fail validation");
        assert!(matches!(err, ScoringError::InvalidMention { .. }));
    }

    #[tokio::test]
    async fn identical_inputs_produce_identical_records() {
        let engine = ScoringEngine::new(FixedClassifier(negative_urban()), ScoringPolicy::default());
        let m = mention("same text");
        let a = engine.score(&m).await.expect("score");
        let b = engine.score(&m).await.expect("score");
        assert!((a.trust_score - b.trust_score).abs() < f64::EPSILON);
        assert_eq!(a.bias, b.bias);
        assert_eq!(a.sentiment, b.sentiment);
    }
}
