//! The trust-score formula.

use trustwatch_core::{Classification, ScoringPolicy, SentimentLabel};

/// Compute the composite trust score for one classification.
///
/// `base = 100 − Σ(bias_weight_i × confidence_i) − negative_sentiment_penalty`,
/// clamped to `[0, 100]`. The penalty scales with sentiment confidence and
/// applies only to negative sentiment.
///
/// Pure and deterministic: identical inputs always yield the identical score,
/// which is what makes at-least-once redelivery safe to re-score.
#[must_use]
pub fn trust_score(classification: &Classification, policy: &ScoringPolicy) -> f64 {
    let bias_penalty: f64 = classification
        .bias
        .iter()
        .map(|signal| {
            policy.bias_policy(signal.category).weight * signal.confidence.clamp(0.0, 1.0)
        })
        .sum();

    let sentiment_penalty = if classification.sentiment.label == SentimentLabel::Negative {
        policy.negative_sentiment_penalty * classification.sentiment.confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };

    (100.0 - bias_penalty - sentiment_penalty).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustwatch_core::{BiasCategory, BiasSignal, Sentiment};

    fn classification(bias: Vec<BiasSignal>, sentiment: Sentiment) -> Classification {
        Classification {
            bias,
            sentiment,
            confidence: 0.9,
        }
    }

    fn negative(confidence: f64) -> Sentiment {
        Sentiment {
            label: SentimentLabel::Negative,
            confidence,
        }
    }

    #[test]
    fn clean_positive_mention_scores_full() {
        let c = classification(
            vec![],
            Sentiment {
                label: SentimentLabel::Positive,
                confidence: 0.95,
            },
        );
        let score = trust_score(&c, &ScoringPolicy::default());
        assert!((score - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn positive_sentiment_carries_no_penalty_regardless_of_confidence() {
        let policy = ScoringPolicy::default();
        let high = classification(
            vec![],
            Sentiment {
                label: SentimentLabel::Positive,
                confidence: 1.0,
            },
        );
        let low = classification(
            vec![],
            Sentiment {
                label: SentimentLabel::Positive,
                confidence: 0.1,
            },
        );
        assert!((trust_score(&high, &policy) - trust_score(&low, &policy)).abs() < f64::EPSILON);
    }

    #[test]
    fn urban_bias_with_negative_sentiment_drops_below_critical() {
        // Urban @ 0.95 (weight 45 → 42.75) + negative @ 0.8 (penalty 28)
        // → 100 − 42.75 − 28 = 29.25, under the critical threshold of 30.
        let c = classification(
            vec![BiasSignal {
                category: BiasCategory::Urban,
                confidence: 0.95,
            }],
            negative(0.8),
        );
        let policy = ScoringPolicy::default();
        let score = trust_score(&c, &policy);
        assert!(
            score < policy.critical_threshold,
            "expected score below {}, got {score}",
            policy.critical_threshold
        );
        assert!((score - 29.25).abs() < 1e-9);
    }

    #[test]
    fn adversarial_input_clamps_to_zero() {
        // Every category firing at confidence 1.0 plus maximal negative
        // sentiment pushes the raw formula far below zero.
        let bias = BiasCategory::ALL
            .into_iter()
            .map(|category| BiasSignal {
                category,
                confidence: 1.0,
            })
            .collect();
        let c = classification(bias, negative(1.0));
        let score = trust_score(&c, &ScoringPolicy::default());
        assert!((score - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn score_stays_within_bounds_for_out_of_range_confidences() {
        let c = classification(
            vec![BiasSignal {
                category: BiasCategory::Gender,
                confidence: 7.5,
            }],
            negative(-3.0),
        );
        let score = trust_score(&c, &ScoringPolicy::default());
        assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn identical_inputs_yield_identical_scores() {
        let c = classification(
            vec![BiasSignal {
                category: BiasCategory::Elitist,
                confidence: 0.6,
            }],
            negative(0.4),
        );
        let policy = ScoringPolicy::default();
        let a = trust_score(&c, &policy);
        let b = trust_score(&c, &policy);
        assert!((a - b).abs() < f64::EPSILON, "scoring must be deterministic");
    }
}
