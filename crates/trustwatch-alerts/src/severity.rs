//! Severity assignment rules.

use trustwatch_core::{BiasSignal, ScoringPolicy, Severity};

/// Severity implied by a trust score alone, `None` when the score is above
/// the alert threshold.
///
/// Critical below the critical threshold, High below the high threshold,
/// Medium below the alert threshold.
#[must_use]
pub fn score_severity(trust_score: f64, policy: &ScoringPolicy) -> Option<Severity> {
    if trust_score < policy.critical_threshold {
        Some(Severity::Critical)
    } else if trust_score < policy.high_threshold {
        Some(Severity::High)
    } else if trust_score < policy.alert_threshold {
        Some(Severity::Medium)
    } else {
        None
    }
}

/// Severity for a bias-category trigger, before combining with the score.
///
/// Critical-tier categories start at High and escalate to Critical above the
/// configured confidence; other categories are Medium.
#[must_use]
pub fn bias_severity(signal: &BiasSignal, policy: &ScoringPolicy) -> Severity {
    let bias_policy = policy.bias_policy(signal.category);
    if bias_policy.critical_tier {
        if signal.confidence > policy.critical_bias_confidence {
            Severity::Critical
        } else {
            Severity::High
        }
    } else {
        Severity::Medium
    }
}
