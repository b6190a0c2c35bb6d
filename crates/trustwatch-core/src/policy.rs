//! Scoring and alerting policy table.
//!
//! The numeric thresholds here (alert cut-offs, bias weights, cooldown) are
//! product policy, not derivable constants, so they live in a yaml file with
//! compiled-in defaults rather than in code.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::BiasCategory;
use crate::ConfigError;

/// Per-category policy: scoring weight, alert confidence threshold, and
/// whether the category sits in the critical tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiasPolicy {
    /// Trust-score penalty per unit of confidence. Applied as
    /// `weight * confidence` in the scoring formula.
    pub weight: f64,
    /// Confidence above which this category alone raises an alert.
    pub alert_threshold: f64,
    /// Critical-tier categories at high confidence escalate straight to
    /// Critical severity.
    #[serde(default)]
    pub critical_tier: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// Policy per bias category. Every category must be present.
    pub bias: HashMap<BiasCategory, BiasPolicy>,
    /// Maximum trust-score penalty for negative sentiment; scaled by the
    /// sentiment confidence.
    pub negative_sentiment_penalty: f64,
    /// Trust score below which any mention raises an alert (Medium floor).
    pub alert_threshold: f64,
    /// Trust score below which severity is at least High.
    pub high_threshold: f64,
    /// Trust score below which severity is Critical.
    pub critical_threshold: f64,
    /// Confidence above which a critical-tier bias category is Critical.
    pub critical_bias_confidence: f64,
    /// Dedup/auto-resolve window for alerts, in seconds.
    pub cooldown_secs: i64,
    /// Smoothing factor for the per-brand rolling trust average.
    pub ewma_alpha: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        let mut bias = HashMap::new();
        bias.insert(
            BiasCategory::Urban,
            BiasPolicy {
                weight: 45.0,
                alert_threshold: 0.7,
                critical_tier: false,
            },
        );
        bias.insert(
            BiasCategory::Elitist,
            BiasPolicy {
                weight: 50.0,
                alert_threshold: 0.6,
                critical_tier: true,
            },
        );
        bias.insert(
            BiasCategory::Demographic,
            BiasPolicy {
                weight: 50.0,
                alert_threshold: 0.6,
                critical_tier: true,
            },
        );
        bias.insert(
            BiasCategory::Gender,
            BiasPolicy {
                weight: 40.0,
                alert_threshold: 0.7,
                critical_tier: false,
            },
        );
        Self {
            bias,
            negative_sentiment_penalty: 35.0,
            alert_threshold: 70.0,
            high_threshold: 50.0,
            critical_threshold: 30.0,
            critical_bias_confidence: 0.9,
            cooldown_secs: 900,
            ewma_alpha: 0.2,
        }
    }
}

impl ScoringPolicy {
    /// Look up the policy for one category.
    ///
    /// Validation guarantees every category is present; a missing entry after
    /// that would be a construction bug, so fall back to a zero-weight policy
    /// rather than panicking in the scoring hot path.
    #[must_use]
    pub fn bias_policy(&self, category: BiasCategory) -> BiasPolicy {
        self.bias.get(&category).copied().unwrap_or(BiasPolicy {
            weight: 0.0,
            alert_threshold: 1.0,
            critical_tier: false,
        })
    }

    /// Validate ranges and completeness of the table.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` when a category is missing, a weight
    /// is negative, a confidence threshold leaves `[0, 1]`, the severity
    /// cut-offs are not ordered, or the cooldown/alpha are out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for category in BiasCategory::ALL {
            let Some(p) = self.bias.get(&category) else {
                return Err(ConfigError::Validation(format!(
                    "policy missing bias category '{category}'"
                )));
            };
            if p.weight < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "bias '{category}' has negative weight {}",
                    p.weight
                )));
            }
            if !(0.0..=1.0).contains(&p.alert_threshold) {
                return Err(ConfigError::Validation(format!(
                    "bias '{category}' alert_threshold {} outside [0, 1]",
                    p.alert_threshold
                )));
            }
        }
        if !(self.critical_threshold < self.high_threshold
            && self.high_threshold < self.alert_threshold)
        {
            return Err(ConfigError::Validation(format!(
                "severity thresholds must satisfy critical < high < alert, got {} / {} / {}",
                self.critical_threshold, self.high_threshold, self.alert_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.critical_bias_confidence) {
            return Err(ConfigError::Validation(format!(
                "critical_bias_confidence {} outside [0, 1]",
                self.critical_bias_confidence
            )));
        }
        if self.negative_sentiment_penalty < 0.0 {
            return Err(ConfigError::Validation(format!(
                "negative_sentiment_penalty {} must be >= 0",
                self.negative_sentiment_penalty
            )));
        }
        if self.cooldown_secs <= 0 {
            return Err(ConfigError::Validation(format!(
                "cooldown_secs {} must be positive",
                self.cooldown_secs
            )));
        }
        if !(0.0..=1.0).contains(&self.ewma_alpha) {
            return Err(ConfigError::Validation(format!(
                "ewma_alpha {} outside [0, 1]",
                self.ewma_alpha
            )));
        }
        Ok(())
    }
}

/// Load the scoring policy from a yaml file, or defaults when the file is
/// absent.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// if the resulting table fails validation.
pub fn load_policy(path: &Path) -> Result<ScoringPolicy, ConfigError> {
    let policy = if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::PolicyFileIo {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_yaml::from_str(&content)?
    } else {
        // A missing file is a normal deployment; the default table carries
        // the documented illustrative thresholds.
        tracing::info!(path = %path.display(), "policy file not found, using built-in defaults");
        ScoringPolicy::default()
    };
    policy.validate()?;
    Ok(policy)
}
