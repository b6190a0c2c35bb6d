use thiserror::Error;

use trustwatch_classifier::ClassifierError;

/// Errors surfaced by the scoring engine.
///
/// Classifier unavailability is not an error here — the engine absorbs it via
/// the degraded path. Only conditions that make this specific record
/// unscoreable are surfaced.
#[derive(Debug, Error)]
pub enum ScoringError {
    /// The mention failed structural validation. Permanent: logged and
    /// skipped, never retried.
    #[error("invalid mention '{id}': {reason}")]
    InvalidMention { id: String, reason: String },

    /// The classifier rejected this record's input, or returned a body the
    /// client could not interpret. Permanent for this record.
    #[error("classifier rejected mention '{id}': {source}")]
    Rejected {
        id: String,
        #[source]
        source: ClassifierError,
    },
}
