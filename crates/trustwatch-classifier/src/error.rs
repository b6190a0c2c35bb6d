use thiserror::Error;

/// Errors returned by the classifier client.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The request exceeded the configured timeout.
    #[error("classifier call timed out")]
    Timeout,

    /// The classifier is unreachable or persistently failing: 5xx responses,
    /// exhausted retries, or an open circuit breaker. The scoring engine
    /// applies its degraded path on this variant.
    #[error("classifier unavailable: {reason}")]
    Unavailable { reason: String },

    /// The classifier rejected the input (4xx). Never retried; the record is
    /// skipped rather than blocking the partition.
    #[error("classifier rejected input: {reason}")]
    InvalidInput { reason: String },

    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body could not be deserialized into the expected shape.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}
