use thiserror::Error;

use trustwatch_db::DbError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Mention input (JSONL) could not be read.
    #[error("failed to read mentions from '{path}'")]
    InputIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A line in the mention input was not a valid mention record.
    #[error("invalid mention record at line {line}")]
    InputParse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Transient store failures exhausted the per-partition retry budget.
    /// Processing stops for this partition only.
    #[error("partition '{partition}' degraded after {attempts} attempts: {reason}")]
    PartitionDegraded {
        partition: String,
        attempts: u32,
        reason: String,
    },

    #[error("store error: {0}")]
    Store(#[from] DbError),

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
