//! The ingestion seam: a partitioned, offset-addressed mention queue.
//!
//! Partitions are keyed by brand and strictly ordered within a partition.
//! Offsets are dense indexes from zero; the committed offset in the store is
//! the next offset to poll, so resume-after-restart needs no queue-side state.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use async_trait::async_trait;

use trustwatch_core::RawMention;

use crate::PipelineError;

#[async_trait]
pub trait MentionQueue: Send + Sync {
    /// All partition keys (brands) this queue carries.
    async fn partitions(&self) -> Vec<String>;

    /// The record at `offset` within a partition, or `None` when the
    /// partition has no record at that offset yet.
    async fn poll(&self, partition: &str, offset: i64) -> Option<RawMention>;
}

/// In-memory queue over a fixed batch of mentions, grouped by brand in
/// arrival order. Backs the CLI's JSONL input and the pipeline tests.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    partitions: HashMap<String, Vec<RawMention>>,
}

impl MemoryQueue {
    #[must_use]
    pub fn from_mentions(mentions: Vec<RawMention>) -> Self {
        let mut partitions: HashMap<String, Vec<RawMention>> = HashMap::new();
        for mention in mentions {
            partitions
                .entry(mention.brand.clone())
                .or_default()
                .push(mention);
        }
        Self { partitions }
    }

    /// Loads one JSON mention record per line.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InputParse`] for a malformed line.
    pub fn from_jsonl_reader<R: BufRead>(reader: R) -> Result<Self, PipelineError> {
        let mut mentions = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| PipelineError::InputIo {
                path: "<reader>".to_string(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let mention: RawMention =
                serde_json::from_str(&line).map_err(|source| PipelineError::InputParse {
                    line: index + 1,
                    source,
                })?;
            mentions.push(mention);
        }
        Ok(Self::from_mentions(mentions))
    }

    /// Loads a JSONL mention file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InputIo`] when the file cannot be opened and
    /// [`PipelineError::InputParse`] for a malformed line.
    pub fn from_jsonl_path(path: &Path) -> Result<Self, PipelineError> {
        let file = std::fs::File::open(path).map_err(|source| PipelineError::InputIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_jsonl_reader(BufReader::new(file))
    }

    /// Number of records held for a partition.
    #[must_use]
    pub fn partition_len(&self, partition: &str) -> usize {
        self.partitions.get(partition).map_or(0, Vec::len)
    }
}

#[async_trait]
impl MentionQueue for MemoryQueue {
    async fn partitions(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.partitions.keys().cloned().collect();
        keys.sort();
        keys
    }

    async fn poll(&self, partition: &str, offset: i64) -> Option<RawMention> {
        let index = usize::try_from(offset).ok()?;
        self.partitions
            .get(partition)
            .and_then(|records| records.get(index))
            .cloned()
    }
}
