//! Partition ownership and worker fan-out.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use trustwatch_alerts::{AlertEngine, AlertEvent};
use trustwatch_core::{AppConfig, ScoringPolicy};
use trustwatch_scoring::{Classify, ScoringEngine};

use crate::worker::{PartitionWorker, WorkerOptions};
use crate::{MentionQueue, PipelineError, StoreWriter};

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub worker_count: usize,
    pub retry_budget: u32,
    pub backoff_base_ms: u64,
    pub ingestion_delay_bound_secs: i64,
}

impl CoordinatorOptions {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            worker_count: config.worker_count,
            retry_budget: config.partition_retry_budget,
            backoff_base_ms: config.partition_backoff_base_ms,
            ingestion_delay_bound_secs: config.ingestion_delay_bound_secs,
        }
    }
}

/// Assigns each brand partition to exactly one worker and runs the workers
/// to completion.
pub struct Coordinator<C> {
    queue: Arc<dyn MentionQueue>,
    store: Arc<dyn StoreWriter>,
    scoring: Arc<ScoringEngine<C>>,
    policy: ScoringPolicy,
    options: CoordinatorOptions,
}

impl<C: Classify + 'static> Coordinator<C> {
    pub fn new(
        queue: Arc<dyn MentionQueue>,
        store: Arc<dyn StoreWriter>,
        scoring: Arc<ScoringEngine<C>>,
        policy: ScoringPolicy,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            queue,
            store,
            scoring,
            policy,
            options,
        }
    }

    /// Round-robin brand-to-worker assignment. Every partition lands in
    /// exactly one slot, so per-brand ordering is preserved end to end.
    fn assign(partitions: Vec<String>, worker_count: usize) -> Vec<Vec<String>> {
        let slots = worker_count.max(1).min(partitions.len().max(1));
        let mut assignment: Vec<Vec<String>> = vec![Vec::new(); slots];
        for (index, partition) in partitions.into_iter().enumerate() {
            assignment[index % slots].push(partition);
        }
        assignment
    }

    /// Spawns one task per worker slot and waits for all of them. A failed
    /// worker is logged and does not stop its siblings.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Join` when a worker task panics.
    pub async fn run(
        self,
        shutdown: watch::Receiver<bool>,
        events: mpsc::Sender<AlertEvent>,
    ) -> Result<(), PipelineError> {
        let partitions = self.queue.partitions().await;
        tracing::info!(
            partitions = partitions.len(),
            workers = self.options.worker_count,
            "starting pipeline"
        );

        let worker_options = WorkerOptions {
            retry_budget: self.options.retry_budget,
            backoff_base_ms: self.options.backoff_base_ms,
            ingestion_delay_bound_secs: self.options.ingestion_delay_bound_secs,
        };

        let mut tasks = JoinSet::new();
        for owned in Self::assign(partitions, self.options.worker_count) {
            if owned.is_empty() {
                continue;
            }
            let worker = PartitionWorker::new(
                owned,
                Arc::clone(&self.queue),
                Arc::clone(&self.store),
                Arc::clone(&self.scoring),
                AlertEngine::new(self.policy.clone()),
                events.clone(),
                shutdown.clone(),
                worker_options.clone(),
            );
            tasks.spawn(worker.run());
        }
        drop(events);

        while let Some(joined) = tasks.join_next().await {
            match joined? {
                Ok(()) => {}
                Err(err) => {
                    // One failed worker never takes down its siblings.
                    tracing::error!(error = %err, "worker stopped with an error");
                }
            }
        }
        tracing::info!("pipeline drained");
        Ok(())
    }
}
