//! The mention-processing pipeline: partitioned queue consumption, scoring,
//! alert evaluation, and persistence with committed-offset resume.

pub mod coordinator;
pub mod error;
pub mod queue;
pub mod store;
pub mod worker;

pub use coordinator::{Coordinator, CoordinatorOptions};
pub use error::PipelineError;
pub use queue::{MemoryQueue, MentionQueue};
pub use store::{MemoryStore, PgStoreWriter, StoreWriter};
pub use worker::{PartitionWorker, WorkerOptions};
