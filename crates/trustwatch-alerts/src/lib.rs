//! Alert engine: threshold evaluation, severity assignment, dedup/cooldown
//! state machine, and the alert lifecycle.
//!
//! One engine instance per partition worker. The dedup table is therefore
//! touched by exactly one task at a time, so no locking is needed — the
//! partition-ownership rule in the coordinator is what keeps that true.

pub mod engine;
pub mod severity;

mod error;

pub use engine::{AlertDecision, AlertEngine, AlertEvent, Bucket, DedupKey};
pub use error::AlertError;
pub use severity::{bias_severity, score_severity};
