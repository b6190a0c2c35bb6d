//! Scoring engine: turns a raw mention plus classifier output into a
//! deterministic trust score in `[0, 100]`.
//!
//! When the classifier is unavailable the engine falls back to a lexical
//! heuristic so the pipeline keeps moving at reduced fidelity; degraded
//! records are flagged for a later re-scoring sweep.

pub mod engine;
pub mod fallback;
pub mod score;

mod error;

pub use engine::{Classify, ScoringEngine};
pub use error::ScoringError;
pub use fallback::lexical_trust_score;
pub use score::trust_score;
