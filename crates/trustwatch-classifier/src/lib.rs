//! Client for the external bias/sentiment classifier.
//!
//! Wraps `reqwest` with bounded in-flight concurrency, exponential-backoff
//! retries on transient errors, and a per-process circuit breaker so a dead
//! classifier fails fast instead of stalling every partition worker.

pub mod breaker;
pub mod client;
pub mod error;

mod retry;

pub use client::{ClassifierClient, ClassifierOptions};
pub use error::ClassifierError;
