//! Core domain types and configuration for the trustwatch pipeline.
//!
//! Defines the mention/score/alert data model shared by every other crate,
//! the yaml-backed scoring policy table, and the env-driven `AppConfig`.

pub mod app_config;
pub mod config;
pub mod policy;
pub mod types;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use policy::{load_policy, BiasPolicy, ScoringPolicy};
pub use types::{
    Alert, AlertState, BiasCategory, BiasSignal, BrandAggregate, Classification, MentionSource,
    RawMention, ScoredMention, Sentiment, SentimentLabel, Severity,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for env var {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read policy file {path}: {source}")]
    PolicyFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy file: {0}")]
    PolicyFileParse(#[from] serde_yaml::Error),

    #[error("policy validation failed: {0}")]
    Validation(String),
}
