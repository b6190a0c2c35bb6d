use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    /// Path to the yaml scoring policy table.
    pub policy_path: PathBuf,

    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,

    pub classifier_url: String,
    pub classifier_timeout_secs: u64,
    /// Cap on in-flight classifier calls per worker.
    pub classifier_max_in_flight: usize,
    pub classifier_max_retries: u32,
    pub classifier_backoff_base_ms: u64,
    /// Consecutive failures before the circuit breaker opens.
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown_secs: u64,

    /// Size of the partition worker pool.
    pub worker_count: usize,
    /// Consecutive partition failures tolerated before it is marked degraded.
    pub partition_retry_budget: u32,
    pub partition_backoff_base_ms: u64,
    /// Ingestion lag beyond which a delay alert is raised for a brand.
    pub ingestion_delay_bound_secs: i64,
    /// Cron expression for the expired-alert sweep.
    pub sweep_schedule: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("policy_path", &self.policy_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("classifier_url", &self.classifier_url)
            .field("classifier_timeout_secs", &self.classifier_timeout_secs)
            .field("classifier_max_in_flight", &self.classifier_max_in_flight)
            .field("classifier_max_retries", &self.classifier_max_retries)
            .field("classifier_backoff_base_ms", &self.classifier_backoff_base_ms)
            .field("breaker_failure_threshold", &self.breaker_failure_threshold)
            .field("breaker_cooldown_secs", &self.breaker_cooldown_secs)
            .field("worker_count", &self.worker_count)
            .field("partition_retry_budget", &self.partition_retry_budget)
            .field("partition_backoff_base_ms", &self.partition_backoff_base_ms)
            .field(
                "ingestion_delay_bound_secs",
                &self.ingestion_delay_bound_secs,
            )
            .field("sweep_schedule", &self.sweep_schedule)
            .finish()
    }
}
