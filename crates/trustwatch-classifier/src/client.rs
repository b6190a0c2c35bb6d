//! HTTP client for the external bias/sentiment classifier service.

use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use trustwatch_core::{AppConfig, BiasSignal, Classification, Sentiment};

use crate::breaker::CircuitBreaker;
use crate::error::ClassifierError;
use crate::retry::retry_with_backoff;

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
    brand: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    bias_categories: Vec<BiasSignal>,
    sentiment: Sentiment,
    confidence: f64,
}

/// Tunables for [`ClassifierClient`]. All values have working defaults so
/// tests can override only what they exercise.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierOptions {
    pub timeout_secs: u64,
    /// Cap on concurrently in-flight requests from this client.
    pub max_in_flight: usize,
    /// Extra attempts after the first, so the default of 2 means at most
    /// 3 calls per record.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown_secs: u64,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_in_flight: 4,
            max_retries: 2,
            backoff_base_ms: 500,
            breaker_failure_threshold: 5,
            breaker_cooldown_secs: 30,
        }
    }
}

impl ClassifierOptions {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            timeout_secs: config.classifier_timeout_secs,
            max_in_flight: config.classifier_max_in_flight,
            max_retries: config.classifier_max_retries,
            backoff_base_ms: config.classifier_backoff_base_ms,
            breaker_failure_threshold: config.breaker_failure_threshold,
            breaker_cooldown_secs: config.breaker_cooldown_secs,
        }
    }
}

/// Client for the classifier's `POST /classify` endpoint.
///
/// One instance per partition worker: the semaphore bounds in-flight calls
/// and the circuit breaker is intentionally process-local, with no state
/// shared across workers.
pub struct ClassifierClient {
    client: Client,
    base_url: Url,
    limiter: Semaphore,
    breaker: CircuitBreaker,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl ClassifierClient {
    /// Creates a client pointed at `base_url` (also used to point tests at a
    /// wiremock server).
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ClassifierError::InvalidInput`] if
    /// `base_url` is not a valid URL.
    pub fn new(base_url: &str, options: ClassifierOptions) -> Result<Self, ClassifierError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("trustwatch/0.1 (campaign-trust-monitoring)")
            .build()?;

        // Normalise: exactly one trailing slash so join() appends rather than
        // replacing the last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| ClassifierError::InvalidInput {
            reason: format!("invalid base URL '{base_url}': {e}"),
        })?;

        Ok(Self {
            client,
            base_url,
            limiter: Semaphore::new(options.max_in_flight.max(1)),
            breaker: CircuitBreaker::new(
                options.breaker_failure_threshold,
                Duration::from_secs(options.breaker_cooldown_secs),
            ),
            max_retries: options.max_retries,
            backoff_base_ms: options.backoff_base_ms,
        })
    }

    /// Classify one mention text in its brand context.
    ///
    /// Fails fast with [`ClassifierError::Unavailable`] while the circuit
    /// breaker is open, without touching the network. Otherwise retries
    /// transient failures with back-off; the final outcome feeds the breaker.
    ///
    /// # Errors
    ///
    /// - [`ClassifierError::Unavailable`] — open breaker, 5xx, or exhausted
    ///   retries on connection failures.
    /// - [`ClassifierError::Timeout`] — the call (after retries) timed out.
    /// - [`ClassifierError::InvalidInput`] — the service rejected the input.
    /// - [`ClassifierError::Deserialize`] — unexpected response shape.
    pub async fn classify(
        &self,
        text: &str,
        brand: &str,
    ) -> Result<Classification, ClassifierError> {
        if !self.breaker.allow_at(Instant::now()) {
            return Err(ClassifierError::Unavailable {
                reason: "circuit breaker open".to_string(),
            });
        }

        let _permit =
            self.limiter
                .acquire()
                .await
                .map_err(|_| ClassifierError::Unavailable {
                    reason: "classifier client shut down".to_string(),
                })?;

        let result = retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            self.classify_once(text, brand)
        })
        .await;

        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(
                ClassifierError::Timeout
                | ClassifierError::Unavailable { .. }
                | ClassifierError::Http(_),
            ) => self.breaker.record_failure_at(Instant::now()),
            // Input and shape problems say nothing about service health.
            Err(_) => {}
        }

        result
    }

    async fn classify_once(
        &self,
        text: &str,
        brand: &str,
    ) -> Result<Classification, ClassifierError> {
        let url = self
            .base_url
            .join("classify")
            .map_err(|e| ClassifierError::InvalidInput {
                reason: format!("invalid classify URL: {e}"),
            })?;

        let response = self
            .client
            .post(url)
            .json(&ClassifyRequest { text, brand })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifierError::Timeout
                } else {
                    ClassifierError::Http(e)
                }
            })?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClassifierError::Unavailable {
                reason: format!("classifier returned {status}"),
            });
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::InvalidInput {
                reason: format!("{status}: {body}"),
            });
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ClassifierError::Timeout
            } else {
                ClassifierError::Http(e)
            }
        })?;

        let parsed: ClassifyResponse =
            serde_json::from_str(&body).map_err(|e| ClassifierError::Deserialize {
                context: "POST /classify".to_string(),
                source: e,
            })?;

        Ok(Classification {
            bias: parsed.bias_categories,
            sentiment: parsed.sentiment,
            confidence: parsed.confidence.clamp(0.0, 1.0),
        })
    }

    /// True while the breaker would reject calls right now. Exposed for
    /// operational logging in the pipeline.
    #[must_use]
    pub fn breaker_open(&self) -> bool {
        self.breaker.is_open_at(Instant::now())
    }
}
