//! Retry configuration, delay calculation, and model decorators.
//!
//! Provides [`RetryConfig`] for controlling retry behaviour and
//! `Retrying*Model` decorators that wrap model handles with automatic
//! retry on transient errors.
//!
//! All decorators delegate to the shared `with_retry()` helper,
//! keeping retry logic in a single place.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::Result;
use crate::telemetry;
use crate::traits::{EmbeddingModel, ImageModel, LanguageModel};
use crate::types::{
    CallOptions, EmbedOptions, EmbedResult, GenerateResult, ImageOptions, ImageResult,
    StreamResult,
};
use crate::urls::SupportedUrls;

/// Configuration for retry behaviour on transient errors.
///
/// Uses exponential backoff capped at `max_delay`:
///
/// ```rust
/// # use huginn::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Base delay before the first retry. Default: 500ms.
    #[serde(rename = "initial_delay_ms", with = "millis")]
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 30s.
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the base delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    ///
    /// Uses exponential backoff: `initial_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Calculate the effective delay, respecting vendor `retry_after` hints.
    ///
    /// If a `retry_after` duration is provided (from a `RateLimited` error),
    /// it takes precedence over the calculated backoff.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| self.delay_for_attempt(attempt))
    }
}

// ============================================================================
// Shared retry helper
// ============================================================================

/// Execute an async operation with retry logic.
///
/// Retries on transient errors (as classified by
/// [`HuginnError::is_transient()`](crate::HuginnError::is_transient)) up to
/// `config.max_attempts`, using exponential backoff and respecting
/// `retry_after` hints from `RateLimited` errors.
///
/// Permanent errors are returned immediately without retry.
pub(crate) async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    provider_name: &str,
    operation: &str,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                metrics::counter!(telemetry::RETRIES_TOTAL,
                    "provider" => provider_name.to_owned(),
                    "operation" => operation.to_owned(),
                )
                .increment(1);
                let delay = config.effective_delay(attempt, e.retry_after());
                warn!(
                    provider = provider_name,
                    operation,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after transient error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            // permanent error, or retries exhausted
            Err(e) => return Err(e),
        }
    }
}

// ============================================================================
// RetryingLanguageModel
// ============================================================================

/// Decorator that wraps a [`LanguageModel`] with retry logic.
///
/// On transient errors, retries with exponential backoff up to
/// `config.max_attempts`. Respects vendor `retry_after` hints from
/// `RateLimited` errors. Stream retry covers only the initial connection,
/// not mid-stream failures.
pub struct RetryingLanguageModel {
    inner: Arc<dyn LanguageModel>,
    config: RetryConfig,
}

impl RetryingLanguageModel {
    /// Wrap a language model with retry logic.
    pub fn new(inner: Arc<dyn LanguageModel>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LanguageModel for RetryingLanguageModel {
    fn specification_version(&self) -> &'static str {
        self.inner.specification_version()
    }

    fn provider(&self) -> &str {
        self.inner.provider()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn supported_urls(&self) -> SupportedUrls {
        self.inner.supported_urls()
    }

    async fn do_generate(&self, options: &CallOptions) -> Result<GenerateResult> {
        with_retry(&self.config, self.inner.provider(), "generate", || {
            self.inner.do_generate(options)
        })
        .await
    }

    async fn do_stream(&self, options: &CallOptions) -> Result<StreamResult> {
        // Retry only the initial connection, not mid-stream failures.
        with_retry(&self.config, self.inner.provider(), "stream", || {
            self.inner.do_stream(options)
        })
        .await
    }
}

// ============================================================================
// RetryingEmbeddingModel
// ============================================================================

/// Decorator that wraps an [`EmbeddingModel`] with retry logic.
///
/// Same semantics as [`RetryingLanguageModel`]: retries transient errors,
/// returns permanent errors immediately.
pub struct RetryingEmbeddingModel {
    inner: Arc<dyn EmbeddingModel>,
    config: RetryConfig,
}

impl RetryingEmbeddingModel {
    /// Wrap an embedding model with retry logic.
    pub fn new(inner: Arc<dyn EmbeddingModel>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl EmbeddingModel for RetryingEmbeddingModel {
    fn specification_version(&self) -> &'static str {
        self.inner.specification_version()
    }

    fn provider(&self) -> &str {
        self.inner.provider()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn max_embeddings_per_call(&self) -> Option<usize> {
        self.inner.max_embeddings_per_call()
    }

    async fn do_embed(&self, options: EmbedOptions) -> Result<EmbedResult> {
        with_retry(&self.config, self.inner.provider(), "embed", || {
            self.inner.do_embed(options.clone())
        })
        .await
    }
}

// ============================================================================
// RetryingImageModel
// ============================================================================

/// Decorator that wraps an [`ImageModel`] with retry logic.
pub struct RetryingImageModel {
    inner: Arc<dyn ImageModel>,
    config: RetryConfig,
}

impl RetryingImageModel {
    /// Wrap an image model with retry logic.
    pub fn new(inner: Arc<dyn ImageModel>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl ImageModel for RetryingImageModel {
    fn specification_version(&self) -> &'static str {
        self.inner.specification_version()
    }

    fn provider(&self) -> &str {
        self.inner.provider()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn max_images_per_call(&self) -> usize {
        self.inner.max_images_per_call()
    }

    async fn do_generate(&self, options: ImageOptions) -> Result<ImageResult> {
        with_retry(&self.config, self.inner.provider(), "image", || {
            self.inner.do_generate(options.clone())
        })
        .await
    }
}
