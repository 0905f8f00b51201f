//! Provider registry resolving `provider:model` ids.
//!
//! The `ProviderRegistry` stores providers by id. A model id such as
//! `"acme:acme-large"` is split at the first separator: the prefix selects
//! the provider, the rest is handed to the provider's factory method.
//!
//! # Decoration
//!
//! Every model handle handed out is decorated:
//!
//! ```text
//! registry.language_model("acme:acme-large")
//!                     │
//!                     ▼
//!         ┌──────────────────────────┐
//!         │ InstrumentedLanguageModel│ ──► metrics, lifecycle guard,
//!         │                          │     bounded stream channel
//!         └────────────┬─────────────┘
//!                      ▼
//!         ┌──────────────────────────┐
//!         │  RetryingLanguageModel   │ ──► only when a RetryConfig is set
//!         └────────────┬─────────────┘
//!                      ▼
//!         ┌──────────────────────────┐
//!         │  vendor model handle     │
//!         └──────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, instrument};

use super::retry::{RetryConfig, RetryingEmbeddingModel, RetryingImageModel, RetryingLanguageModel};
use crate::cache::{CacheConfig, CachingEmbeddingModel, EmbeddingCache};
use crate::error::ModelType;
use crate::stream::{DEFAULT_STREAM_BUFFER, bounded_stream, enforce_lifecycle};
use crate::telemetry;
use crate::traits::{EmbeddingModel, ImageModel, LanguageModel, Provider};
use crate::types::{
    CallOptions, EmbedOptions, EmbedResult, GenerateResult, ImageOptions, ImageResult,
    StreamPart, StreamResult, Usage,
};
use crate::urls::SupportedUrls;
use crate::{HuginnError, Result};

/// Default separator between provider id and model id.
pub const DEFAULT_SEPARATOR: char = ':';

/// Registry of providers addressed by id.
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Provider>>,
    separator: char,
    retry_config: Option<RetryConfig>,
    stream_buffer_size: usize,
    embedding_cache: Option<EmbeddingCache>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self {
            providers: BTreeMap::new(),
            separator: DEFAULT_SEPARATOR,
            retry_config: None,
            stream_buffer_size: DEFAULT_STREAM_BUFFER,
            embedding_cache: None,
        }
    }
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry configuration.
    ///
    /// When set, model handles resolved afterwards are wrapped in
    /// `Retrying*Model` decorators.
    pub fn set_retry_config(&mut self, config: RetryConfig) {
        self.retry_config = Some(config);
    }

    /// Set the stream buffer size for backpressure.
    ///
    /// Controls the bounded channel capacity between stream producers
    /// and consumers. Default: [`DEFAULT_STREAM_BUFFER`] (64).
    pub fn set_stream_buffer_size(&mut self, size: usize) {
        self.stream_buffer_size = size;
    }

    /// Enable the embedding cache.
    ///
    /// Embedding models resolved afterwards share one [`EmbeddingCache`].
    /// A cache hit bypasses retries and request metrics.
    pub fn set_embedding_cache(&mut self, config: CacheConfig) {
        self.embedding_cache = Some(EmbeddingCache::new(&config));
    }

    /// The shared embedding cache, if enabled.
    pub fn embedding_cache(&self) -> Option<&EmbeddingCache> {
        self.embedding_cache.as_ref()
    }

    /// Set the separator between provider id and model id.
    pub fn set_separator(&mut self, separator: char) {
        self.separator = separator;
    }

    /// Register a provider under `id`, replacing any previous one.
    pub fn register(&mut self, id: impl Into<String>, provider: Arc<dyn Provider>) {
        let id = id.into();
        debug!(provider = %id, "registering provider");
        self.providers.insert(id, provider);
    }

    pub fn has_provider(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// Registered provider ids, sorted.
    pub fn provider_ids(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Resolve a language model by `provider:model` id.
    #[instrument(skip(self))]
    pub fn language_model(&self, id: &str) -> Result<Arc<dyn LanguageModel>> {
        let (provider_id, model_id) = self.split_id(id, ModelType::Language)?;
        let mut model = self.provider(provider_id)?.language_model(model_id)?;
        if let Some(config) = &self.retry_config {
            model = Arc::new(RetryingLanguageModel::new(model, config.clone()));
        }
        Ok(Arc::new(InstrumentedLanguageModel {
            inner: model,
            provider_id: provider_id.to_string(),
            stream_buffer_size: self.stream_buffer_size,
        }))
    }

    /// Resolve a text embedding model by `provider:model` id.
    #[instrument(skip(self))]
    pub fn text_embedding_model(&self, id: &str) -> Result<Arc<dyn EmbeddingModel>> {
        let (provider_id, model_id) = self.split_id(id, ModelType::TextEmbedding)?;
        let mut model = self.provider(provider_id)?.text_embedding_model(model_id)?;
        if let Some(config) = &self.retry_config {
            model = Arc::new(RetryingEmbeddingModel::new(model, config.clone()));
        }
        let model: Arc<dyn EmbeddingModel> = Arc::new(InstrumentedEmbeddingModel {
            inner: model,
            provider_id: provider_id.to_string(),
        });
        Ok(match &self.embedding_cache {
            Some(cache) => Arc::new(CachingEmbeddingModel::with_cache(model, cache.clone())),
            None => model,
        })
    }

    /// Resolve an image model by `provider:model` id.
    #[instrument(skip(self))]
    pub fn image_model(&self, id: &str) -> Result<Arc<dyn ImageModel>> {
        let (provider_id, model_id) = self.split_id(id, ModelType::Image)?;
        let mut model = self.provider(provider_id)?.image_model(model_id)?;
        if let Some(config) = &self.retry_config {
            model = Arc::new(RetryingImageModel::new(model, config.clone()));
        }
        Ok(Arc::new(InstrumentedImageModel {
            inner: model,
            provider_id: provider_id.to_string(),
        }))
    }

    fn split_id<'a>(&self, id: &'a str, model_type: ModelType) -> Result<(&'a str, &'a str)> {
        id.split_once(self.separator)
            .ok_or_else(|| HuginnError::NoSuchModel {
                model_id: id.to_string(),
                model_type,
            })
    }

    fn provider(&self, id: &str) -> Result<&Arc<dyn Provider>> {
        self.providers
            .get(id)
            .ok_or_else(|| HuginnError::NoSuchProvider(id.to_string()))
    }
}

// ============================================================================
// Metrics recording
// ============================================================================

/// Record request outcome metrics (counter + histogram).
fn record_request(operation: &'static str, provider: &str, start: Instant, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    let elapsed = start.elapsed().as_secs_f64();
    metrics::counter!(telemetry::REQUESTS_TOTAL,
        "provider" => provider.to_owned(),
        "operation" => operation,
        "status" => status,
    )
    .increment(1);
    metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
        "provider" => provider.to_owned(),
        "operation" => operation,
    )
    .record(elapsed);
}

/// Record reported token counts. Unreported counts are skipped.
fn record_token_usage(provider: &str, usage: &Usage) {
    if let Some(input) = usage.input_tokens {
        metrics::counter!(telemetry::TOKENS_TOTAL,
            "provider" => provider.to_owned(),
            "direction" => "input",
        )
        .increment(input);
    }
    if let Some(output) = usage.output_tokens {
        metrics::counter!(telemetry::TOKENS_TOTAL,
            "provider" => provider.to_owned(),
            "direction" => "output",
        )
        .increment(output);
    }
}

// ============================================================================
// Instrumented decorators
// ============================================================================

struct InstrumentedLanguageModel {
    inner: Arc<dyn LanguageModel>,
    provider_id: String,
    stream_buffer_size: usize,
}

#[async_trait]
impl LanguageModel for InstrumentedLanguageModel {
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
        let start = Instant::now();
        let result = self.inner.do_generate(options).await;
        record_request("generate", &self.provider_id, start, result.is_ok());
        if let Ok(result) = &result {
            record_token_usage(&self.provider_id, &result.usage);
        }
        result
    }

    async fn do_stream(&self, options: &CallOptions) -> Result<StreamResult> {
        let start = Instant::now();
        let result = self.inner.do_stream(options).await;
        record_request("stream", &self.provider_id, start, result.is_ok());

        let provider = self.provider_id.clone();
        let buffer = self.stream_buffer_size;
        Ok(result?.map_stream(move |stream| {
            let stream = stream.inspect(move |item| {
                if let Ok(StreamPart::Finish { usage, .. }) = item {
                    record_token_usage(&provider, usage);
                }
            });
            bounded_stream(enforce_lifecycle(Box::pin(stream)), buffer)
        }))
    }
}

struct InstrumentedEmbeddingModel {
    inner: Arc<dyn EmbeddingModel>,
    provider_id: String,
}

#[async_trait]
impl EmbeddingModel for InstrumentedEmbeddingModel {
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
        let start = Instant::now();
        let result = self.inner.do_embed(options).await;
        record_request("embed", &self.provider_id, start, result.is_ok());
        if let Ok(EmbedResult {
            usage: Some(usage), ..
        }) = &result
        {
            metrics::counter!(telemetry::TOKENS_TOTAL,
                "provider" => self.provider_id.clone(),
                "direction" => "input",
            )
            .increment(usage.tokens);
        }
        result
    }
}

struct InstrumentedImageModel {
    inner: Arc<dyn ImageModel>,
    provider_id: String,
}

#[async_trait]
impl ImageModel for InstrumentedImageModel {
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
        let start = Instant::now();
        let result = self.inner.do_generate(options).await;
        record_request("image", &self.provider_id, start, result.is_ok());
        result
    }
}

// ============================================================================
// Tests
// ============================================================================
