//! Opt-in embedding cache.
//!
//! Embeddings are deterministic (same model + input → same vector), so
//! they can be served from memory. Generation is excluded: vendor-side
//! prompt caching is the right tool for non-deterministic output.
//!
//! # Architecture
//!
//! [`CachingEmbeddingModel`] decorates any [`EmbeddingModel`]. When enabled
//! on the [`ProviderRegistry`](crate::providers::ProviderRegistry) it sits
//! outside the retry and metrics decorators, so a cache hit bypasses the
//! vendor call and its request metrics entirely. Cache hit/miss metrics
//! are emitted separately.
//!
//! # Batch decomposition
//!
//! `do_embed` looks up every value individually. Only misses are forwarded
//! to the vendor, and the results are reassembled in input order. A single
//! embedding of `"hello"` therefore populates the entry a later batch of
//! `["hello", "world"]` can partially hit.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::debug;

use crate::telemetry;
use crate::traits::EmbeddingModel;
use crate::types::{EmbedOptions, EmbedResult, Embedding};
use crate::{HuginnError, Result};

/// Configuration for the embedding cache.
///
/// ```rust
/// # use huginn::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(10_000)
///     .ttl(Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of cached embeddings. Default: 10,000.
    pub max_entries: u64,
    /// Time-to-live for cached entries. Default: 1 hour.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Shared in-memory store of embeddings.
///
/// Cheap to clone; clones share entries. Keyed on a content hash of
/// (model key, input value).
#[derive(Clone)]
pub struct EmbeddingCache {
    cache: Cache<u64, Embedding>,
}

impl EmbeddingCache {
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.ttl)
            .build();
        Self { cache }
    }

    /// Look up one value. Emits cache hit/miss metrics.
    pub async fn get(&self, model_key: &str, value: &str) -> Option<Embedding> {
        let hit = self.cache.get(&cache_key(model_key, value)).await;
        let name = if hit.is_some() {
            telemetry::CACHE_HITS_TOTAL
        } else {
            telemetry::CACHE_MISSES_TOTAL
        };
        metrics::counter!(name, "operation" => "embed").increment(1);
        hit
    }

    pub async fn insert(&self, model_key: &str, value: &str, embedding: Embedding) {
        self.cache
            .insert(cache_key(model_key, value), embedding)
            .await;
    }

    /// Number of live entries, after pending maintenance has run.
    pub async fn len(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Evict all entries.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

/// Compute a cache key from model key and input value.
///
/// `DefaultHasher` is deterministic within a process, which is all an
/// in-memory cache needs.
fn cache_key(model_key: &str, value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    model_key.hash(&mut hasher);
    value.hash(&mut hasher);
    hasher.finish()
}

/// Reassemble cached hits and vendor results (for the misses) in input order.
fn merge_results(cached: Vec<Option<Embedding>>, fetched: Vec<Embedding>) -> Result<Vec<Embedding>> {
    let mut fetched = fetched.into_iter();
    cached
        .into_iter()
        .map(|hit| match hit {
            Some(embedding) => Ok(embedding),
            None => fetched.next().ok_or_else(|| {
                HuginnError::InvalidResponse("vendor returned fewer embeddings than requested".into())
            }),
        })
        .collect()
}

/// Decorator serving embeddings from an [`EmbeddingCache`].
pub struct CachingEmbeddingModel {
    inner: Arc<dyn EmbeddingModel>,
    cache: EmbeddingCache,
    model_key: String,
}

impl CachingEmbeddingModel {
    /// Wrap `inner` with its own cache.
    pub fn new(inner: Arc<dyn EmbeddingModel>, config: &CacheConfig) -> Self {
        Self::with_cache(inner, EmbeddingCache::new(config))
    }

    /// Wrap `inner` with a cache shared with other models.
    ///
    /// Entries are keyed by provider and model id, so sharing is safe.
    pub fn with_cache(inner: Arc<dyn EmbeddingModel>, cache: EmbeddingCache) -> Self {
        let model_key = format!("{}/{}", inner.provider(), inner.model_id());
        Self {
            inner,
            cache,
            model_key,
        }
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}

#[async_trait]
impl EmbeddingModel for CachingEmbeddingModel {
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
        let mut cached = Vec::with_capacity(options.values.len());
        for value in &options.values {
            cached.push(self.cache.get(&self.model_key, value).await);
        }

        let misses: Vec<String> = options
            .values
            .iter()
            .zip(&cached)
            .filter(|(_, hit)| hit.is_none())
            .map(|(value, _)| value.clone())
            .collect();
        debug!(
            model = %self.model_key,
            hits = cached.len() - misses.len(),
            misses = misses.len(),
            "embedding cache lookup"
        );

        if misses.is_empty() {
            return Ok(EmbedResult {
                embeddings: merge_results(cached, Vec::new())?,
                ..Default::default()
            });
        }

        let result = self
            .inner
            .do_embed(EmbedOptions {
                values: misses.clone(),
                ..options
            })
            .await?;
        if result.embeddings.len() != misses.len() {
            return Err(HuginnError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                misses.len(),
                result.embeddings.len()
            )));
        }
        for (value, embedding) in misses.iter().zip(&result.embeddings) {
            self.cache
                .insert(&self.model_key, value, embedding.clone())
                .await;
        }

        Ok(EmbedResult {
            embeddings: merge_results(cached, result.embeddings)?,
            usage: result.usage,
            response: result.response,
        })
    }
}
