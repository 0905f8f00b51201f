use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use huginn::providers::{
    RetryConfig, RetryingEmbeddingModel, RetryingImageModel, RetryingLanguageModel,
};
use huginn::{
    CallOptions, Content, EmbedOptions, EmbedResult, EmbeddingModel, FinishReason,
    GenerateResult, HuginnError, ImageModel, ImageOptions, ImageResult, LanguageModel, Message,
    Result, StreamPart, StreamResult,
};

/// Mock model that fails N times then succeeds.
struct FailThenSucceed {
    fail_count: AtomicU32,
    fail_with: fn() -> HuginnError,
    total_calls: AtomicU32,
}

impl FailThenSucceed {
    fn new(failures: u32, fail_with: fn() -> HuginnError) -> Self {
        Self {
            fail_count: AtomicU32::new(failures),
            fail_with,
            total_calls: AtomicU32::new(0),
        }
    }

    fn call_count(&self) -> u32 {
        self.total_calls.load(Ordering::Relaxed)
    }

    fn attempt(&self) -> Result<()> {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let remaining = self.fail_count.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_count.fetch_sub(1, Ordering::Relaxed);
            return Err((self.fail_with)());
        }
        Ok(())
    }
}

#[async_trait]
impl LanguageModel for FailThenSucceed {
    fn provider(&self) -> &str {
        "mock.chat"
    }

    fn model_id(&self) -> &str {
        "mock-retry"
    }

    async fn do_generate(&self, _options: &CallOptions) -> Result<GenerateResult> {
        self.attempt()?;
        Ok(GenerateResult {
            content: vec![Content::text("ok")],
            finish_reason: FinishReason::Stop,
            ..Default::default()
        })
    }

    async fn do_stream(&self, _options: &CallOptions) -> Result<StreamResult> {
        self.attempt()?;
        Ok(StreamResult::new(Box::pin(futures_util::stream::empty::<Result<StreamPart>>())))
    }
}

#[async_trait]
impl EmbeddingModel for FailThenSucceed {
    fn provider(&self) -> &str {
        "mock.embedding"
    }

    fn model_id(&self) -> &str {
        "mock-embed"
    }

    async fn do_embed(&self, options: EmbedOptions) -> Result<EmbedResult> {
        self.attempt()?;
        Ok(EmbedResult {
            embeddings: options
                .values
                .iter()
                .map(|v| huginn::Embedding::new(vec![v.len() as f32], "mock-embed"))
                .collect(),
            ..Default::default()
        })
    }
}

#[async_trait]
impl ImageModel for FailThenSucceed {
    fn provider(&self) -> &str {
        "mock.image"
    }

    fn model_id(&self) -> &str {
        "mock-paint"
    }

    async fn do_generate(&self, _options: ImageOptions) -> Result<ImageResult> {
        self.attempt()?;
        Ok(ImageResult {
            images: vec!["aW1n".into()],
            ..Default::default()
        })
    }
}

fn fast_config() -> RetryConfig {
    RetryConfig::new()
        .max_attempts(3)
        .initial_delay(Duration::from_millis(10))
}

fn options() -> CallOptions {
    CallOptions::new(vec![Message::user("hi")])
}

fn server_error() -> HuginnError {
    HuginnError::ApiCall {
        status: 503,
        message: "overloaded".into(),
        url: "http://mock".into(),
        is_retryable: true,
        response_body: None,
    }
}

#[tokio::test(start_paused = true)]
async fn retries_on_transient_error_then_succeeds() {
    let inner = Arc::new(FailThenSucceed::new(2, || HuginnError::RateLimited {
        retry_after: None,
    }));
    let model = RetryingLanguageModel::new(inner.clone(), fast_config());

    let result = model.do_generate(&options()).await.unwrap();
    assert_eq!(result.text(), "ok");
    assert_eq!(inner.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts() {
    let inner = Arc::new(FailThenSucceed::new(10, server_error));
    let model = RetryingLanguageModel::new(inner.clone(), fast_config());

    let err = model.do_generate(&options()).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(inner.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn permanent_error_is_not_retried() {
    let inner = Arc::new(FailThenSucceed::new(1, || HuginnError::AuthenticationFailed));
    let model = RetryingLanguageModel::new(inner.clone(), fast_config());

    let err = model.do_generate(&options()).await.unwrap_err();
    assert!(matches!(err, HuginnError::AuthenticationFailed));
    assert_eq!(inner.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn disabled_config_makes_one_attempt() {
    let inner = Arc::new(FailThenSucceed::new(1, server_error));
    let model = RetryingLanguageModel::new(inner.clone(), RetryConfig::disabled());

    assert!(model.do_generate(&options()).await.is_err());
    assert_eq!(inner.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_after_hint_is_respected() {
    let inner = Arc::new(FailThenSucceed::new(1, || HuginnError::RateLimited {
        retry_after: Some(Duration::from_secs(7)),
    }));
    let model = RetryingLanguageModel::new(inner.clone(), fast_config());

    let start = tokio::time::Instant::now();
    model.do_generate(&options()).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(7));
    assert_eq!(inner.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn stream_open_is_retried() {
    let inner = Arc::new(FailThenSucceed::new(1, || {
        HuginnError::Http("connection reset".into())
    }));
    let model = RetryingLanguageModel::new(inner.clone(), fast_config());

    assert!(model.do_stream(&options()).await.is_ok());
    assert_eq!(inner.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn embedding_calls_are_retried_with_the_same_values() {
    let inner = Arc::new(FailThenSucceed::new(1, server_error));
    let model = RetryingEmbeddingModel::new(inner.clone(), fast_config());

    let result = model
        .do_embed(EmbedOptions::new(["abc", "de"]))
        .await
        .unwrap();
    assert_eq!(result.embeddings.len(), 2);
    assert_eq!(result.embeddings[0].values, vec![3.0]);
    assert_eq!(inner.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn image_calls_are_retried() {
    let inner = Arc::new(FailThenSucceed::new(2, server_error));
    let model = RetryingImageModel::new(inner.clone(), fast_config());

    let result = model.do_generate(ImageOptions::new("raven")).await.unwrap();
    assert_eq!(result.images.len(), 1);
    assert_eq!(inner.call_count(), 3);
}

#[test]
fn decorators_delegate_identity() {
    let inner = Arc::new(FailThenSucceed::new(0, server_error));
    let model = RetryingLanguageModel::new(inner, fast_config());
    assert_eq!(model.provider(), "mock.chat");
    assert_eq!(model.model_id(), "mock-retry");
    assert_eq!(model.specification_version(), "v2");
}

#[test]
fn backoff_doubles_and_caps() {
    let config = RetryConfig::new()
        .initial_delay(Duration::from_millis(100))
        .max_delay(Duration::from_millis(350));
    assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
    assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
    assert_eq!(config.delay_for_attempt(2), Duration::from_millis(350));
    assert_eq!(config.delay_for_attempt(40), Duration::from_millis(350));
    assert_eq!(
        config.effective_delay(0, Some(Duration::from_secs(2))),
        Duration::from_secs(2)
    );
}
