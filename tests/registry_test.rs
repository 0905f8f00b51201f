//! Tests for provider registration and `provider:model` resolution.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use huginn::providers::{OpenAiCompatibleProvider, ProviderRegistry, RetryConfig};
use huginn::{
    CallOptions, EmbeddingModel, FinishReason, GenerateResult, HuginnError, LanguageModel,
    Message, ModelType, Provider, Result, StreamPart, StreamResult,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Mock provider
// ============================================================================

/// Language model whose stream skips `stream-start` and never finishes.
struct SloppyModel {
    model_id: String,
}

#[async_trait]
impl LanguageModel for SloppyModel {
    fn provider(&self) -> &str {
        "sloppy.chat"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn do_generate(&self, _options: &CallOptions) -> Result<GenerateResult> {
        Ok(GenerateResult {
            finish_reason: FinishReason::Stop,
            ..Default::default()
        })
    }

    async fn do_stream(&self, _options: &CallOptions) -> Result<StreamResult> {
        let parts = vec![
            Ok(StreamPart::TextDelta {
                id: "txt-0".into(),
                delta: "dangling".into(),
            }),
        ];
        Ok(StreamResult::new(Box::pin(stream::iter(parts))))
    }
}

struct SloppyProvider;

impl Provider for SloppyProvider {
    fn language_model(&self, model_id: &str) -> Result<Arc<dyn LanguageModel>> {
        Ok(Arc::new(SloppyModel {
            model_id: model_id.to_string(),
        }))
    }
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn unknown_provider_is_reported() {
    let registry = ProviderRegistry::new();
    let err = registry.language_model("nobody:model").err().unwrap();
    assert!(matches!(err, HuginnError::NoSuchProvider(ref id) if id == "nobody"));
}

#[test]
fn id_without_separator_is_no_such_model() {
    let mut registry = ProviderRegistry::new();
    registry.register("sloppy", Arc::new(SloppyProvider));
    let err = registry.language_model("sloppy").err().unwrap();
    assert!(matches!(
        err,
        HuginnError::NoSuchModel {
            model_type: ModelType::Language,
            ..
        }
    ));
}

#[test]
fn provider_without_embeddings_reports_model_type() {
    let mut registry = ProviderRegistry::new();
    registry.register("sloppy", Arc::new(SloppyProvider));
    let err = registry.text_embedding_model("sloppy:embed").err().unwrap();
    assert!(matches!(
        err,
        HuginnError::NoSuchModel {
            model_type: ModelType::TextEmbedding,
            ..
        }
    ));
    let err = registry.image_model("sloppy:paint").err().unwrap();
    assert!(matches!(
        err,
        HuginnError::NoSuchModel {
            model_type: ModelType::Image,
            ..
        }
    ));
}

#[test]
fn custom_separator_splits_at_first_occurrence() {
    let mut registry = ProviderRegistry::new();
    registry.set_separator('/');
    registry.register("sloppy", Arc::new(SloppyProvider));

    let model = registry.language_model("sloppy/org/model:v2").unwrap();
    assert_eq!(model.model_id(), "org/model:v2");
    assert_eq!(model.provider(), "sloppy.chat");
}

#[test]
fn provider_ids_are_sorted() {
    let mut registry = ProviderRegistry::new();
    registry.register("zeta", Arc::new(SloppyProvider));
    registry.register("alpha", Arc::new(SloppyProvider));
    assert_eq!(registry.provider_ids(), vec!["alpha", "zeta"]);
    assert!(registry.has_provider("zeta"));
    assert!(!registry.has_provider("beta"));
}

// ============================================================================
// Decoration
// ============================================================================

#[tokio::test]
async fn resolved_streams_are_well_formed() {
    let mut registry = ProviderRegistry::new();
    registry.register("sloppy", Arc::new(SloppyProvider));
    let model = registry.language_model("sloppy:any").unwrap();

    let parts: Vec<StreamPart> = model
        .do_stream(&CallOptions::default())
        .await
        .unwrap()
        .stream
        .map(|p| p.unwrap())
        .collect()
        .await;

    assert!(matches!(parts.first(), Some(StreamPart::StreamStart { .. })));
    assert_eq!(parts[1].as_text_delta(), Some("dangling"));
    assert!(matches!(
        parts.last(),
        Some(StreamPart::Finish {
            finish_reason: FinishReason::Other,
            ..
        })
    ));
}

#[tokio::test]
async fn registry_retries_vendor_failures() {
    let server = MockServer::start().await;
    // Mocks registered first take priority while they have capacity left.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "model": "acme-large",
            "choices": [{ "message": { "content": "third time" }, "finish_reason": "stop" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut registry = ProviderRegistry::new();
    registry.set_retry_config(
        RetryConfig::new()
            .max_attempts(3)
            .initial_delay(Duration::from_millis(5)),
    );
    registry.register(
        "acme",
        Arc::new(
            OpenAiCompatibleProvider::builder("acme", server.uri())
                .build()
                .unwrap(),
        ),
    );

    let model = registry.language_model("acme:acme-large").unwrap();
    let result = model
        .do_generate(&CallOptions::new(vec![Message::user("hi")]))
        .await
        .unwrap();
    assert_eq!(result.text(), "third time");
}

#[tokio::test]
async fn embedding_models_resolve_through_the_registry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [1.0, 0.0] }]
        })))
        .mount(&server)
        .await;

    let mut registry = ProviderRegistry::new();
    registry.register(
        "acme",
        Arc::new(
            OpenAiCompatibleProvider::builder("acme", server.uri())
                .build()
                .unwrap(),
        ),
    );

    let model = registry.text_embedding_model("acme:acme-embed").unwrap();
    assert_eq!(model.provider(), "acme.embedding");
    assert_eq!(model.max_embeddings_per_call(), Some(2048));
    let result = model
        .do_embed(huginn::EmbedOptions::new(["hello"]))
        .await
        .unwrap();
    assert_eq!(result.embeddings[0].values, vec![1.0, 0.0]);
}
