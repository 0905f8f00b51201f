//! Text embedding model (`/embeddings`).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::instrument;

use super::ProviderConfig;
use crate::http::{combine_headers, post_json, read_json, response_headers};
use crate::traits::EmbeddingModel;
use crate::types::{EmbedOptions, EmbedResult, Embedding, EmbeddingUsage, ResponseInfo};
use crate::{HuginnError, Result};

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    usage: Option<EmbeddingUsageWire>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsageWire {
    prompt_tokens: u64,
}

/// An OpenAI-compatible embedding model.
#[derive(Clone)]
pub struct OpenAiCompatibleEmbeddingModel {
    model_id: String,
    provider: String,
    config: Arc<ProviderConfig>,
    http: Client,
}

impl OpenAiCompatibleEmbeddingModel {
    pub(crate) fn new(model_id: impl Into<String>, config: Arc<ProviderConfig>, http: Client) -> Self {
        Self {
            model_id: model_id.into(),
            provider: format!("{}.embedding", config.name),
            config,
            http,
        }
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiCompatibleEmbeddingModel {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn max_embeddings_per_call(&self) -> Option<usize> {
        Some(self.config.max_embeddings_per_call)
    }

    #[instrument(name = "embedding.embed", skip(self, options), fields(provider = %self.provider, model = %self.model_id, count = options.values.len()))]
    async fn do_embed(&self, options: EmbedOptions) -> Result<EmbedResult> {
        let max = self.config.max_embeddings_per_call;
        if options.values.len() > max {
            return Err(HuginnError::TooManyEmbeddingValues {
                max,
                actual: options.values.len(),
            });
        }

        let mut body = Map::new();
        body.insert("model".into(), json!(self.model_id));
        body.insert("input".into(), json!(options.values));
        body.insert("encoding_format".into(), json!("float"));
        if let Some(extra) = options
            .provider_options
            .as_ref()
            .and_then(|o| o.get(&self.config.name))
        {
            for (k, v) in extra {
                body.insert(k.clone(), v.clone());
            }
        }
        let body = Value::Object(body);

        let url = self.config.url("/embeddings")?;
        let headers = combine_headers([&self.config.headers, &options.headers]);
        let response = post_json(&self.http, &url, &headers, &body, options.abort.as_ref()).await?;
        let headers = response_headers(&response);
        let (parsed, raw) =
            read_json::<EmbeddingResponse>(response, options.abort.as_ref()).await?;

        if parsed.data.len() != options.values.len() {
            return Err(HuginnError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                options.values.len(),
                parsed.data.len()
            )));
        }

        Ok(EmbedResult {
            embeddings: parsed
                .data
                .into_iter()
                .map(|d| Embedding::new(d.embedding, &self.model_id))
                .collect(),
            usage: parsed.usage.map(|u| EmbeddingUsage {
                tokens: u.prompt_tokens,
            }),
            response: ResponseInfo {
                headers,
                body: Some(raw),
                ..Default::default()
            },
        })
    }
}
