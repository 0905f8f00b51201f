//! Chat language model.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, instrument};

use super::ProviderConfig;
use super::convert::build_request_body;
use super::response::{ChatCompletionResponse, map_parsed_response};
use super::streaming::{ChunkTransformer, into_part_stream};
use crate::http::{combine_headers, post_json, read_json, response_headers};
use crate::traits::LanguageModel;
use crate::types::{
    CallOptions, GenerateResult, RequestInfo, StreamResponseInfo, StreamResult,
};
use crate::urls::SupportedUrls;
use crate::{HuginnError, Result};

/// A model served by an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiCompatibleChatModel {
    model_id: String,
    provider: String,
    config: Arc<ProviderConfig>,
    http: Client,
}

impl OpenAiCompatibleChatModel {
    pub(crate) fn new(model_id: impl Into<String>, config: Arc<ProviderConfig>, http: Client) -> Self {
        Self {
            model_id: model_id.into(),
            provider: format!("{}.chat", config.name),
            config,
            http,
        }
    }

    fn check_aborted(options: &CallOptions) -> Result<()> {
        if options.is_aborted() {
            return Err(HuginnError::Aborted);
        }
        Ok(())
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleChatModel {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn supported_urls(&self) -> SupportedUrls {
        self.config.supported_urls.clone()
    }

    #[instrument(name = "chat.generate", skip(self, options), fields(provider = %self.provider, model = %self.model_id))]
    async fn do_generate(&self, options: &CallOptions) -> Result<GenerateResult> {
        Self::check_aborted(options)?;
        let (body, warnings) = build_request_body(
            &self.model_id,
            options,
            &self.config.name,
            self.config.supports_structured_outputs,
        )?;
        let url = self.config.url("/chat/completions")?;
        let headers = combine_headers([&self.config.headers, &options.headers]);

        let response = post_json(&self.http, &url, &headers, &body, options.abort.as_ref()).await?;
        let response_headers = response_headers(&response);
        let (parsed, raw) =
            read_json::<ChatCompletionResponse>(response, options.abort.as_ref()).await?;

        let mut result = map_parsed_response(parsed, &self.config.name)?;
        debug!(
            finish_reason = result.finish_reason.as_str(),
            content_parts = result.content.len(),
            "chat completion received"
        );
        result.warnings = warnings;
        result.request = RequestInfo { body: Some(body) };
        result.response.headers = response_headers;
        result.response.body = Some(raw);
        Ok(result)
    }

    #[instrument(name = "chat.stream", skip(self, options), fields(provider = %self.provider, model = %self.model_id))]
    async fn do_stream(&self, options: &CallOptions) -> Result<StreamResult> {
        Self::check_aborted(options)?;
        let (mut body, warnings) = build_request_body(
            &self.model_id,
            options,
            &self.config.name,
            self.config.supports_structured_outputs,
        )?;
        body["stream"] = json!(true);
        if self.config.include_usage {
            body["stream_options"] = json!({ "include_usage": true });
        }
        let url = self.config.url("/chat/completions")?;
        let headers = combine_headers([&self.config.headers, &options.headers]);

        let response = post_json(&self.http, &url, &headers, &body, options.abort.as_ref()).await?;
        let response_headers = response_headers(&response);
        debug!("chat stream opened");

        let transformer = ChunkTransformer::new(&self.config.name, options.include_raw_chunks);
        let stream = into_part_stream(
            response.bytes_stream(),
            transformer,
            warnings,
            options.abort.clone(),
        );

        Ok(StreamResult {
            stream,
            request: RequestInfo { body: Some(body) },
            response: StreamResponseInfo {
                headers: response_headers,
            },
        })
    }
}
