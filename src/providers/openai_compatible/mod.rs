//! Provider adapter for OpenAI-compatible HTTP APIs.
//!
//! Many vendors (and local servers such as vLLM, llama.cpp or LM Studio)
//! expose the `/chat/completions`, `/embeddings` and `/images/generations`
//! endpoints with OpenAI's wire format. This adapter maps the normalized
//! call options onto that format and maps responses and SSE chunks back.
//!
//! ```rust,no_run
//! use huginn::providers::OpenAiCompatibleProvider;
//! use huginn::{CallOptions, LanguageModel, Message};
//!
//! # async fn run() -> huginn::Result<()> {
//! let provider = OpenAiCompatibleProvider::builder("acme", "https://api.acme.dev/v1")
//!     .api_key("sk-...")
//!     .include_usage(true)
//!     .build()?;
//!
//! let model = provider.chat_model("acme-large");
//! let result = model
//!     .do_generate(&CallOptions::new(vec![Message::user("Hello!")]))
//!     .await?;
//! println!("{}", result.text());
//! # Ok(())
//! # }
//! ```

mod chat;
mod convert;
mod embedding;
mod image;
mod response;
mod streaming;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

pub use chat::OpenAiCompatibleChatModel;
pub use convert::{PreparedTools, build_request_body, convert_to_chat_messages, prepare_tools};
pub use embedding::OpenAiCompatibleEmbeddingModel;
pub use image::OpenAiCompatibleImageModel;
pub use response::{map_finish_reason, map_response};
pub use streaming::ChunkTransformer;

use crate::traits::{EmbeddingModel, ImageModel, LanguageModel, Provider};
use crate::urls::SupportedUrls;
use crate::{HuginnError, Result, version};

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Settings shared by all models of one provider instance.
#[derive(Debug, Clone)]
pub(crate) struct ProviderConfig {
    /// Provider name, also the key for provider options and metadata.
    pub name: String,
    pub base_url: String,
    pub headers: HashMap<String, String>,
    pub query_params: Vec<(String, String)>,
    pub include_usage: bool,
    pub supports_structured_outputs: bool,
    pub supported_urls: SupportedUrls,
    pub max_embeddings_per_call: usize,
}

impl ProviderConfig {
    /// Full URL for an endpoint path such as `/chat/completions`.
    pub fn url(&self, path: &str) -> Result<String> {
        let base = format!("{}{}", self.base_url, path);
        if self.query_params.is_empty() {
            return Ok(base);
        }
        reqwest::Url::parse_with_params(&base, &self.query_params)
            .map(String::from)
            .map_err(|e| HuginnError::Configuration(format!("invalid URL {base}: {e}")))
    }
}

/// Factory for OpenAI-compatible model handles.
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    config: Arc<ProviderConfig>,
    http: Client,
}

impl OpenAiCompatibleProvider {
    /// Start configuring a provider named `name` rooted at `base_url`.
    pub fn builder(
        name: impl Into<String>,
        base_url: impl Into<String>,
    ) -> OpenAiCompatibleProviderBuilder {
        OpenAiCompatibleProviderBuilder::new(name, base_url)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn chat_model(&self, model_id: impl Into<String>) -> OpenAiCompatibleChatModel {
        OpenAiCompatibleChatModel::new(model_id, self.config.clone(), self.http.clone())
    }

    pub fn embedding_model(&self, model_id: impl Into<String>) -> OpenAiCompatibleEmbeddingModel {
        OpenAiCompatibleEmbeddingModel::new(model_id, self.config.clone(), self.http.clone())
    }

    pub fn image_generation_model(
        &self,
        model_id: impl Into<String>,
    ) -> OpenAiCompatibleImageModel {
        OpenAiCompatibleImageModel::new(model_id, self.config.clone(), self.http.clone())
    }
}

impl Provider for OpenAiCompatibleProvider {
    fn language_model(&self, model_id: &str) -> Result<Arc<dyn LanguageModel>> {
        Ok(Arc::new(self.chat_model(model_id)))
    }

    fn text_embedding_model(&self, model_id: &str) -> Result<Arc<dyn EmbeddingModel>> {
        Ok(Arc::new(self.embedding_model(model_id)))
    }

    fn image_model(&self, model_id: &str) -> Result<Arc<dyn ImageModel>> {
        Ok(Arc::new(self.image_generation_model(model_id)))
    }
}

/// Builder for [`OpenAiCompatibleProvider`].
pub struct OpenAiCompatibleProviderBuilder {
    name: String,
    base_url: String,
    api_key: Option<String>,
    api_key_env: Option<String>,
    headers: HashMap<String, String>,
    query_params: Vec<(String, String)>,
    include_usage: bool,
    supports_structured_outputs: bool,
    supported_urls: SupportedUrls,
    max_embeddings_per_call: usize,
    timeout: Duration,
    http_client: Option<Client>,
}

impl OpenAiCompatibleProviderBuilder {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: None,
            api_key_env: None,
            headers: HashMap::new(),
            query_params: Vec::new(),
            include_usage: false,
            supports_structured_outputs: false,
            supported_urls: SupportedUrls::default(),
            max_embeddings_per_call: 2048,
            timeout: DEFAULT_TIMEOUT,
            http_client: None,
        }
    }

    /// Bearer token sent as `Authorization`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Read the API key from this environment variable at build time.
    ///
    /// An explicit [`api_key`](Self::api_key) wins over the environment.
    pub fn api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Query parameter appended to every request URL.
    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((name.into(), value.into()));
        self
    }

    /// Ask for usage in streaming responses (`stream_options.include_usage`).
    pub fn include_usage(mut self, include: bool) -> Self {
        self.include_usage = include;
        self
    }

    /// Vendor accepts `response_format: json_schema`.
    pub fn supports_structured_outputs(mut self, supports: bool) -> Self {
        self.supports_structured_outputs = supports;
        self
    }

    /// URLs the vendor fetches itself.
    pub fn supported_urls(mut self, urls: SupportedUrls) -> Self {
        self.supported_urls = urls;
        self
    }

    pub fn max_embeddings_per_call(mut self, max: usize) -> Self {
        self.max_embeddings_per_call = max;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Share an existing client (connection pool). Overrides `timeout`.
    pub fn http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn build(self) -> Result<OpenAiCompatibleProvider> {
        if self.name.trim().is_empty() {
            return Err(HuginnError::Configuration(
                "provider name must not be empty".into(),
            ));
        }
        reqwest::Url::parse(&self.base_url).map_err(|e| {
            HuginnError::Configuration(format!("invalid base URL {}: {e}", self.base_url))
        })?;

        let api_key = match (self.api_key, self.api_key_env) {
            (Some(key), _) => Some(key),
            (None, Some(var)) => Some(crate::http::load_api_key(None, &var, &self.name)?),
            (None, None) => None,
        };

        let mut headers = HashMap::new();
        headers.insert("user-agent".to_string(), version::user_agent());
        if let Some(key) = api_key {
            headers.insert("authorization".to_string(), format!("Bearer {key}"));
        }
        for (k, v) in self.headers {
            headers.insert(k.to_lowercase(), v);
        }

        let http = match self.http_client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| HuginnError::Configuration(format!("HTTP client: {e}")))?,
        };

        Ok(OpenAiCompatibleProvider {
            config: Arc::new(ProviderConfig {
                name: self.name,
                base_url: self.base_url.trim_end_matches('/').to_string(),
                headers,
                query_params: self.query_params,
                include_usage: self.include_usage,
                supports_structured_outputs: self.supports_structured_outputs,
                supported_urls: self.supported_urls,
                max_embeddings_per_call: self.max_embeddings_per_call,
            }),
            http,
        })
    }
}
