//! Huginn - normalized interface to language-model vendors
//!
//! This crate defines a vendor-independent contract for language models
//! (prompts, content parts, stream events, usage, finish reasons) and a
//! provider adapter for OpenAI-compatible HTTP APIs. Consumers talk to
//! [`LanguageModel`] handles without coupling to a vendor's wire format.
//!
//! # Generate Example
//!
//! ```rust,no_run
//! use huginn::providers::OpenAiCompatibleProvider;
//! use huginn::{CallOptions, LanguageModel, Message};
//!
//! #[tokio::main]
//! async fn main() -> huginn::Result<()> {
//!     let provider = OpenAiCompatibleProvider::builder("acme", "https://api.acme.dev/v1")
//!         .api_key_env("ACME_API_KEY")
//!         .build()?;
//!     let model = provider.chat_model("acme-large");
//!
//!     let result = model
//!         .do_generate(&CallOptions::new(vec![
//!             Message::system("You are a helpful assistant."),
//!             Message::user("What is the capital of France?"),
//!         ]))
//!         .await?;
//!
//!     println!("{}", result.text());
//!     Ok(())
//! }
//! ```
//!
//! # Streaming Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use futures_util::StreamExt;
//! use huginn::providers::{OpenAiCompatibleProvider, ProviderRegistry};
//! use huginn::{CallOptions, Message, StreamPart};
//!
//! #[tokio::main]
//! async fn main() -> huginn::Result<()> {
//!     let mut registry = ProviderRegistry::new();
//!     registry.register(
//!         "acme",
//!         Arc::new(OpenAiCompatibleProvider::builder("acme", "https://api.acme.dev/v1").build()?),
//!     );
//!
//!     let model = registry.language_model("acme:acme-large")?;
//!     let mut stream = model
//!         .do_stream(&CallOptions::new(vec![Message::user("Tell me a story.")]))
//!         .await?
//!         .stream;
//!
//!     while let Some(part) = stream.next().await {
//!         if let StreamPart::TextDelta { delta, .. } = part? {
//!             print!("{delta}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod providers;
pub mod stream;
pub mod telemetry;
pub mod traits;
pub mod types;
pub mod urls;
pub mod version;

// Re-export main types at crate root
pub use error::{HuginnError, ModelType, Result};
pub use traits::{EmbeddingModel, ImageModel, LanguageModel, Provider, SPECIFICATION_VERSION};

pub use cache::{CacheConfig, CachingEmbeddingModel, EmbeddingCache};
pub use config::Config;
pub use providers::{OpenAiCompatibleProvider, ProviderRegistry, RetryConfig};
pub use stream::{CollectedStream, collect_stream};
pub use urls::{SupportedUrls, is_url_supported};

// Re-export all types
pub use types::{
    AssistantContent, CallOptions, CallWarning, Content, ContentPart, EmbedOptions, EmbedResult,
    Embedding, EmbeddingUsage, FileData, FilePart, FinishReason, FunctionTool, GenerateResult,
    GeneratedFile, ImageOptions, ImageResult, Message, PartKind, PartStream, Prompt,
    ProviderDefinedTool, ProviderMetadata, ProviderOptions, ReasoningPart, RequestInfo,
    ResponseFormat, ResponseInfo, ResponseMetadata, Role, Source, StreamPart, StreamResponseInfo,
    StreamResult, TextPart, Tool, ToolCall, ToolCallPart, ToolChoice, ToolResult,
    ToolResultContent, ToolResultOutput, ToolResultPart, Usage, UserContent,
};
