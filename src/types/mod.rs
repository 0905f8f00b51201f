//! Public types for the Huginn API.

use std::collections::BTreeMap;

mod content;
mod embedding;
mod image;
mod options;
mod prompt;
mod response;
mod stream;
mod usage;
mod warning;

pub use content::{
    Content, ContentPart, FileData, FilePart, GeneratedFile, PartKind, ReasoningPart, Source,
    TextPart, ToolCall, ToolCallPart, ToolResult, ToolResultContent, ToolResultOutput,
    ToolResultPart,
};
pub use embedding::{EmbedOptions, EmbedResult, Embedding, EmbeddingUsage};
pub use image::{ImageOptions, ImageResult};
pub use options::{
    CallOptions, FunctionTool, ProviderDefinedTool, ResponseFormat, Tool, ToolChoice,
};
pub use prompt::{AssistantContent, Message, Prompt, Role, UserContent};
pub use response::{
    FinishReason, GenerateResult, PartStream, RequestInfo, ResponseInfo, ResponseMetadata,
    StreamResponseInfo, StreamResult,
};
pub use stream::StreamPart;
pub use usage::Usage;
pub use warning::CallWarning;

/// Provider-specific input options, keyed by provider id.
pub type ProviderOptions = BTreeMap<String, serde_json::Map<String, serde_json::Value>>;

/// Provider-specific output metadata, keyed by provider id.
pub type ProviderMetadata = BTreeMap<String, serde_json::Map<String, serde_json::Value>>;
