//! Content parts: the units of multimodal message content.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use super::ProviderOptions;
use super::ProviderMetadata;

/// A plain text part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_options: Option<ProviderOptions>,
}

impl TextPart {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            provider_options: None,
        }
    }
}

/// File payload: inline bytes, a base64 string, or a reference URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FileData {
    Bytes(Vec<u8>),
    Base64(String),
    Url(String),
}

impl FileData {
    /// Inline data as base64. `None` for URL references.
    pub fn to_base64(&self) -> Option<String> {
        match self {
            FileData::Bytes(bytes) => Some(BASE64.encode(bytes)),
            FileData::Base64(data) => Some(data.clone()),
            FileData::Url(_) => None,
        }
    }

    /// The referenced URL, if this is not inline data.
    pub fn as_url(&self) -> Option<&str> {
        match self {
            FileData::Url(url) => Some(url),
            _ => None,
        }
    }
}

/// A file part (image, pdf, audio, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePart {
    /// IANA media type. May be a wildcard such as `image/*`.
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub data: FileData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_options: Option<ProviderOptions>,
}

impl FilePart {
    pub fn new(media_type: impl Into<String>, data: FileData) -> Self {
        Self {
            media_type: media_type.into(),
            filename: None,
            data,
            provider_options: None,
        }
    }

    pub fn url(media_type: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(media_type, FileData::Url(url.into()))
    }

    pub fn bytes(media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::new(media_type, FileData::Bytes(bytes))
    }

    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// Reasoning text produced by a thinking model and fed back in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningPart {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_options: Option<ProviderOptions>,
}

impl ReasoningPart {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            provider_options: None,
        }
    }
}

/// A tool call in prompt history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPart {
    pub tool_call_id: String,
    pub tool_name: String,
    /// Tool arguments as JSON.
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_executed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_options: Option<ProviderOptions>,
}

impl ToolCallPart {
    pub fn new(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            input,
            provider_executed: None,
            provider_options: None,
        }
    }
}

/// Output of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum ToolResultOutput {
    Text(String),
    Json(serde_json::Value),
    ErrorText(String),
    ErrorJson(serde_json::Value),
    Content(Vec<ToolResultContent>),
}

impl ToolResultOutput {
    /// Render the output as the string a text-only vendor expects.
    pub fn to_text(&self) -> String {
        match self {
            ToolResultOutput::Text(text) | ToolResultOutput::ErrorText(text) => text.clone(),
            ToolResultOutput::Json(value) | ToolResultOutput::ErrorJson(value) => {
                value.to_string()
            }
            ToolResultOutput::Content(items) => {
                serde_json::to_string(items).unwrap_or_default()
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ToolResultOutput::ErrorText(_) | ToolResultOutput::ErrorJson(_)
        )
    }
}

/// One item of a multi-part tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ToolResultContent {
    Text { text: String },
    /// Base64 media.
    Media { data: String, media_type: String },
}

/// The result of a tool call, sent back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultPart {
    pub tool_call_id: String,
    pub tool_name: String,
    pub output: ToolResultOutput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_options: Option<ProviderOptions>,
}

impl ToolResultPart {
    pub fn new(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: ToolResultOutput,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            output,
            provider_options: None,
        }
    }
}

/// A source the model cited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source_type", rename_all = "kebab-case")]
pub enum Source {
    Url {
        id: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
    Document {
        id: String,
        media_type: String,
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
}

/// Kind tag of a [`ContentPart`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    Text,
    File,
    Reasoning,
    ToolCall,
    ToolResult,
    Source,
}

impl std::fmt::Display for PartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PartKind::Text => "text",
            PartKind::File => "file",
            PartKind::Reasoning => "reasoning",
            PartKind::ToolCall => "tool-call",
            PartKind::ToolResult => "tool-result",
            PartKind::Source => "source",
        })
    }
}

/// Any content part, regardless of which role may carry it.
///
/// Messages store role-specific part enums; this union is the loose form
/// accepted by [`Message::from_parts`](super::Message::from_parts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ContentPart {
    Text(TextPart),
    File(FilePart),
    Reasoning(ReasoningPart),
    ToolCall(ToolCallPart),
    ToolResult(ToolResultPart),
    Source(Source),
}

impl ContentPart {
    pub fn kind(&self) -> PartKind {
        match self {
            ContentPart::Text(_) => PartKind::Text,
            ContentPart::File(_) => PartKind::File,
            ContentPart::Reasoning(_) => PartKind::Reasoning,
            ContentPart::ToolCall(_) => PartKind::ToolCall,
            ContentPart::ToolResult(_) => PartKind::ToolResult,
            ContentPart::Source(_) => PartKind::Source,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text(TextPart::new(text))
    }
}

// ============================================================================
// Generated content
// ============================================================================

/// A tool call produced by the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    /// Arguments as a JSON string, exactly as the model produced them.
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_executed: Option<bool>,
}

impl ToolCall {
    pub fn new(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            input: input.into(),
            provider_executed: None,
        }
    }

    /// Parse the arguments as JSON
    pub fn parse_input<T: serde::de::DeserializeOwned>(
        &self,
    ) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_str(&self.input)
    }
}

/// A result of a provider-executed tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub result: serde_json::Value,
    #[serde(default)]
    pub is_error: bool,
}

/// A file produced by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub media_type: String,
    pub data: FileData,
}

/// Content returned from a non-streaming generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Content {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
    Reasoning {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
    File(GeneratedFile),
    Source(Source),
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text {
            text: text.into(),
            provider_metadata: None,
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Content::Reasoning {
            text: text.into(),
            provider_metadata: None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}
