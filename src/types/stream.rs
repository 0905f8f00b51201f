//! Stream parts emitted by `do_stream`.

use serde::{Deserialize, Serialize};

use super::ProviderMetadata;
use super::content::{GeneratedFile, Source, ToolCall, ToolResult};
use super::response::{FinishReason, ResponseMetadata};
use super::usage::Usage;
use super::warning::CallWarning;

/// One event of a generation stream.
///
/// `StreamStart` precedes every other part and `Finish` is the last one.
/// Text and reasoning arrive in blocks (`*Start`, `*Delta`..., `*End`)
/// identified by `id`; tool input is streamed the same way and followed by
/// a complete `ToolCall`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamPart {
    // Lifecycle
    StreamStart {
        #[serde(default)]
        warnings: Vec<CallWarning>,
    },
    ResponseMetadata(ResponseMetadata),
    Finish {
        usage: Usage,
        finish_reason: FinishReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
    Error {
        error: String,
    },

    // Content
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    ReasoningStart {
        id: String,
    },
    ReasoningDelta {
        id: String,
        delta: String,
    },
    ReasoningEnd {
        id: String,
    },
    ToolInputStart {
        id: String,
        tool_name: String,
    },
    ToolInputDelta {
        id: String,
        delta: String,
    },
    ToolInputEnd {
        id: String,
    },
    ToolCall(ToolCall),
    ToolResult(ToolResult),
    File(GeneratedFile),
    Source(Source),

    /// Unprocessed vendor chunk.
    Raw {
        raw_value: serde_json::Value,
    },
}

impl StreamPart {
    pub fn error(error: impl std::fmt::Display) -> Self {
        StreamPart::Error {
            error: error.to_string(),
        }
    }

    /// Stream start, response metadata, finish and error.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            StreamPart::StreamStart { .. }
                | StreamPart::ResponseMetadata(_)
                | StreamPart::Finish { .. }
                | StreamPart::Error { .. }
        )
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, StreamPart::Finish { .. })
    }

    /// Incremental text, if this is a text delta.
    pub fn as_text_delta(&self) -> Option<&str> {
        match self {
            StreamPart::TextDelta { delta, .. } => Some(delta),
            _ => None,
        }
    }
}
