//! Folding a part stream into a complete result.

use futures_util::StreamExt;

use crate::Result;
use crate::types::{
    CallWarning, Content, FinishReason, GenerateResult, GeneratedFile, PartStream,
    ProviderMetadata, ResponseInfo, ResponseMetadata, Source, StreamPart, ToolCall, Usage,
};

/// Everything a stream produced, accumulated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedStream {
    pub text: String,
    pub reasoning: String,
    pub tool_calls: Vec<ToolCall>,
    pub files: Vec<GeneratedFile>,
    pub sources: Vec<Source>,
    pub usage: Usage,
    pub finish_reason: FinishReason,
    pub provider_metadata: Option<ProviderMetadata>,
    pub response: ResponseMetadata,
    pub warnings: Vec<CallWarning>,
    /// In-band `error` parts. The stream kept going after these.
    pub errors: Vec<String>,
    pub finished: bool,
}

impl CollectedStream {
    fn push(&mut self, part: StreamPart) {
        match part {
            StreamPart::StreamStart { warnings } => self.warnings.extend(warnings),
            StreamPart::ResponseMetadata(metadata) => {
                self.response = ResponseMetadata {
                    id: metadata.id.or(self.response.id.take()),
                    model_id: metadata.model_id.or(self.response.model_id.take()),
                    timestamp: metadata.timestamp.or(self.response.timestamp),
                };
            }
            StreamPart::TextDelta { delta, .. } => self.text.push_str(&delta),
            StreamPart::ReasoningDelta { delta, .. } => self.reasoning.push_str(&delta),
            StreamPart::ToolCall(call) => self.tool_calls.push(call),
            StreamPart::File(file) => self.files.push(file),
            StreamPart::Source(source) => self.sources.push(source),
            StreamPart::Error { error } => self.errors.push(error),
            StreamPart::Finish {
                usage,
                finish_reason,
                provider_metadata,
            } => {
                self.usage = usage;
                self.finish_reason = finish_reason;
                self.provider_metadata = provider_metadata;
                self.finished = true;
            }
            // Block markers, tool input deltas and raw chunks carry nothing
            // that is not repeated in the parts above.
            _ => {}
        }
    }

    /// Shape the collected parts like a `do_generate` result.
    pub fn into_generate_result(self) -> GenerateResult {
        let mut content = Vec::new();
        if !self.reasoning.is_empty() {
            content.push(Content::reasoning(self.reasoning));
        }
        if !self.text.is_empty() {
            content.push(Content::text(self.text));
        }
        content.extend(self.sources.into_iter().map(Content::Source));
        content.extend(self.files.into_iter().map(Content::File));
        content.extend(self.tool_calls.into_iter().map(Content::ToolCall));

        GenerateResult {
            content,
            finish_reason: self.finish_reason,
            usage: self.usage,
            provider_metadata: self.provider_metadata,
            response: ResponseInfo {
                metadata: self.response,
                ..Default::default()
            },
            warnings: self.warnings,
            ..Default::default()
        }
    }
}

/// Drain a stream, accumulating its parts.
///
/// Returns the first `Err` item as an error. In-band `error` parts are
/// collected instead.
pub async fn collect_stream(mut stream: PartStream) -> Result<CollectedStream> {
    let mut collected = CollectedStream::default();
    while let Some(part) = stream.next().await {
        collected.push(part?);
    }
    Ok(collected)
}
