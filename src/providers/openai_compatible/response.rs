//! Chat completion response → normalized result.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::types::{
    Content, FinishReason, GenerateResult, ProviderMetadata, ResponseMetadata, ToolCall, Usage,
};
use crate::{HuginnError, Result};

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    pub id: Option<String>,
    pub model: Option<String>,
    pub created: Option<i64>,
    pub choices: Vec<Choice>,
    pub usage: Option<UsageWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ResponseMessage {
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    pub reasoning: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolCallWire {
    pub id: Option<String>,
    pub function: FunctionWire,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FunctionWire {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct UsageWire {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    pub completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct PromptTokensDetails {
    pub cached_tokens: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct CompletionTokensDetails {
    pub reasoning_tokens: Option<u64>,
    pub accepted_prediction_tokens: Option<u64>,
    pub rejected_prediction_tokens: Option<u64>,
}

impl UsageWire {
    pub fn to_usage(&self) -> Usage {
        Usage {
            input_tokens: self.prompt_tokens,
            output_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
            reasoning_tokens: self
                .completion_tokens_details
                .as_ref()
                .and_then(|d| d.reasoning_tokens),
            cached_input_tokens: self
                .prompt_tokens_details
                .as_ref()
                .and_then(|d| d.cached_tokens),
        }
    }

    /// Prediction token counts, keyed under the provider name.
    pub fn provider_metadata(&self, provider_name: &str) -> Option<ProviderMetadata> {
        let details = self.completion_tokens_details.as_ref()?;
        let mut fields = Map::new();
        if let Some(n) = details.accepted_prediction_tokens {
            fields.insert("accepted_prediction_tokens".into(), json!(n));
        }
        if let Some(n) = details.rejected_prediction_tokens {
            fields.insert("rejected_prediction_tokens".into(), json!(n));
        }
        (!fields.is_empty()).then(|| ProviderMetadata::from([(provider_name.to_string(), fields)]))
    }
}

/// Map a vendor `finish_reason` string.
pub fn map_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        Some("function_call" | "tool_calls") => FinishReason::ToolCalls,
        Some(_) => FinishReason::Other,
        None => FinishReason::Unknown,
    }
}

pub(crate) fn response_metadata(
    id: Option<String>,
    model: Option<String>,
    created: Option<i64>,
) -> ResponseMetadata {
    ResponseMetadata {
        id,
        model_id: model,
        timestamp: created.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
    }
}

/// Map a raw `/chat/completions` body into a [`GenerateResult`].
///
/// Fails with [`HuginnError::InvalidResponse`] when the body does not have
/// the chat completion shape or has no choices.
pub fn map_response(raw: &Value, provider_name: &str) -> Result<GenerateResult> {
    let response: ChatCompletionResponse = serde_json::from_value(raw.clone())
        .map_err(|e| HuginnError::InvalidResponse(e.to_string()))?;
    map_parsed_response(response, provider_name)
}

pub(crate) fn map_parsed_response(
    response: ChatCompletionResponse,
    provider_name: &str,
) -> Result<GenerateResult> {
    let ChatCompletionResponse {
        id,
        model,
        created,
        choices,
        usage,
    } = response;
    let choice = choices
        .into_iter()
        .next()
        .ok_or_else(|| HuginnError::InvalidResponse("response has no choices".into()))?;

    let mut content = Vec::new();
    let message = choice.message;
    if let Some(reasoning) = message
        .reasoning_content
        .or(message.reasoning)
        .filter(|r| !r.is_empty())
    {
        content.push(Content::reasoning(reasoning));
    }
    if let Some(text) = message.content.filter(|t| !t.is_empty()) {
        content.push(Content::text(text));
    }
    for call in message.tool_calls {
        content.push(Content::ToolCall(ToolCall::new(
            call.id.unwrap_or_default(),
            call.function.name,
            call.function.arguments.unwrap_or_default(),
        )));
    }

    let usage_wire = usage.unwrap_or_default();
    Ok(GenerateResult {
        content,
        finish_reason: map_finish_reason(choice.finish_reason.as_deref()),
        usage: usage_wire.to_usage(),
        provider_metadata: usage_wire.provider_metadata(provider_name),
        response: crate::types::ResponseInfo {
            metadata: response_metadata(id, model, created),
            ..Default::default()
        },
        ..Default::default()
    })
}
