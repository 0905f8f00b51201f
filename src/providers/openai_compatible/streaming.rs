//! SSE chunk → stream part transformation.

use std::collections::{BTreeMap, VecDeque};

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt, stream};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::response::{UsageWire, map_finish_reason, response_metadata};
use crate::types::{
    CallWarning, FinishReason, PartStream, ProviderMetadata, StreamPart, ToolCall, Usage,
};
use crate::{HuginnError, Result};

const TEXT_ID: &str = "txt-0";
const REASONING_ID: &str = "reasoning-0";

#[derive(Debug, Deserialize)]
struct Chunk {
    id: Option<String>,
    model: Option<String>,
    created: Option<i64>,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<UsageWire>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<Delta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
    reasoning_content: Option<String>,
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: Option<usize>,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
    finished: bool,
}

impl PendingToolCall {
    /// Emit end + call once the accumulated arguments are valid JSON.
    fn try_complete(&mut self, out: &mut Vec<StreamPart>) {
        if !self.finished && serde_json::from_str::<Value>(&self.arguments).is_ok() {
            self.finished = true;
            out.push(StreamPart::ToolInputEnd {
                id: self.id.clone(),
            });
            out.push(StreamPart::ToolCall(ToolCall::new(
                &self.id,
                &self.name,
                &self.arguments,
            )));
        }
    }
}

/// Incremental state of one streamed chat completion.
///
/// Feed it the `data` of each SSE event with [`transform`](Self::transform)
/// and call [`flush`](Self::flush) once the event stream ends.
#[derive(Debug)]
pub struct ChunkTransformer {
    provider_name: String,
    include_raw_chunks: bool,
    seen_first_chunk: bool,
    finish_reason: FinishReason,
    usage: Usage,
    provider_metadata: Option<ProviderMetadata>,
    text_open: bool,
    reasoning_open: bool,
    tool_calls: BTreeMap<usize, PendingToolCall>,
}

impl ChunkTransformer {
    pub fn new(provider_name: impl Into<String>, include_raw_chunks: bool) -> Self {
        Self {
            provider_name: provider_name.into(),
            include_raw_chunks,
            seen_first_chunk: false,
            finish_reason: FinishReason::Unknown,
            usage: Usage::default(),
            provider_metadata: None,
            text_open: false,
            reasoning_open: false,
            tool_calls: BTreeMap::new(),
        }
    }

    /// The opening part of every stream.
    pub fn start(&self, warnings: Vec<CallWarning>) -> StreamPart {
        StreamPart::StreamStart { warnings }
    }

    /// Record a failure that ends the stream early.
    pub fn fail(&mut self, error: impl std::fmt::Display) -> StreamPart {
        self.finish_reason = FinishReason::Error;
        StreamPart::error(error)
    }

    /// Process the data of one SSE event.
    pub fn transform(&mut self, data: &str) -> Vec<StreamPart> {
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            return Vec::new();
        }

        let mut out = Vec::new();
        let raw: Value = match serde_json::from_str(data) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "malformed stream chunk");
                out.push(self.fail(HuginnError::InvalidResponse(format!(
                    "malformed stream chunk: {e}"
                ))));
                return out;
            }
        };
        if self.include_raw_chunks {
            out.push(StreamPart::Raw {
                raw_value: raw.clone(),
            });
        }

        if let Some(error) = raw.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            out.push(self.fail(message));
            return out;
        }

        let chunk: Chunk = match serde_json::from_value(raw) {
            Ok(chunk) => chunk,
            Err(e) => {
                out.push(self.fail(HuginnError::InvalidResponse(e.to_string())));
                return out;
            }
        };

        if !self.seen_first_chunk {
            self.seen_first_chunk = true;
            out.push(StreamPart::ResponseMetadata(response_metadata(
                chunk.id,
                chunk.model,
                chunk.created,
            )));
        }

        if let Some(usage) = &chunk.usage {
            self.usage = usage.to_usage();
            self.provider_metadata = usage.provider_metadata(&self.provider_name);
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return out;
        };
        if let Some(reason) = choice.finish_reason.as_deref() {
            self.finish_reason = map_finish_reason(Some(reason));
        }
        let Some(delta) = choice.delta else {
            return out;
        };

        if let Some(reasoning) = delta
            .reasoning_content
            .or(delta.reasoning)
            .filter(|r| !r.is_empty())
        {
            if !self.reasoning_open {
                self.reasoning_open = true;
                out.push(StreamPart::ReasoningStart {
                    id: REASONING_ID.into(),
                });
            }
            out.push(StreamPart::ReasoningDelta {
                id: REASONING_ID.into(),
                delta: reasoning,
            });
        }

        if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
            if !self.text_open {
                self.text_open = true;
                out.push(StreamPart::TextStart { id: TEXT_ID.into() });
            }
            out.push(StreamPart::TextDelta {
                id: TEXT_ID.into(),
                delta: text,
            });
        }

        for (position, tool_delta) in delta.tool_calls.into_iter().enumerate() {
            self.tool_call_delta(tool_delta, position, &mut out);
        }

        out
    }

    fn tool_call_delta(&mut self, delta: ToolCallDelta, position: usize, out: &mut Vec<StreamPart>) {
        let index = delta.index.unwrap_or(position);
        let function = delta.function.unwrap_or_default();

        if let Some(call) = self.tool_calls.get_mut(&index) {
            if call.finished {
                return;
            }
            if let Some(fragment) = function.arguments.filter(|a| !a.is_empty()) {
                call.arguments.push_str(&fragment);
                out.push(StreamPart::ToolInputDelta {
                    id: call.id.clone(),
                    delta: fragment,
                });
            }
            call.try_complete(out);
            return;
        }

        let Some(id) = delta.id else {
            out.push(self.fail(HuginnError::InvalidResponse(format!(
                "tool call delta at index {index} is missing an id"
            ))));
            return;
        };
        let Some(name) = function.name else {
            out.push(self.fail(HuginnError::InvalidResponse(format!(
                "tool call delta at index {index} is missing a function name"
            ))));
            return;
        };

        out.push(StreamPart::ToolInputStart {
            id: id.clone(),
            tool_name: name.clone(),
        });
        let arguments = function.arguments.unwrap_or_default();
        if !arguments.is_empty() {
            out.push(StreamPart::ToolInputDelta {
                id: id.clone(),
                delta: arguments.clone(),
            });
        }
        let mut call = PendingToolCall {
            id,
            name,
            arguments,
            finished: false,
        };
        // Some vendors send a complete call in a single chunk.
        call.try_complete(out);
        self.tool_calls.insert(index, call);
    }

    /// Close open blocks, emit unfinished tool calls and the final `finish`.
    pub fn flush(&mut self) -> Vec<StreamPart> {
        let mut out = Vec::new();
        if self.reasoning_open {
            self.reasoning_open = false;
            out.push(StreamPart::ReasoningEnd {
                id: REASONING_ID.into(),
            });
        }
        if self.text_open {
            self.text_open = false;
            out.push(StreamPart::TextEnd { id: TEXT_ID.into() });
        }
        for call in self.tool_calls.values_mut().filter(|c| !c.finished) {
            call.finished = true;
            if call.arguments.is_empty() {
                call.arguments.push_str("{}");
            }
            out.push(StreamPart::ToolInputEnd {
                id: call.id.clone(),
            });
            out.push(StreamPart::ToolCall(ToolCall::new(
                &call.id,
                &call.name,
                &call.arguments,
            )));
        }
        out.push(StreamPart::Finish {
            usage: self.usage,
            finish_reason: self.finish_reason,
            provider_metadata: self.provider_metadata.take(),
        });
        out
    }
}

struct StreamState<S> {
    events: S,
    transformer: ChunkTransformer,
    pending: VecDeque<Result<StreamPart>>,
    abort: Option<CancellationToken>,
    done: bool,
}

/// Turn a byte stream of SSE into a part stream.
///
/// The abort token is raced against every event. Firing it yields an error
/// part followed by `finish` with reason `error`. A transport failure ends
/// the stream with an `Err` item.
pub(crate) fn into_part_stream<B, E>(
    bytes: impl Stream<Item = std::result::Result<B, E>> + Send + 'static,
    transformer: ChunkTransformer,
    warnings: Vec<CallWarning>,
    abort: Option<CancellationToken>,
) -> PartStream
where
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let mut pending = VecDeque::new();
    pending.push_back(Ok(transformer.start(warnings)));
    let state = StreamState {
        events: Box::pin(bytes.eventsource()),
        transformer,
        pending,
        abort,
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }

            let next = match &state.abort {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => {
                        debug!("stream aborted by caller");
                        let error = state.transformer.fail(HuginnError::Aborted);
                        state.pending.push_back(Ok(error));
                        state.pending.extend(state.transformer.flush().into_iter().map(Ok));
                        state.done = true;
                        continue;
                    }
                    next = state.events.next() => next,
                },
                None => state.events.next().await,
            };

            match next {
                Some(Ok(event)) => state
                    .pending
                    .extend(state.transformer.transform(&event.data).into_iter().map(Ok)),
                Some(Err(e)) => {
                    warn!(error = %e, "stream transport failed");
                    state.pending.push_back(Err(HuginnError::Stream(e.to_string())));
                    state.done = true;
                }
                None => {
                    state
                        .pending
                        .extend(state.transformer.flush().into_iter().map(Ok));
                    state.done = true;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(chunks: &[&str]) -> Vec<StreamPart> {
        let mut t = ChunkTransformer::new("acme", false);
        let mut parts: Vec<StreamPart> = chunks.iter().flat_map(|c| t.transform(c)).collect();
        parts.extend(t.flush());
        parts
    }

    #[test]
    fn text_deltas_share_one_block() {
        let parts = run(&[
            r#"{"id":"c1","model":"m","choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"{"choices":[{"delta":{"content":"lo"},"finish_reason":"stop"}]}"#,
            "[DONE]",
        ]);
        assert!(matches!(parts[0], StreamPart::ResponseMetadata(_)));
        assert_eq!(parts[1], StreamPart::TextStart { id: "txt-0".into() });
        let text: String = parts.iter().filter_map(StreamPart::as_text_delta).collect();
        assert_eq!(text, "Hello");
        assert_eq!(parts[parts.len() - 2], StreamPart::TextEnd { id: "txt-0".into() });
        assert!(matches!(
            parts.last(),
            Some(StreamPart::Finish {
                finish_reason: FinishReason::Stop,
                ..
            })
        ));
    }

    #[test]
    fn tool_call_completes_as_soon_as_arguments_parse() {
        let parts = run(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"weather","arguments":"{\"ci"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"ty\":\"Oslo\"}"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"ignored"}}]}}]}"#,
        ]);
        let calls: Vec<&ToolCall> = parts
            .iter()
            .filter_map(|p| match p {
                StreamPart::ToolCall(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].input, r#"{"city":"Oslo"}"#);
        let deltas = parts
            .iter()
            .filter(|p| matches!(p, StreamPart::ToolInputDelta { .. }))
            .count();
        assert_eq!(deltas, 2);
    }

    #[test]
    fn new_tool_call_without_id_is_an_error() {
        let parts = run(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"weather"}}]}}]}"#,
        ]);
        assert!(parts.iter().any(|p| matches!(p, StreamPart::Error { .. })));
        assert!(matches!(
            parts.last(),
            Some(StreamPart::Finish {
                finish_reason: FinishReason::Error,
                ..
            })
        ));
    }

    #[test]
    fn unfinished_tool_call_is_flushed_with_empty_object() {
        let parts = run(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"now"}}]}}]}"#,
        ]);
        assert!(parts.contains(&StreamPart::ToolCall(ToolCall::new("call_1", "now", "{}"))));
    }

    #[test]
    fn malformed_chunk_sets_error_and_continues() {
        let parts = run(&[
            "{not json",
            r#"{"choices":[{"delta":{"content":"ok"}}]}"#,
        ]);
        assert!(matches!(parts[0], StreamPart::Error { .. }));
        assert!(parts.iter().any(|p| p.as_text_delta() == Some("ok")));
    }

    #[test]
    fn usage_from_last_chunk_carrying_it() {
        let parts = run(&[
            r#"{"choices":[{"delta":{"content":"a"}}],"usage":{"prompt_tokens":1,"completion_tokens":1}}"#,
            r#"{"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":7,"total_tokens":12}}"#,
        ]);
        match parts.last() {
            Some(StreamPart::Finish { usage, .. }) => {
                assert_eq!(usage.input_tokens, Some(5));
                assert_eq!(usage.total_tokens, Some(12));
            }
            other => panic!("expected finish, got {other:?}"),
        }
    }

    #[test]
    fn raw_chunks_are_emitted_when_requested() {
        let mut t = ChunkTransformer::new("acme", true);
        let parts = t.transform(r#"{"choices":[]}"#);
        assert!(matches!(parts[0], StreamPart::Raw { .. }));
    }
}
