//! End-to-end tests for the OpenAI-compatible adapter against a mock server.

use std::time::Duration;

use futures_util::StreamExt;
use huginn::providers::OpenAiCompatibleProvider;
use huginn::stream::collect_stream;
use huginn::{
    CallOptions, EmbedOptions, EmbeddingModel, FinishReason, HuginnError, ImageModel,
    ImageOptions, LanguageModel, Message, ResponseFormat, StreamPart, Tool,
};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> OpenAiCompatibleProvider {
    OpenAiCompatibleProvider::builder("acme", server.uri())
        .api_key("sk-test")
        .build()
        .unwrap()
}

fn completion_body() -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "acme-large",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": "Paris." },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
    })
}

fn sse(events: &[serde_json::Value]) -> String {
    let mut body: String = events.iter().map(|e| format!("data: {e}\n\n")).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

// ============================================================================
// Generate
// ============================================================================

#[tokio::test]
async fn generate_maps_request_and_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "acme-large",
            "messages": [
                { "role": "system", "content": "Be brief." },
                { "role": "user", "content": "Capital of France?" }
            ],
            "temperature": 0.5,
            "max_tokens": 64
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-request-id", "req-42")
                .set_body_json(completion_body()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let model = provider(&server).chat_model("acme-large");
    let options = CallOptions::new(vec![
        Message::system("Be brief."),
        Message::user("Capital of France?"),
    ])
    .temperature(0.5)
    .max_output_tokens(64);

    let result = model.do_generate(&options).await.unwrap();

    assert_eq!(result.text(), "Paris.");
    assert_eq!(result.finish_reason, FinishReason::Stop);
    assert_eq!(result.usage.input_tokens, Some(12));
    assert_eq!(result.usage.output_tokens, Some(3));
    assert_eq!(result.response.metadata.id.as_deref(), Some("chatcmpl-1"));
    assert_eq!(result.response.metadata.model_id.as_deref(), Some("acme-large"));
    assert!(result.response.metadata.timestamp.is_some());
    assert_eq!(
        result.response.headers.get("x-request-id").map(String::as_str),
        Some("req-42")
    );
    assert_eq!(result.request.body.as_ref().unwrap()["model"], "acme-large");
    assert!(result.response.body.is_some());
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn generate_returns_tool_calls_and_warnings() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "tools": [{ "type": "function", "function": { "name": "weather" } }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-2",
            "model": "acme-large",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "weather", "arguments": "{\"city\":\"Oslo\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .mount(&server)
        .await;

    let model = provider(&server).chat_model("acme-large");
    let options = CallOptions::new(vec![Message::user("Weather in Oslo?")])
        .top_k(5)
        .tool(Tool::function(
            "weather",
            "Current weather",
            json!({ "type": "object", "properties": { "city": { "type": "string" } } }),
        ));

    let result = model.do_generate(&options).await.unwrap();

    assert_eq!(result.finish_reason, FinishReason::ToolCalls);
    let calls = result.tool_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].tool_call_id, "call_1");
    assert_eq!(calls[0].tool_name, "weather");
    assert_eq!(calls[0].input, r#"{"city":"Oslo"}"#);
    assert_eq!(result.warnings.len(), 1);
}

#[tokio::test]
async fn json_schema_is_sent_when_structured_outputs_are_supported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "response_format": {
                "type": "json_schema",
                "json_schema": { "name": "answer", "schema": { "type": "object" } }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiCompatibleProvider::builder("acme", server.uri())
        .supports_structured_outputs(true)
        .build()
        .unwrap();
    let options = CallOptions::new(vec![Message::user("Answer as JSON")]).response_format(
        ResponseFormat::Json {
            schema: Some(json!({ "type": "object" })),
            name: Some("answer".into()),
            description: None,
        },
    );

    let result = provider
        .chat_model("acme-large")
        .do_generate(&options)
        .await
        .unwrap();
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn custom_headers_and_query_params_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(query_param("api-version", "2024-10-21"))
        .and(header("x-team", "search"))
        .and(header("x-call", "one"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiCompatibleProvider::builder("acme", server.uri())
        .header("X-Team", "search")
        .query_param("api-version", "2024-10-21")
        .build()
        .unwrap();
    let options = CallOptions::new(vec![Message::user("hi")]).header("x-call", "one");

    provider
        .chat_model("acme-large")
        .do_generate(&options)
        .await
        .unwrap();
}

#[tokio::test]
async fn provider_options_are_merged_into_the_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "user": "u-7", "logprobs": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .expect(1)
        .mount(&server)
        .await;

    let options = CallOptions::new(vec![Message::user("hi")]).provider_options(
        [(
            "acme".to_string(),
            json!({ "user": "u-7", "logprobs": true })
                .as_object()
                .unwrap()
                .clone(),
        )]
        .into(),
    );

    provider(&server)
        .chat_model("acme-large")
        .do_generate(&options)
        .await
        .unwrap();
}

// ============================================================================
// Error mapping
// ============================================================================

#[tokio::test]
async fn unauthorized_maps_to_authentication_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "invalid key" }
        })))
        .mount(&server)
        .await;

    let err = provider(&server)
        .chat_model("acme-large")
        .do_generate(&CallOptions::new(vec![Message::user("hi")]))
        .await
        .unwrap_err();
    assert!(matches!(err, HuginnError::AuthenticationFailed));
}

#[tokio::test]
async fn too_many_requests_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let err = provider(&server)
        .chat_model("acme-large")
        .do_generate(&CallOptions::new(vec![Message::user("hi")]))
        .await
        .unwrap_err();
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn server_error_maps_to_retryable_api_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": { "message": "overloaded" }
        })))
        .mount(&server)
        .await;

    let err = provider(&server)
        .chat_model("acme-large")
        .do_generate(&CallOptions::new(vec![Message::user("hi")]))
        .await
        .unwrap_err();
    match err {
        HuginnError::ApiCall {
            status,
            message,
            is_retryable,
            response_body,
            ..
        } => {
            assert_eq!(status, 503);
            assert_eq!(message, "overloaded");
            assert!(is_retryable);
            assert!(response_body.unwrap().contains("overloaded"));
        }
        other => panic!("expected ApiCall, got {other:?}"),
    }
}

#[tokio::test]
async fn bad_request_is_not_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad input"))
        .mount(&server)
        .await;

    let err = provider(&server)
        .chat_model("acme-large")
        .do_generate(&CallOptions::new(vec![Message::user("hi")]))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn malformed_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let err = provider(&server)
        .chat_model("acme-large")
        .do_generate(&CallOptions::new(vec![Message::user("hi")]))
        .await
        .unwrap_err();
    assert!(matches!(err, HuginnError::InvalidResponse(_)));
}

#[tokio::test]
async fn abort_cancels_in_flight_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body())
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let options = CallOptions::new(vec![Message::user("hi")]).abort(token);
    let err = provider(&server)
        .chat_model("acme-large")
        .do_generate(&options)
        .await
        .unwrap_err();
    assert!(matches!(err, HuginnError::Aborted));
}

#[tokio::test]
async fn already_aborted_call_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .expect(0)
        .mount(&server)
        .await;

    let token = CancellationToken::new();
    token.cancel();
    let options = CallOptions::new(vec![Message::user("hi")]).abort(token);
    let err = provider(&server)
        .chat_model("acme-large")
        .do_stream(&options)
        .await
        .unwrap_err();
    assert!(matches!(err, HuginnError::Aborted));
}

// ============================================================================
// Streaming
// ============================================================================

#[tokio::test]
async fn stream_yields_ordered_parts() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({"id":"chatcmpl-9","model":"acme-large","created":1_700_000_000,
               "choices":[{"delta":{"role":"assistant","content":"Hel"}}]}),
        json!({"choices":[{"delta":{"content":"lo"}}]}),
        json!({"choices":[{"delta":{},"finish_reason":"stop"}]}),
        json!({"choices":[],"usage":{"prompt_tokens":4,"completion_tokens":2,"total_tokens":6}}),
    ]);
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "stream": true,
            "stream_options": { "include_usage": true }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiCompatibleProvider::builder("acme", server.uri())
        .include_usage(true)
        .build()
        .unwrap();
    let result = provider
        .chat_model("acme-large")
        .do_stream(&CallOptions::new(vec![Message::user("hi")]))
        .await
        .unwrap();
    assert_eq!(result.request.body.as_ref().unwrap()["stream"], true);

    let parts: Vec<StreamPart> = result.stream.map(|p| p.unwrap()).collect().await;

    assert!(matches!(parts[0], StreamPart::StreamStart { .. }));
    assert!(matches!(parts[1], StreamPart::ResponseMetadata(_)));
    assert_eq!(parts[2], StreamPart::TextStart { id: "txt-0".into() });
    let text: String = parts.iter().filter_map(StreamPart::as_text_delta).collect();
    assert_eq!(text, "Hello");
    assert_eq!(parts[parts.len() - 2], StreamPart::TextEnd { id: "txt-0".into() });
    match parts.last() {
        Some(StreamPart::Finish {
            usage,
            finish_reason,
            ..
        }) => {
            assert_eq!(*finish_reason, FinishReason::Stop);
            assert_eq!(usage.total_tokens, Some(6));
        }
        other => panic!("expected finish, got {other:?}"),
    }
    assert_eq!(parts.iter().filter(|p| p.is_finish()).count(), 1);
}

#[tokio::test]
async fn stream_assembles_tool_call_from_fragments() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({"id":"c","choices":[{"delta":{"tool_calls":[
            {"index":0,"id":"call_1","type":"function","function":{"name":"weather","arguments":""}}
        ]}}]}),
        json!({"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"city\":"}}]}}]}),
        json!({"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"Oslo\"}"}}]}}]}),
        json!({"choices":[{"delta":{},"finish_reason":"tool_calls"}]}),
    ]);
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let result = provider(&server)
        .chat_model("acme-large")
        .do_stream(&CallOptions::new(vec![Message::user("weather?")]))
        .await
        .unwrap();
    let collected = collect_stream(result.stream).await.unwrap();

    assert_eq!(collected.tool_calls.len(), 1);
    assert_eq!(collected.tool_calls[0].tool_name, "weather");
    assert_eq!(collected.tool_calls[0].input, r#"{"city":"Oslo"}"#);
    assert_eq!(collected.finish_reason, FinishReason::ToolCalls);
    assert!(collected.finished);
}

#[tokio::test]
async fn stream_reports_reasoning_before_text() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({"choices":[{"delta":{"reasoning_content":"Let me think."}}]}),
        json!({"choices":[{"delta":{"content":"42"},"finish_reason":"stop"}]}),
    ]);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let result = provider(&server)
        .chat_model("acme-large")
        .do_stream(&CallOptions::new(vec![Message::user("?")]))
        .await
        .unwrap();
    let collected = collect_stream(result.stream).await.unwrap();
    assert_eq!(collected.reasoning, "Let me think.");
    assert_eq!(collected.text, "42");
}

#[tokio::test]
async fn stream_error_chunk_becomes_error_part() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({"choices":[{"delta":{"content":"partial"}}]}),
        json!({"error":{"message":"upstream exploded"}}),
    ]);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let result = provider(&server)
        .chat_model("acme-large")
        .do_stream(&CallOptions::new(vec![Message::user("?")]))
        .await
        .unwrap();
    let collected = collect_stream(result.stream).await.unwrap();
    assert_eq!(collected.errors, vec!["upstream exploded".to_string()]);
    assert_eq!(collected.finish_reason, FinishReason::Error);
    assert_eq!(collected.text, "partial");
}

#[tokio::test]
async fn stream_includes_raw_chunks_on_request() {
    let server = MockServer::start().await;
    let body = sse(&[json!({"choices":[{"delta":{"content":"x"},"finish_reason":"stop"}]})]);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let options = CallOptions::new(vec![Message::user("?")]).include_raw_chunks(true);
    let result = provider(&server)
        .chat_model("acme-large")
        .do_stream(&options)
        .await
        .unwrap();
    let parts: Vec<StreamPart> = result.stream.map(|p| p.unwrap()).collect().await;
    assert_eq!(
        parts
            .iter()
            .filter(|p| matches!(p, StreamPart::Raw { .. }))
            .count(),
        1
    );
}

#[tokio::test]
async fn stream_open_failure_is_returned_as_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = provider(&server)
        .chat_model("acme-large")
        .do_stream(&CallOptions::new(vec![Message::user("?")]))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
}

// ============================================================================
// Embeddings and images
// ============================================================================

#[tokio::test]
async fn embed_returns_vectors_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(body_partial_json(json!({
            "model": "acme-embed",
            "input": ["sunny day", "rainy night"],
            "encoding_format": "float"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                { "object": "embedding", "index": 0, "embedding": [0.1, 0.2, 0.3] },
                { "object": "embedding", "index": 1, "embedding": [0.4, 0.5, 0.6] }
            ],
            "usage": { "prompt_tokens": 5, "total_tokens": 5 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let model = provider(&server).embedding_model("acme-embed");
    let result = model
        .do_embed(EmbedOptions::new(["sunny day", "rainy night"]))
        .await
        .unwrap();

    assert_eq!(result.embeddings.len(), 2);
    assert_eq!(result.embeddings[1].values, vec![0.4, 0.5, 0.6]);
    assert_eq!(result.embeddings[0].dimensions, 3);
    assert_eq!(result.usage.unwrap().tokens, 5);
}

#[tokio::test]
async fn embed_rejects_too_many_values_without_a_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let provider = OpenAiCompatibleProvider::builder("acme", server.uri())
        .max_embeddings_per_call(2)
        .build()
        .unwrap();
    let model = provider.embedding_model("acme-embed");
    assert_eq!(model.max_embeddings_per_call(), Some(2));

    let err = model
        .do_embed(EmbedOptions::new(["a", "b", "c"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HuginnError::TooManyEmbeddingValues { max: 2, actual: 3 }
    ));
}

#[tokio::test]
async fn embed_count_mismatch_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [0.1] }]
        })))
        .mount(&server)
        .await;

    let err = provider(&server)
        .embedding_model("acme-embed")
        .do_embed(EmbedOptions::new(["a", "b"]))
        .await
        .unwrap_err();
    assert!(matches!(err, HuginnError::InvalidResponse(_)));
}

#[tokio::test]
async fn image_generation_requests_base64() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/images/generations"))
        .and(body_partial_json(json!({
            "model": "acme-paint",
            "prompt": "a raven on a branch",
            "n": 2,
            "size": "512x512",
            "response_format": "b64_json"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "created": 1_700_000_000,
            "data": [{ "b64_json": "aW1nMQ==" }, { "b64_json": "aW1nMg==" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let model = provider(&server).image_generation_model("acme-paint");
    let mut options = ImageOptions::new("a raven on a branch").n(2).size("512x512");
    options.aspect_ratio = Some("16:9".into());

    let result = model.do_generate(options).await.unwrap();
    assert_eq!(result.images, vec!["aW1nMQ==".to_string(), "aW1nMg==".to_string()]);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(model.max_images_per_call(), 10);
}

#[tokio::test]
async fn image_generation_rejects_too_many_images_without_a_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = provider(&server)
        .image_generation_model("acme-paint")
        .do_generate(ImageOptions::new("a flock of ravens").n(11))
        .await
        .unwrap_err();
    assert!(matches!(err, HuginnError::TooManyImages { max: 10, actual: 11 }));
}

// ============================================================================
// Stalled responses
// ============================================================================

/// Read one HTTP request, headers and body.
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return;
            }
        }
    }
}

/// Serve one connection: write `head` and `body`, then hold the socket open
/// without completing the response.
async fn stalling_server(head: &'static str, body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(&body).await.unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });
    format!("http://{addr}")
}

fn stalled_provider(base_url: String) -> OpenAiCompatibleProvider {
    OpenAiCompatibleProvider::builder("acme", base_url)
        .api_key("sk-test")
        .build()
        .unwrap()
}

#[tokio::test]
async fn abort_while_reading_body_fails_the_call() {
    let base_url = stalling_server(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 10000\r\n\r\n",
        br#"{"choices":"#.to_vec(),
    )
    .await;

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let options = CallOptions::new(vec![Message::user("hi")]).abort(token);
    let model = stalled_provider(base_url).chat_model("acme-large");
    let result = tokio::time::timeout(Duration::from_secs(5), model.do_generate(&options))
        .await
        .expect("call should end once the token fires");
    assert!(matches!(result, Err(HuginnError::Aborted)));
}

#[tokio::test]
async fn abort_mid_stream_closes_blocks_and_pending_calls() {
    let events = [
        json!({"id":"c","model":"acme-large","choices":[{"delta":{"content":"Hel"}}]}),
        json!({"choices":[{"delta":{"tool_calls":[
            {"index":0,"id":"call_1","type":"function","function":{"name":"lookup","arguments":"{\"q\":"}}
        ]}}]}),
    ];
    let data: String = events.iter().map(|e| format!("data: {e}\n\n")).collect();
    let chunk = format!("{:x}\r\n{data}\r\n", data.len());
    let base_url = stalling_server(
        "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n",
        chunk.into_bytes(),
    )
    .await;

    let token = CancellationToken::new();
    let options = CallOptions::new(vec![Message::user("look it up")]).abort(token.clone());
    let mut stream = stalled_provider(base_url)
        .chat_model("acme-large")
        .do_stream(&options)
        .await
        .unwrap()
        .stream;

    let mut before = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(part) = stream.next().await {
            let part = part.unwrap();
            let done = matches!(part, StreamPart::ToolInputDelta { .. });
            before.push(part);
            if done {
                break;
            }
        }
    })
    .await
    .expect("both events should arrive before the stall");
    assert!(before.iter().any(|p| p.as_text_delta() == Some("Hel")));

    token.cancel();
    let after: Vec<StreamPart> =
        tokio::time::timeout(Duration::from_secs(5), stream.collect::<Vec<_>>())
            .await
            .expect("stream should end once the token fires")
            .into_iter()
            .map(Result::unwrap)
            .collect();

    assert_eq!(after.len(), 5, "unexpected parts: {after:?}");
    assert!(matches!(&after[0], StreamPart::Error { error } if error.contains("aborted")));
    assert_eq!(after[1], StreamPart::TextEnd { id: "txt-0".into() });
    assert_eq!(after[2], StreamPart::ToolInputEnd { id: "call_1".into() });
    match &after[3] {
        StreamPart::ToolCall(call) => {
            assert_eq!(call.tool_call_id, "call_1");
            assert_eq!(call.tool_name, "lookup");
            assert_eq!(call.input, r#"{"q":"#);
        }
        other => panic!("expected tool call, got {other:?}"),
    }
    assert!(matches!(
        after[4],
        StreamPart::Finish {
            finish_reason: FinishReason::Error,
            ..
        }
    ));
}
