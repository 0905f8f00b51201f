//! Shared HTTP plumbing for vendor adapters.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, Response};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::is_retryable_status;
use crate::{HuginnError, Result};

/// Resolve an API key: explicit value first, then the environment variable.
pub fn load_api_key(explicit: Option<&str>, env_var: &str, description: &str) -> Result<String> {
    if let Some(key) = explicit {
        return Ok(key.to_string());
    }
    match std::env::var(env_var) {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => Err(HuginnError::LoadApiKey(format!(
            "{description} API key is missing. Pass it explicitly or set the {env_var} environment variable."
        ))),
    }
}

/// Merge header maps; later maps win.
pub fn combine_headers<'a>(
    maps: impl IntoIterator<Item = &'a HashMap<String, String>>,
) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for map in maps {
        for (k, v) in map {
            out.insert(k.to_lowercase(), v.clone());
        }
    }
    out
}

/// Response headers as a plain map (non-UTF-8 values skipped).
pub fn response_headers(response: &Response) -> HashMap<String, String> {
    response
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect()
}

/// Retry hint from `retry-after-ms` (preferred) or `retry-after` in seconds.
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    };
    if let Some(ms) = header("retry-after-ms").and_then(|s| s.parse::<f64>().ok())
        && ms >= 0.0
    {
        return Some(Duration::from_millis(ms as u64));
    }
    header("retry-after")
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Extract the human-readable message from an error body.
///
/// Understands `{"error": {"message": ...}}`; anything else is used as-is.
pub fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return envelope.error.message;
    }
    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        body.to_string()
    }
}

/// Turn a non-success response into the matching error.
pub async fn error_from_response(response: Response, url: &str) -> HuginnError {
    let status = response.status();
    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), url, "vendor returned error status");

    match status.as_u16() {
        401 | 403 => HuginnError::AuthenticationFailed,
        429 => HuginnError::RateLimited { retry_after },
        code => HuginnError::ApiCall {
            status: code,
            message: error_message(&body, status),
            url: url.to_string(),
            is_retryable: is_retryable_status(code),
            response_body: (!body.is_empty()).then_some(body),
        },
    }
}

/// POST a JSON body and return the successful response.
///
/// Races the request against `abort`; a fired token yields
/// [`HuginnError::Aborted`].
pub async fn post_json(
    client: &Client,
    url: &str,
    headers: &HashMap<String, String>,
    body: &serde_json::Value,
    abort: Option<&CancellationToken>,
) -> Result<Response> {
    let mut request = client.post(url).json(body);
    for (name, value) in headers {
        request = request.header(name, value);
    }

    let response = match abort {
        Some(token) => {
            if token.is_cancelled() {
                return Err(HuginnError::Aborted);
            }
            tokio::select! {
                _ = token.cancelled() => return Err(HuginnError::Aborted),
                response = request.send() => response?,
            }
        }
        None => request.send().await?,
    };

    if !response.status().is_success() {
        return Err(error_from_response(response, url).await);
    }
    Ok(response)
}

/// Read a successful response as JSON, keeping the raw value.
///
/// The body read is raced against `abort` like the request itself.
pub async fn read_json<T: serde::de::DeserializeOwned>(
    response: Response,
    abort: Option<&CancellationToken>,
) -> Result<(T, serde_json::Value)> {
    let body = match abort {
        Some(token) => tokio::select! {
            _ = token.cancelled() => return Err(HuginnError::Aborted),
            body = response.bytes() => body,
        },
        None => response.bytes().await,
    }?;
    let raw: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| HuginnError::InvalidResponse(e.to_string()))?;
    let value = serde_json::from_value(raw.clone())
        .map_err(|e| HuginnError::InvalidResponse(e.to_string()))?;
    Ok((value, raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_envelope() {
        let body = r#"{"error":{"message":"bad key","type":"auth"}}"#;
        assert_eq!(
            error_message(body, reqwest::StatusCode::BAD_REQUEST),
            "bad key"
        );
    }

    #[test]
    fn error_message_falls_back_to_reason() {
        assert_eq!(
            error_message("", reqwest::StatusCode::BAD_GATEWAY),
            "Bad Gateway"
        );
        assert_eq!(
            error_message("plain", reqwest::StatusCode::BAD_GATEWAY),
            "plain"
        );
    }

    #[test]
    fn combine_headers_later_wins() {
        let a = HashMap::from([("X-Key".to_string(), "1".to_string())]);
        let b = HashMap::from([("x-key".to_string(), "2".to_string())]);
        let merged = combine_headers([&a, &b]);
        assert_eq!(merged.get("x-key").map(String::as_str), Some("2"));
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn retry_after_ms_takes_precedence() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("retry-after", "5".parse().unwrap());
        headers.insert("retry-after-ms", "250".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_millis(250)));

        headers.remove("retry-after-ms");
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(5)));
    }

    #[test]
    fn explicit_api_key_wins() {
        let key = load_api_key(Some("sk-1"), "HUGINN_TEST_UNSET_VAR", "Test").unwrap();
        assert_eq!(key, "sk-1");
        assert!(matches!(
            load_api_key(None, "HUGINN_TEST_UNSET_VAR", "Test"),
            Err(HuginnError::LoadApiKey(_))
        ));
    }
}
