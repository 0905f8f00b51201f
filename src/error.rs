//! Huginn error types

use std::time::Duration;

/// Huginn error types
#[derive(Debug, thiserror::Error)]
pub enum HuginnError {
    // Transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// The vendor answered with a non-success status.
    #[error("API call to {url} failed ({status}): {message}")]
    ApiCall {
        status: u16,
        message: String,
        url: String,
        is_retryable: bool,
        response_body: Option<String>,
    },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    // Contract errors
    /// The vendor response did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error("unsupported functionality: {0}")]
    UnsupportedFunctionality(String),

    #[error("no such {model_type} model: {model_id}")]
    NoSuchModel {
        model_id: String,
        model_type: ModelType,
    },

    #[error("no such provider: {0}")]
    NoSuchProvider(String),

    #[error("too many values for a single embedding call: {actual} > {max}")]
    TooManyEmbeddingValues { max: usize, actual: usize },

    #[error("too many images for a single generation call: {actual} > {max}")]
    TooManyImages { max: usize, actual: usize },

    #[error("failed to load API key: {0}")]
    LoadApiKey(String),

    #[error("failed to download {url} (status {status})")]
    Download { url: String, status: u16 },

    #[error("request aborted")]
    Aborted,

    // Streaming errors
    #[error("stream error: {0}")]
    Stream(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Kind of model a provider was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    Language,
    TextEmbedding,
    Image,
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ModelType::Language => "language",
            ModelType::TextEmbedding => "text embedding",
            ModelType::Image => "image",
        })
    }
}

impl HuginnError {
    /// Whether the error is worth retrying.
    ///
    /// Rate limits, transport failures and API calls flagged retryable
    /// (408, 409, 429, 5xx) are transient. Everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            HuginnError::RateLimited { .. } | HuginnError::Http(_) => true,
            HuginnError::ApiCall { is_retryable, .. } => *is_retryable,
            _ => false,
        }
    }

    /// Retry hint reported by the vendor, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            HuginnError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status associated with the error, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            HuginnError::ApiCall { status, .. } => Some(*status),
            HuginnError::Download { status, .. } => Some(*status),
            HuginnError::RateLimited { .. } => Some(429),
            HuginnError::AuthenticationFailed => Some(401),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for HuginnError {
    fn from(err: reqwest::Error) -> Self {
        HuginnError::Http(err.to_string())
    }
}

/// Whether a status code should be retried.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 409 | 429) || status >= 500
}

/// Result type alias for Huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;
