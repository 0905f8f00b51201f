//! Types for text embedding models.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::ProviderOptions;
use super::response::ResponseInfo;

/// Embedding vector for one input value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    pub model: String,
    pub dimensions: usize,
}

impl Embedding {
    pub fn new(values: Vec<f32>, model: impl Into<String>) -> Self {
        Self {
            dimensions: values.len(),
            values,
            model: model.into(),
        }
    }
}

/// Options for `do_embed`.
#[derive(Debug, Clone, Default)]
pub struct EmbedOptions {
    /// Texts to embed, one embedding per value.
    pub values: Vec<String>,
    pub headers: HashMap<String, String>,
    pub provider_options: Option<ProviderOptions>,
    pub abort: Option<CancellationToken>,
}

impl EmbedOptions {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

/// Token usage of an embedding call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingUsage {
    pub tokens: u64,
}

/// Result of `do_embed`. Embeddings are in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbedResult {
    pub embeddings: Vec<Embedding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<EmbeddingUsage>,
    #[serde(default)]
    pub response: ResponseInfo,
}
